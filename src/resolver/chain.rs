use std::sync::Arc;

use log::debug;

use crate::{
    cache::ResolutionCache,
    context::ResolveContext,
    model::{Artifact, DependencyDescriptor},
    report::{ArtifactDownloadReport, DownloadStatus, MISSING_ARTIFACT},
    resolve::ResolveError,
    resolver::{DependencyResolver, ResolveQuery, ResolvedModuleRevision},
    version::{ArtifactInfo, RevisionInfo, VersionMatcher},
};

/// Asks its members in order: the first hit for a static revision, the
/// latest hit across all of them for a dynamic one.
#[derive(Debug)]
pub struct ChainResolver {
    name: String,
    resolvers: Vec<Arc<dyn DependencyResolver>>,
}

impl ChainResolver {
    pub fn new(name: impl Into<String>, resolvers: Vec<Arc<dyn DependencyResolver>>) -> Self {
        Self {
            name: name.into(),
            resolvers,
        }
    }

    pub fn resolvers(&self) -> &[Arc<dyn DependencyResolver>] {
        &self.resolvers
    }

    fn claim(&self, mut found: ResolvedModuleRevision) -> ResolvedModuleRevision {
        found.resolver = self.name.clone();
        found
    }
}

impl DependencyResolver for ChainResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_module(
        &self,
        dd: &DependencyDescriptor,
        query: &dyn ResolveQuery,
    ) -> Result<Option<ResolvedModuleRevision>, ResolveError> {
        let ctx = query.context();
        let dynamic = ctx.settings().version_matcher().is_dynamic(&dd.dependency);

        let mut hits: Vec<ResolvedModuleRevision> = vec![];
        for resolver in &self.resolvers {
            ctx.check_interrupted()?;
            if let Some(found) = resolver.find_module(dd, query)? {
                debug!(
                    "[{}] {} found {} in {}",
                    self.name,
                    dd.dependency,
                    found.id(),
                    resolver.name()
                );
                if !dynamic {
                    return Ok(Some(self.claim(found)));
                }
                hits.push(found);
            }
        }

        let infos: Vec<RevisionInfo> = hits
            .iter()
            .map(|hit| RevisionInfo::new(hit.id().revision(), hit.publication_millis()))
            .collect();
        let refs: Vec<&dyn ArtifactInfo> = infos.iter().map(|i| i as &dyn ArtifactInfo).collect();
        let latest = ctx
            .settings()
            .default_latest_strategy()
            .find_latest(&refs)
            .map_err(|e| ResolveError::DynamicResolution(e.to_string()))?;
        Ok(latest.map(|index| self.claim(hits.swap_remove(index))))
    }

    fn download(
        &self,
        artifact: &Artifact,
        cache: &ResolutionCache,
        ctx: &ResolveContext,
    ) -> ArtifactDownloadReport {
        let mut last = None;
        for resolver in &self.resolvers {
            let report = resolver.download(artifact, cache, ctx);
            if report.status != DownloadStatus::Failed {
                return report;
            }
            last = Some(report);
        }
        last.unwrap_or_else(|| ArtifactDownloadReport::failed(artifact.clone(), MISSING_ARTIFACT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        model::ModuleRevisionId, repository::FileRepository, resolver::PatternResolver,
        settings::Settings,
    };

    fn member(dir: &std::path::Path, name: &str, revisions: &[&str]) -> Arc<dyn DependencyResolver> {
        let root = dir.join(name);
        for revision in revisions {
            let path = root.join(format!("acme/util/{}", revision));
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(
                path.join("ivy.toml"),
                format!(
                    "organisation = \"acme\"\nmodule = \"util\"\nrevision = \"{}\"\n",
                    revision
                ),
            )
            .unwrap();
        }
        Arc::new(
            PatternResolver::new(name, Arc::new(FileRepository::new(name, root)))
                .with_ivy_pattern("[organisation]/[module]/[revision]/ivy.toml"),
        )
    }

    fn dd(revision: &str) -> DependencyDescriptor {
        DependencyDescriptor::new(
            ModuleRevisionId::of("acme", "app", "1.0"),
            ModuleRevisionId::of("acme", "util", revision),
        )
    }

    #[test]
    fn first_static_hit_latest_dynamic_hit() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ChainResolver::new(
            "main",
            vec![
                member(dir.path(), "first", &["1.0", "1.2"]),
                member(dir.path(), "second", &["1.0", "1.4"]),
            ],
        );
        let settings = Settings::builder()
            .cache_dir(dir.path().join("cache"))
            .build()
            .unwrap();
        let ctx = ResolveContext::new(Arc::new(settings));

        let found = chain.find_module(&dd("1.0"), &ctx).unwrap().unwrap();
        assert_eq!(found.resolver, "main");
        assert_eq!(found.artifact_resolver, "first");

        let latest = chain.find_module(&dd("1.+"), &ctx).unwrap().unwrap();
        assert_eq!(latest.id().revision(), "1.4");
        assert_eq!(latest.artifact_resolver, "second");

        assert!(chain.find_module(&dd("2.0"), &ctx).unwrap().is_none());
    }
}
