use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, trace};
use regex_lite::Regex;

use crate::{
    cache::ResolutionCache,
    context::ResolveContext,
    model::{Artifact, DependencyDescriptor, ModuleDescriptor, ModuleRevisionId},
    pattern::{self, REVISION_KEY},
    report::{ArtifactDownloadReport, ArtifactOrigin, DownloadStatus, MISSING_ARTIFACT},
    repository::{Repository, Resource},
    resolve::ResolveError,
    resolver::{DependencyResolver, ResolveQuery, ResolvedModuleRevision},
    version::{ArtifactInfo, RevisionInfo, VersionMatcher},
};

const REVISION_TOKEN: &str = "[revision]";

/// Finds descriptors and artifacts in a [`Repository`] laid out according to
/// token patterns, e.g. `[organisation]/[module]/[revision]/ivy.toml`.
#[derive(Debug)]
pub struct PatternResolver {
    name: String,
    repository: Arc<dyn Repository>,
    ivy_patterns: Vec<String>,
    artifact_patterns: Vec<String>,
    descriptors: DashMap<ModuleRevisionId, Arc<ModuleDescriptor>>,
}

impl PatternResolver {
    pub fn new(name: impl Into<String>, repository: Arc<dyn Repository>) -> Self {
        Self {
            name: name.into(),
            repository,
            ivy_patterns: vec![],
            artifact_patterns: vec![],
            descriptors: DashMap::new(),
        }
    }

    pub fn with_ivy_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ivy_patterns.push(pattern.into());
        self
    }

    pub fn with_artifact_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.artifact_patterns.push(pattern.into());
        self
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    fn found(&self, descriptor: Arc<ModuleDescriptor>, searched: bool, downloaded: bool) -> ResolvedModuleRevision {
        ResolvedModuleRevision {
            descriptor,
            resolver: self.name.clone(),
            artifact_resolver: self.name.clone(),
            searched,
            downloaded,
        }
    }

    /// The descriptor of exactly `mrid`, and whether it was read now.
    fn find_static(
        &self,
        mrid: &ModuleRevisionId,
        ctx: &ResolveContext,
    ) -> Result<Option<(Arc<ModuleDescriptor>, bool)>, ResolveError> {
        if let Some(descriptor) = self.descriptors.get(mrid) {
            return Ok(Some((descriptor.clone(), false)));
        }
        let variables = ctx.settings().variables();

        let metadata = Artifact::metadata(mrid.clone(), Utc::now());
        let tokens = pattern::artifact_tokens(&metadata, None);
        for ivy_pattern in &self.ivy_patterns {
            let name = pattern::substitute(ivy_pattern, &tokens, variables)?;
            let resource = self.repository.get_resource(&name);
            if !resource.exists {
                trace!("[{}] no descriptor at {}", self.name, name);
                continue;
            }
            let descriptor =
                ModuleDescriptor::from_toml_str(&resource.read_to_string()?, publication(&resource))?;
            if descriptor.mrid.module_id() != mrid.module_id()
                || descriptor.mrid.revision() != mrid.revision()
            {
                ctx.messages().warn(format!(
                    "[{}] bad descriptor {}: expected {} found {}",
                    self.name, name, mrid, descriptor.mrid
                ));
                return Ok(None);
            }
            debug!("[{}] found descriptor {} for {}", self.name, name, mrid);
            let descriptor = Arc::new(descriptor);
            self.descriptors.insert(mrid.clone(), descriptor.clone());
            return Ok(Some((descriptor, true)));
        }

        let tokens = pattern::module_tokens(mrid);
        for artifact_pattern in &self.artifact_patterns {
            let name = pattern::substitute(artifact_pattern, &tokens, variables)?;
            let resource = self.repository.get_resource(&name);
            if resource.exists {
                debug!(
                    "[{}] no descriptor for {}, using default one found with {}",
                    self.name, mrid, name
                );
                let descriptor = Arc::new(ModuleDescriptor::default_for(
                    mrid.clone(),
                    publication(&resource).unwrap_or_else(Utc::now),
                ));
                self.descriptors.insert(mrid.clone(), descriptor.clone());
                return Ok(Some((descriptor, true)));
            }
        }
        Ok(None)
    }

    /// Every revision of `asked`'s module present in the repository, with
    /// its last modification time.
    fn list_revisions(
        &self,
        asked: &ModuleRevisionId,
        ctx: &ResolveContext,
    ) -> Result<Vec<RevisionInfo>, ResolveError> {
        let variables = ctx.settings().variables();
        let metadata = Artifact::metadata(asked.clone(), Utc::now());
        let ivy_tokens = pattern::artifact_tokens(&metadata, None);
        let artifact_tokens = pattern::module_tokens(asked);

        let mut revisions: Vec<RevisionInfo> = vec![];
        let sources = self
            .ivy_patterns
            .iter()
            .map(|p| (p, &ivy_tokens))
            .chain(self.artifact_patterns.iter().map(|p| (p, &artifact_tokens)));
        for (source, tokens) in sources {
            for info in self.list_with(source, tokens, variables)? {
                if !revisions.iter().any(|r| r.revision == info.revision) {
                    revisions.push(info);
                }
            }
        }
        Ok(revisions)
    }

    fn list_with(
        &self,
        source: &str,
        tokens: &HashMap<String, String>,
        variables: &HashMap<String, String>,
    ) -> Result<Vec<RevisionInfo>, ResolveError> {
        let mut partial_tokens = tokens.clone();
        partial_tokens.remove(REVISION_KEY);
        let partial = pattern::substitute(source, &partial_tokens, variables)?;
        let segments: Vec<&str> = partial.split('/').collect();
        let Some(index) = segments.iter().position(|s| s.contains(REVISION_TOKEN)) else {
            return Ok(vec![]);
        };
        let parent = segments[..index].join("/");
        let expression = segments[index]
            .split(REVISION_TOKEN)
            .map(regex_lite::escape)
            .collect::<Vec<_>>()
            .join("(.+)");
        let matcher = match Regex::new(&format!("^{}$", expression)) {
            Ok(matcher) => matcher,
            Err(error) => {
                debug!("[{}] cannot list {}: {}", self.name, source, error);
                return Ok(vec![]);
            }
        };
        let Some(children) = self.repository.list(&parent) else {
            trace!("[{}] cannot list {}", self.name, parent);
            return Ok(vec![]);
        };

        let mut infos = vec![];
        for child in children {
            let Some(revision) = matcher
                .captures(&child)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_owned())
            else {
                continue;
            };
            let mut full_tokens = tokens.clone();
            full_tokens.insert(REVISION_KEY.to_owned(), revision.clone());
            let name = pattern::substitute(source, &full_tokens, variables)?;
            let resource = self.repository.get_resource(&name);
            if resource.exists {
                infos.push(RevisionInfo::new(revision, resource.last_modified));
            }
        }
        Ok(infos)
    }

    fn find_dynamic(
        &self,
        dd: &DependencyDescriptor,
        query: &dyn ResolveQuery,
    ) -> Result<Option<ResolvedModuleRevision>, ResolveError> {
        let ctx = query.context();
        let settings = ctx.settings();
        let matcher = settings.version_matcher();
        let asked = &dd.dependency;

        let revisions = self.list_revisions(asked, ctx)?;
        let infos: Vec<&dyn ArtifactInfo> = revisions.iter().map(|r| r as &dyn ArtifactInfo).collect();
        let sorted = settings
            .default_latest_strategy()
            .sort(&infos)
            .map_err(|e| ResolveError::DynamicResolution(e.to_string()))?;
        debug!(
            "[{}] {} revisions listed for {}",
            self.name,
            revisions.len(),
            asked
        );

        let mut blacklisted = vec![];
        for index in sorted.into_iter().rev() {
            let candidate = asked.with_revision(revisions[index].revision.clone());
            if query.is_blacklisted(&candidate) {
                trace!("[{}] skipping blacklisted {}", self.name, candidate);
                blacklisted.push(candidate);
                continue;
            }
            let accepted = if matcher.need_module_descriptor(asked, &candidate) {
                match self.find_static(&candidate, ctx)? {
                    Some((descriptor, downloaded)) if matcher.accept_descriptor(asked, &descriptor) => {
                        Some((descriptor, downloaded))
                    }
                    _ => None,
                }
            } else if matcher.accept(asked, &candidate) {
                self.find_static(&candidate, ctx)?
            } else {
                None
            };
            if let Some((descriptor, downloaded)) = accepted {
                debug!("[{}] {} resolved to {}", self.name, asked, candidate);
                return Ok(Some(self.found(descriptor, true, downloaded)));
            }
        }
        if !blacklisted.is_empty() {
            query.handle_all_blacklisted(dd, &blacklisted)?;
        }
        Ok(None)
    }

    fn fetch(
        &self,
        artifact: &Artifact,
        destination: &std::path::Path,
        ctx: &ResolveContext,
    ) -> ArtifactDownloadReport {
        let variables = ctx.settings().variables();
        let tokens = pattern::artifact_tokens(artifact, None);
        for artifact_pattern in &self.artifact_patterns {
            let name = match pattern::substitute(artifact_pattern, &tokens, variables) {
                Ok(name) => name,
                Err(error) => return ArtifactDownloadReport::failed(artifact.clone(), error.to_string()),
            };
            let resource = self.repository.get_resource(&name);
            if !resource.exists {
                continue;
            }
            let start = Instant::now();
            let origin = ArtifactOrigin {
                is_local: resource.local,
                location: name.clone(),
            };
            return match self.repository.get(&name, destination, ctx.interrupt()) {
                Ok(()) => ArtifactDownloadReport {
                    status: DownloadStatus::Successful,
                    size: resource.content_length,
                    download_time_ms: start.elapsed().as_millis() as u64,
                    local_file: Some(destination.to_path_buf()),
                    origin: Some(origin),
                    ..ArtifactDownloadReport::new(artifact.clone())
                },
                Err(error) => {
                    // A partial copy must not pass for a cached artifact.
                    let _ = std::fs::remove_file(destination);
                    ArtifactDownloadReport {
                        download_time_ms: start.elapsed().as_millis() as u64,
                        origin: Some(origin),
                        ..ArtifactDownloadReport::failed(artifact.clone(), error.to_string())
                    }
                }
            };
        }
        ArtifactDownloadReport::failed(artifact.clone(), MISSING_ARTIFACT)
    }
}

fn publication(resource: &Resource) -> Option<DateTime<Utc>> {
    if resource.last_modified > 0 {
        DateTime::from_timestamp_millis(resource.last_modified)
    } else {
        None
    }
}

impl DependencyResolver for PatternResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_module(
        &self,
        dd: &DependencyDescriptor,
        query: &dyn ResolveQuery,
    ) -> Result<Option<ResolvedModuleRevision>, ResolveError> {
        let ctx = query.context();
        ctx.check_interrupted()?;
        if ctx.settings().version_matcher().is_dynamic(&dd.dependency) {
            return self.find_dynamic(dd, query);
        }
        Ok(self
            .find_static(&dd.dependency, ctx)?
            .map(|(descriptor, downloaded)| self.found(descriptor, false, downloaded)))
    }

    fn download(
        &self,
        artifact: &Artifact,
        cache: &ResolutionCache,
        ctx: &ResolveContext,
    ) -> ArtifactDownloadReport {
        let destination = match cache.artifact_path(artifact) {
            Ok(destination) => destination,
            Err(error) => return ArtifactDownloadReport::failed(artifact.clone(), error.to_string()),
        };
        if destination.exists() {
            trace!("[{}] {} already in cache", self.name, artifact);
            return ArtifactDownloadReport {
                size: std::fs::metadata(&destination).map_or(0, |m| m.len()),
                local_file: Some(destination.clone()),
                origin: Some(ArtifactOrigin {
                    is_local: true,
                    location: destination.to_string_lossy().into_owned(),
                }),
                ..ArtifactDownloadReport::new(artifact.clone())
            };
        }
        self.fetch(artifact, &destination, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::settings::Settings;

    fn descriptor(name: &str, revision: &str, status: &str) -> String {
        format!(
            "organisation = \"acme\"\nmodule = \"{}\"\nrevision = \"{}\"\nstatus = \"{}\"\n",
            name, revision, status
        )
    }

    fn setup() -> (tempfile::TempDir, PatternResolver, ResolveContext) {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        for (revision, status) in [("1.0", "release"), ("1.5", "integration"), ("2.0", "release")] {
            let path = repo.join(format!("acme/util/{}", revision));
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("ivy.toml"), descriptor("util", revision, status)).unwrap();
            std::fs::write(path.join("util.jar"), revision).unwrap();
        }
        // An artifact without descriptor.
        std::fs::create_dir_all(repo.join("acme/bare/3.0")).unwrap();
        std::fs::write(repo.join("acme/bare/3.0/bare.jar"), b"bare").unwrap();

        let resolver = PatternResolver::new(
            "local",
            Arc::new(crate::repository::FileRepository::new("local", repo)),
        )
        .with_ivy_pattern("[organisation]/[module]/[revision]/ivy.toml")
        .with_artifact_pattern("[organisation]/[module]/[revision]/[artifact].[ext]");
        let settings = Settings::builder()
            .cache_dir(dir.path().join("cache"))
            .build()
            .unwrap();
        (dir, resolver, ResolveContext::new(Arc::new(settings)))
    }

    fn dd(revision: &str) -> DependencyDescriptor {
        DependencyDescriptor::new(
            ModuleRevisionId::of("acme", "app", "1.0"),
            ModuleRevisionId::of("acme", "util", revision),
        )
    }

    #[test]
    fn static_revision() {
        let (_dir, resolver, ctx) = setup();
        let found = resolver.find_module(&dd("1.5"), &ctx).unwrap().unwrap();
        assert_eq!(found.id(), &ModuleRevisionId::of("acme", "util", "1.5"));
        assert_eq!(found.descriptor.status, "integration");
        assert!(found.downloaded);
        assert!(!found.searched);

        let again = resolver.find_module(&dd("1.5"), &ctx).unwrap().unwrap();
        assert!(!again.downloaded);
        assert!(resolver.find_module(&dd("9.9"), &ctx).unwrap().is_none());
    }

    #[test]
    fn default_descriptor_from_artifact() {
        let (_dir, resolver, ctx) = setup();
        let bare = DependencyDescriptor::new(
            ModuleRevisionId::of("acme", "app", "1.0"),
            ModuleRevisionId::of("acme", "bare", "3.0"),
        );
        let found = resolver.find_module(&bare, &ctx).unwrap().unwrap();
        assert!(found.descriptor.is_default);
    }

    #[test]
    fn dynamic_revisions() {
        let (_dir, resolver, ctx) = setup();
        let range = resolver.find_module(&dd("[1.0,2.0["), &ctx).unwrap().unwrap();
        assert_eq!(range.id().revision(), "1.5");
        assert!(range.searched);

        let latest = resolver.find_module(&dd("latest.integration"), &ctx).unwrap().unwrap();
        assert_eq!(latest.id().revision(), "2.0");

        let release = resolver.find_module(&dd("1.+"), &ctx).unwrap().unwrap();
        assert_eq!(release.id().revision(), "1.5");

        assert!(resolver.find_module(&dd("[3.0,4.0]"), &ctx).unwrap().is_none());
    }

    #[derive(Debug)]
    struct Blacklisting(ResolveContext, ModuleRevisionId);

    impl ResolveQuery for Blacklisting {
        fn context(&self) -> &ResolveContext {
            &self.0
        }

        fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool {
            mrid == &self.1
        }

        fn handle_all_blacklisted(
            &self,
            _dd: &DependencyDescriptor,
            found: &[ModuleRevisionId],
        ) -> Result<(), crate::conflict::ConflictError> {
            Err(crate::conflict::ConflictError::StrictConflict(format!(
                "all blacklisted: {}",
                found.len()
            )))
        }
    }

    #[test]
    fn blacklisted_revisions_are_skipped() {
        let (_dir, resolver, ctx) = setup();
        let query = Blacklisting(ctx, ModuleRevisionId::of("acme", "util", "1.5"));
        let found = resolver.find_module(&dd("[1.0,2.0["), &query).unwrap().unwrap();
        assert_eq!(found.id().revision(), "1.0");

        let all = resolver.find_module(&dd("[1.5,2.0["), &query);
        assert!(matches!(all, Err(ResolveError::Conflict(_))));
    }

    #[test]
    fn download_into_cache() {
        let (dir, resolver, ctx) = setup();
        let cache = ResolutionCache::new(dir.path().join("cache")).unwrap();
        let artifact = Artifact::new(
            ModuleRevisionId::of("acme", "util", "1.0"),
            Utc::now(),
            "util",
            "jar",
            "jar",
        );
        let report = resolver.download(&artifact, &cache, &ctx);
        assert_eq!(report.status, DownloadStatus::Successful);
        assert_eq!(report.size, 3);
        assert_eq!(
            std::fs::read_to_string(report.local_file.unwrap()).unwrap(),
            "1.0"
        );

        let cached = resolver.download(&artifact, &cache, &ctx);
        assert_eq!(cached.status, DownloadStatus::No);

        let missing = Artifact::new(
            ModuleRevisionId::of("acme", "util", "1.0"),
            Utc::now(),
            "util-sources",
            "source",
            "jar",
        );
        let failed = resolver.download(&missing, &cache, &ctx);
        assert_eq!(failed.status, DownloadStatus::Failed);
        assert_eq!(failed.details, MISSING_ARTIFACT);
    }
}
