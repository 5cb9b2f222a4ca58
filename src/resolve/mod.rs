//! Resolve engine: walks the dependency graph of a module descriptor in each
//! requested configuration, settles conflicts, downloads the selected
//! artifacts and reports the outcome.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use log::{debug, info};
use thiserror::Error;

use crate::{
    cache::{CacheError, ResolutionCache, ResolvedRevision},
    conflict::ConflictError,
    context::{Interrupted, ResolveContext},
    model::{Artifact, ArtifactRevisionId, DependencyDescriptor, ModuleDescriptor, ModuleRevisionId, ParseError},
    pattern::PatternError,
    report::{
        ArtifactDownloadReport, CallerReport, ConfigurationResolveReport, EvictionReport,
        NodeReport, ReportError, ResolveReport, XmlReportWriter,
    },
};

mod data;
mod download;
mod node;
mod sort;
mod walk;

pub use data::ResolveData;

use download::DownloadJob;
use node::{EvictionData, Node, NodeRef};
use walk::Walker;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid module descriptor: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("Resolve interrupted")]
    Interrupted(#[from] Interrupted),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Impossible to resolve dynamic revision: {0}")]
    DynamicResolution(String),
    #[error("Requested configurations {confs:?} not found in {module}")]
    UnknownConfiguration {
        module: ModuleRevisionId,
        confs: Vec<String>,
    },
    #[error("Resolve of conf '{conf}' restarted {restarts} times without converging")]
    RestartLoop { conf: String, restarts: usize },
}

/// A module depending on a node, as seen from one root configuration.
#[derive(Debug, Clone)]
pub struct Caller {
    pub mrid: ModuleRevisionId,
    /// Caller conf to the confs of the callee it requires.
    pub confs: IndexMap<String, Vec<String>>,
    pub dd: DependencyDescriptor,
    /// False for callers inherited from a node evicted in favor of this one.
    pub real: bool,
}

impl Caller {
    pub fn asked(&self) -> &ModuleRevisionId {
        &self.dd.dependency
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Root confs to resolve, `*` for all of them, private ones included.
    pub confs: Vec<String>,
    pub transitive: bool,
    pub download: bool,
    pub check_if_changed: bool,
    pub output_report: bool,
    /// Defaults to `organisation-module` of the resolved descriptor.
    pub resolve_id: Option<String>,
    /// Artifact types to select, all of them when empty.
    pub artifact_types: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            confs: vec!["*".to_owned()],
            transitive: true,
            download: true,
            check_if_changed: true,
            output_report: true,
            resolve_id: None,
            artifact_types: vec![],
        }
    }
}

impl ResolveOptions {
    pub fn resolve_id_for(&self, mrid: &ModuleRevisionId) -> String {
        self.resolve_id
            .clone()
            .unwrap_or_else(|| default_resolve_id(mrid))
    }

    fn accepts(&self, artifact: &Artifact) -> bool {
        self.artifact_types.is_empty()
            || self
                .artifact_types
                .iter()
                .any(|kind| kind == "*" || *kind == artifact.kind)
    }
}

pub fn default_resolve_id(mrid: &ModuleRevisionId) -> String {
    format!("{}-{}", mrid.organisation(), mrid.name())
}

pub struct ResolveEngine {
    ctx: ResolveContext,
    cache: ResolutionCache,
}

impl ResolveEngine {
    pub fn new(ctx: ResolveContext, cache: ResolutionCache) -> Self {
        Self { ctx, cache }
    }

    pub fn context(&self) -> &ResolveContext {
        &self.ctx
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn resolve(
        &self,
        descriptor: Arc<ModuleDescriptor>,
        options: &ResolveOptions,
    ) -> Result<ResolveReport, ResolveError> {
        let _lock = self.cache.lock()?;
        let messages = self.ctx.messages();
        messages.clear_problems();

        let confs = requested_confs(&descriptor, &options.confs)?;
        let resolve_id = options.resolve_id_for(&descriptor.mrid);
        info!(
            ":: resolving dependencies :: {} [{}]",
            descriptor.mrid,
            confs.join(", ")
        );

        let start = Instant::now();
        let mut data = ResolveData::new(Node::root(descriptor.clone()));
        for conf in &confs {
            messages.verbose(format!("resolving dependencies for configuration '{}'", conf));
            Walker::new(&mut data, &self.ctx, conf, options.transitive).run()?;
        }

        let mut nodes: Vec<NodeRef> = data
            .real_nodes()
            .into_iter()
            .filter(|n| !data.is_root(*n) && !data.node(*n).is_completely_blacklisted())
            .collect();
        nodes = sort::least_dependent_first(&data, &nodes);
        nodes.reverse();
        self.handle_transitive_eviction(&mut data, &confs, &nodes);
        let resolve_time_ms = elapsed_ms(start);

        let artifacts = self.selected_artifacts(&data, &nodes, &confs, options);
        let download_start = Instant::now();
        let downloads: HashMap<ArtifactRevisionId, ArtifactDownloadReport> = if options.download {
            self.download(&data, &artifacts)
        } else {
            artifacts
                .iter()
                .map(|(_, artifact)| (artifact.id(), ArtifactDownloadReport::new(artifact.clone())))
                .collect()
        };
        let download_time_ms = elapsed_ms(download_start);

        let date = Utc::now();
        let mut report = ResolveReport::new(descriptor.clone(), resolve_id.clone());
        for conf in &confs {
            let mut conf_report =
                ConfigurationResolveReport::new(descriptor.mrid.clone(), conf, date, &resolve_id);
            for node in &nodes {
                if !data.node(*node).root_confs().contains(conf) {
                    continue;
                }
                let mut node_report = node_report(&data, *node, conf);
                if !data.is_evicted(*node, conf) && !data.node(*node).is_blacklisted(conf) {
                    node_report.artifacts = node_artifacts(&data, *node, conf, options)
                        .iter()
                        .filter_map(|artifact| downloads.get(&artifact.id()).cloned())
                        .collect();
                }
                conf_report.add_node(node_report);
            }
            if options.check_if_changed {
                conf_report.check_if_changed(&self.cache);
            }
            report.add_report(conf_report);
        }
        report.set_dependencies(
            nodes
                .iter()
                .map(|n| data.resolved_id(*n).clone())
                .collect(),
            artifacts.into_iter().map(|(_, artifact)| artifact).collect(),
        );
        report.resolve_time_ms = resolve_time_ms;
        report.download_time_ms = download_time_ms;

        if options.output_report {
            for conf_report in report.configuration_reports() {
                let path = self.cache.report_path(&resolve_id, &conf_report.conf);
                debug!("Writing resolve report to {}", path.display());
                XmlReportWriter::write(conf_report, &confs, &path)?;
            }
            self.cache.save_resolved_descriptor(&descriptor)?;
            // dependency descriptors back the ivy pattern of retrieve
            for node in &nodes {
                let state = data.node(*node);
                if let (Some(md), false) = (&state.descriptor, state.has_problem()) {
                    self.cache.save_resolved_descriptor(md)?;
                }
            }
            self.cache
                .save_resolved_revisions(&descriptor.mrid, &resolved_revisions(&data, &descriptor))?;
        }

        for line in report.summary() {
            messages.info(line);
        }
        messages.info(format!(
            "\tresolve done ({}ms resolve - {}ms download)",
            resolve_time_ms, download_time_ms
        ));
        let mut problems = messages.warnings();
        problems.extend(messages.errors());
        report.set_problem_messages(problems);
        messages.sum_up_problems();
        Ok(report)
    }

    /// Evicts, in each root conf, the nodes whose callers are all evicted.
    /// `nodes` must be ordered most dependent first.
    fn handle_transitive_eviction(&self, data: &mut ResolveData, confs: &[String], nodes: &[NodeRef]) {
        let root_id = data.resolved_id(data.root()).clone();
        for node in nodes {
            if data.is_completely_evicted(*node) {
                continue;
            }
            for conf in confs {
                let callers: Vec<ModuleRevisionId> = data
                    .node(*node)
                    .callers
                    .get(conf)
                    .map(|callers| callers.keys().cloned().collect())
                    .unwrap_or_default();
                if callers.is_empty() || data.is_evicted(*node, conf) {
                    continue;
                }
                let all_evicted = callers.iter().all(|caller| {
                    if *caller == root_id {
                        return false;
                    }
                    match data.get(caller) {
                        Some(caller) => data.is_evicted(data.real(caller), conf),
                        None => {
                            self.ctx
                                .messages()
                                .warn(format!("ERROR: no node found for caller {}", caller));
                            true
                        }
                    }
                });
                if all_evicted {
                    self.ctx.messages().verbose(format!(
                        "all callers are evicted for {}: evicting too",
                        data.resolved_id(*node)
                    ));
                    data.mark_evicted(*node, conf, EvictionData::transitive());
                }
            }
        }
    }

    /// Artifacts of every node kept in at least one root conf, each once.
    fn selected_artifacts(
        &self,
        data: &ResolveData,
        nodes: &[NodeRef],
        confs: &[String],
        options: &ResolveOptions,
    ) -> Vec<(NodeRef, Artifact)> {
        let mut seen = IndexSet::new();
        let mut selected = vec![];
        for node in nodes {
            for conf in confs {
                let state = data.node(*node);
                if state.has_problem() || data.is_evicted(*node, conf) || state.is_blacklisted(conf) {
                    continue;
                }
                for artifact in node_artifacts(data, *node, conf, options) {
                    if seen.insert(artifact.id()) {
                        selected.push((*node, artifact));
                    }
                }
            }
        }
        selected
    }

    fn download(
        &self,
        data: &ResolveData,
        artifacts: &[(NodeRef, Artifact)],
    ) -> HashMap<ArtifactRevisionId, ArtifactDownloadReport> {
        let settings = self.ctx.settings();
        let jobs: Vec<DownloadJob<ArtifactRevisionId>> = artifacts
            .iter()
            .map(|(node, artifact)| {
                let state = data.node(*node);
                let resolver = state
                    .module
                    .as_ref()
                    .and_then(|module| {
                        settings
                            .resolver_by_name(&module.artifact_resolver)
                            .or_else(|| settings.resolver_by_name(&module.resolver))
                    })
                    .or_else(|| settings.resolver(state.module_id()));
                DownloadJob {
                    key: artifact.id(),
                    artifact: artifact.clone(),
                    resolver,
                }
            })
            .collect();
        let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
        download::download_all(jobs, &self.cache, &self.ctx, workers)
            .into_iter()
            .collect()
    }
}

/// Expands `*` and checks every conf exists in `descriptor`.
fn requested_confs(
    descriptor: &ModuleDescriptor,
    confs: &[String],
) -> Result<Vec<String>, ResolveError> {
    let mut requested: IndexSet<String> = IndexSet::new();
    for conf in confs {
        if conf == "*" {
            requested.extend(descriptor.configuration_names());
        } else {
            requested.insert(conf.clone());
        }
    }
    let missing: Vec<String> = requested
        .iter()
        .filter(|conf| descriptor.configuration(conf).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ResolveError::UnknownConfiguration {
            module: descriptor.mrid.clone(),
            confs: missing,
        });
    }
    Ok(requested.into_iter().collect())
}

fn node_artifacts(
    data: &ResolveData,
    node: NodeRef,
    root_conf: &str,
    options: &ResolveOptions,
) -> Vec<Artifact> {
    let state = data.node(node);
    let Some(md) = &state.descriptor else {
        return vec![];
    };
    let mut artifacts: IndexMap<ArtifactRevisionId, Artifact> = IndexMap::new();
    for conf in state.confs(root_conf) {
        for artifact in md.artifacts_for(&conf) {
            if options.accepts(artifact) {
                artifacts
                    .entry(artifact.id())
                    .or_insert_with(|| artifact.clone());
            }
        }
    }
    artifacts.into_values().collect()
}

/// A snapshot of `node` as resolved in `root_conf`.
fn node_report(data: &ResolveData, node: NodeRef, root_conf: &str) -> NodeReport {
    let state = data.node(node);
    let mut report = NodeReport::new(state.id.clone(), state.resolved_id().clone());
    if let Some(md) = &state.descriptor {
        report.status = Some(md.status.clone());
        report.publication = Some(md.publication);
        report.is_default = Some(md.is_default);
        report.licenses = md.licenses.clone();
        report.homepage = md.homepage.clone();
    }
    if let Some(module) = &state.module {
        report.resolver = Some(module.resolver.clone());
        report.artifact_resolver = Some(module.artifact_resolver.clone());
    }
    report.downloaded = state.downloaded;
    report.searched = state.searched;
    report.problem = state.problem.clone();
    if data.is_evicted(node, root_conf) {
        report.evicted = data.eviction_data(node, root_conf).map(|eviction| EvictionReport {
            conflict_manager: eviction.conflict_manager.clone(),
            parent: eviction.parent.map(|p| data.resolved_id(p).clone()),
            selected: eviction
                .selected
                .iter()
                .flatten()
                .map(|s| data.resolved_id(*s).clone())
                .collect(),
            detail: eviction.detail.clone(),
        });
    }
    report.confs = state.confs(root_conf).into_iter().collect();
    if let Some(callers) = state.callers.get(root_conf) {
        report.callers = callers
            .values()
            .map(|caller| CallerReport {
                mrid: caller.mrid.clone(),
                confs: caller.confs.keys().cloned().collect(),
                asked: caller.asked().clone(),
            })
            .collect();
    }
    report
}

/// What each direct dependency of the root resolved to.
fn resolved_revisions(
    data: &ResolveData,
    descriptor: &ModuleDescriptor,
) -> Vec<(ModuleRevisionId, ResolvedRevision)> {
    descriptor
        .dependencies
        .iter()
        .filter_map(|dd| {
            let node = data.real(data.get(&dd.dependency)?);
            let state = data.node(node);
            let resolved = state.resolved_id();
            Some((
                dd.dependency.clone(),
                ResolvedRevision {
                    revision: resolved.revision().to_owned(),
                    status: state
                        .descriptor
                        .as_ref()
                        .map_or_else(|| "?".to_owned(), |md| md.status.clone()),
                    branch: resolved.branch().map(str::to_owned),
                },
            ))
        })
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        report::DownloadStatus,
        repository::FileRepository,
        resolver::PatternResolver,
        settings::{Settings, SettingsBuilder},
    };

    const IVY_PATTERN: &str = "[organisation]/[module]/[revision]/ivy.toml";
    const ARTIFACT_PATTERN: &str = "[organisation]/[module]/[revision]/[artifact].[ext]";

    fn repository() -> std::path::PathBuf {
        project_root::get_project_root()
            .unwrap()
            .join("resources/repository")
    }

    fn engine(
        cache: &std::path::Path,
        configure: impl FnOnce(SettingsBuilder) -> SettingsBuilder,
    ) -> ResolveEngine {
        let resolver = Arc::new(
            PatternResolver::new("local", Arc::new(FileRepository::new("local", repository())))
                .with_ivy_pattern(IVY_PATTERN)
                .with_artifact_pattern(ARTIFACT_PATTERN),
        );
        let settings = configure(
            Settings::builder()
                .cache_dir(cache)
                .resolver(resolver)
                .default_resolver("local"),
        )
        .build()
        .unwrap();
        ResolveEngine::new(
            ResolveContext::new(Arc::new(settings)),
            ResolutionCache::new(cache.to_path_buf()).unwrap(),
        )
    }

    fn root(dependencies: &str) -> Arc<ModuleDescriptor> {
        let data = format!(
            "organisation = \"acme\"\nmodule = \"app\"\nrevision = \"1.0\"\n\n[configurations]\ndefault = {{}}\ntest = {{ extends = [\"default\"] }}\n\n{}",
            dependencies
        );
        Arc::new(ModuleDescriptor::from_toml_str(&data, None).unwrap())
    }

    fn resolved(report: &ResolveReport, conf: &str) -> Vec<String> {
        report
            .configuration_report(conf)
            .unwrap()
            .module_revision_ids()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn range_dependency_picks_latest_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"[1.0,2.0]\"\nconf = \"default->default\"\n",
        );
        let report = engine.resolve(md, &ResolveOptions::default()).unwrap();

        assert_eq!(resolved(&report, "default"), vec!["acme#util;1.5"]);
        let node = report
            .configuration_report("default")
            .unwrap()
            .node(&ModuleRevisionId::of("acme", "util", "1.5"))
            .unwrap();
        assert_eq!(node.id, ModuleRevisionId::of("acme", "util", "[1.0,2.0]"));
        assert_eq!(node.artifacts.len(), 1);
        assert_eq!(node.artifacts[0].status, DownloadStatus::Successful);
        assert!(dir.path().join("acme-app-default.xml").exists());
    }

    #[test]
    fn latest_revision_wins_and_loser_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let report = engine.resolve(md, &ResolveOptions::default()).unwrap();

        // lib 1.0 depends on util 1.5
        let conf = report.configuration_report("default").unwrap();
        let evicted = conf
            .node(&ModuleRevisionId::of("acme", "util", "1.0"))
            .unwrap();
        assert!(evicted.is_evicted());
        assert_eq!(
            evicted.evicted.as_ref().unwrap().selected,
            vec![ModuleRevisionId::of("acme", "util", "1.5")]
        );
        assert!(!conf
            .node(&ModuleRevisionId::of("acme", "util", "1.5"))
            .unwrap()
            .is_evicted());
    }

    #[test]
    fn strict_conflict_fails_the_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b.default_conflict_manager("strict"));
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let error = engine.resolve(md, &ResolveOptions::default()).unwrap_err();

        assert!(matches!(error, ResolveError::Conflict(ConflictError::StrictConflict(_))));
    }

    #[test]
    fn latest_compatible_blacklists_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b.default_conflict_manager("latest-compatible"));
        // app -> util [1.0,2.0] resolves to 1.5 first, then app -> strict-lib 1.0 -> util 1.2
        // blacklists that resolution
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"[1.0,2.0]\"\nconf = \"default->default\"\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"strict-lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let report = engine.resolve(md, &ResolveOptions::default()).unwrap();

        let conf = report.configuration_report("default").unwrap();
        let selected: Vec<String> = conf
            .nodes_of(&crate::model::ModuleId::new("acme", "util"))
            .into_iter()
            .filter(|node| !node.is_evicted())
            .map(|node| node.resolved.to_string())
            .collect();
        assert_eq!(selected, vec!["acme#util;1.2"]);
    }

    #[test]
    fn unknown_configuration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let options = ResolveOptions {
            confs: vec!["runtime".to_owned()],
            ..Default::default()
        };
        let error = engine.resolve(root(""), &options).unwrap_err();

        assert!(matches!(
            error,
            ResolveError::UnknownConfiguration { confs, .. } if confs == vec!["runtime".to_owned()]
        ));
    }

    #[test]
    fn missing_module_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"ghost\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let report = engine.resolve(md, &ResolveOptions::default()).unwrap();

        assert!(report.has_error());
        let unresolved = report.unresolved_dependencies();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].problem.as_deref(), Some("not found"));
    }

    #[test]
    fn without_download_artifacts_are_only_listed() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let options = ResolveOptions {
            download: false,
            ..Default::default()
        };
        let report = engine.resolve(md, &options).unwrap();

        assert_eq!(report.artifacts().len(), 1);
        let node = report
            .configuration_report("test")
            .unwrap()
            .node(&ModuleRevisionId::of("acme", "util", "1.0"))
            .unwrap();
        assert_eq!(node.artifacts[0].status, DownloadStatus::No);
    }

    #[test]
    fn star_resolves_private_confs_too() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b);
        let data = "organisation = \"acme\"\nmodule = \"app\"\nrevision = \"1.0\"\n\n[configurations]\ndefault = {}\nbuild = { visibility = \"private\" }\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.0\"\nconf = \"build->default\"\n";
        let md = Arc::new(ModuleDescriptor::from_toml_str(data, None).unwrap());
        let resolve_id = default_resolve_id(&md.mrid);
        let report = engine.resolve(md, &ResolveOptions::default()).unwrap();

        assert_eq!(resolved(&report, "build"), vec!["acme#util;1.0"]);
        // a default retrieve reads the report of every conf back
        let cache = ResolutionCache::new(dir.path().to_path_buf()).unwrap();
        assert!(cache.report_path(&resolve_id, "build").exists());
        assert!(cache.report_path(&resolve_id, "default").exists());
    }

    #[test]
    fn second_identical_resolve_has_not_changed() {
        let dir = tempfile::tempdir().unwrap();
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );

        let first = engine(dir.path(), |b| b)
            .resolve(md.clone(), &ResolveOptions::default())
            .unwrap();
        assert!(first.has_changed());

        let second = engine(dir.path(), |b| b)
            .resolve(md, &ResolveOptions::default())
            .unwrap();
        assert!(!second.has_changed());
        assert!(!second.configuration_report("default").unwrap().has_changed());
    }

    #[test]
    fn changed_dependency_set_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        engine(dir.path(), |b| b)
            .resolve(
                root("[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.0\"\nconf = \"default->default\"\n"),
                &ResolveOptions::default(),
            )
            .unwrap();

        let report = engine(dir.path(), |b| b)
            .resolve(
                root("[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"1.2\"\nconf = \"default->default\"\n"),
                &ResolveOptions::default(),
            )
            .unwrap();
        assert!(report.has_changed());
    }

    #[test]
    fn restarts_beyond_the_bound_fail() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| {
            b.default_conflict_manager("latest-compatible").max_restarts(0)
        });
        // same graph as latest_compatible_blacklists_and_restarts, which needs one restart
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"[1.0,2.0]\"\nconf = \"default->default\"\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"strict-lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let error = engine.resolve(md, &ResolveOptions::default()).unwrap_err();

        assert!(matches!(
            error,
            ResolveError::RestartLoop { restarts: 1, .. }
        ));
    }

    #[test]
    fn latest_compatible_without_dynamic_way_out_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), |b| b.default_conflict_manager("latest-compatible"));
        // util [2.0,3.0] only matches 2.5, which strict-lib -> util 1.2 rules out
        let md = root(
            "[[dependencies]]\norganisation = \"acme\"\nmodule = \"util\"\nrevision = \"[2.0,3.0]\"\nconf = \"default->default\"\n\n[[dependencies]]\norganisation = \"acme\"\nmodule = \"strict-lib\"\nrevision = \"1.0\"\nconf = \"default->default\"\n",
        );
        let error = engine.resolve(md, &ResolveOptions::default()).unwrap_err();

        assert!(matches!(error, ResolveError::Conflict(ConflictError::StrictConflict(_))));
    }
}
