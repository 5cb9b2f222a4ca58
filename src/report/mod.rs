//! Outcome of a resolve, per root configuration, and its persisted XML form.

use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use log::warn;
use thiserror::Error;

use crate::{
    cache::ResolutionCache,
    model::{Artifact, License, ModuleDescriptor, ModuleId, ModuleRevisionId},
};

pub mod xml;

pub use xml::{XmlReportParser, XmlReportWriter};

/// Format of the dates written in reports.
pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

pub const MISSING_ARTIFACT: &str = "missing artifact";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error on report: {0}")]
    IO(#[from] std::io::Error),
    #[error("XML error in report: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Failed to parse report {report}: {reason}")]
    Invalid { report: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownloadStatus {
    /// Nothing had to be downloaded.
    #[default]
    No,
    Successful,
    Failed,
}

impl Display for DownloadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::No => f.write_str("no"),
            DownloadStatus::Successful => f.write_str("successful"),
            DownloadStatus::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "no" => Ok(DownloadStatus::No),
            "successful" => Ok(DownloadStatus::Successful),
            "failed" => Ok(DownloadStatus::Failed),
            other => Err(format!("unknown download status `{}`", other)),
        }
    }
}

/// Where an artifact was fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactOrigin {
    pub is_local: bool,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDownloadReport {
    pub artifact: Artifact,
    pub status: DownloadStatus,
    pub details: String,
    pub size: u64,
    pub download_time_ms: u64,
    pub local_file: Option<PathBuf>,
    pub origin: Option<ArtifactOrigin>,
}

impl ArtifactDownloadReport {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            status: DownloadStatus::No,
            details: String::new(),
            size: 0,
            download_time_ms: 0,
            local_file: None,
            origin: None,
        }
    }

    pub fn failed(artifact: Artifact, details: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Failed,
            details: details.into(),
            ..Self::new(artifact)
        }
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn kind(&self) -> &str {
        &self.artifact.kind
    }

    pub fn ext(&self) -> &str {
        &self.artifact.ext
    }

    pub fn is_downloaded(&self) -> bool {
        self.status == DownloadStatus::Successful
    }
}

impl Display for ArtifactDownloadReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            DownloadStatus::Successful => write!(
                f,
                "[SUCCESSFUL ] {} ({}ms)",
                self.artifact, self.download_time_ms
            ),
            DownloadStatus::Failed if self.details == MISSING_ARTIFACT => write!(
                f,
                "[NOT FOUND  ] {} ({}ms)",
                self.artifact, self.download_time_ms
            ),
            DownloadStatus::Failed => write!(
                f,
                "[FAILED     ] {}: {} ({}ms)",
                self.artifact, self.details, self.download_time_ms
            ),
            DownloadStatus::No => write!(f, "[NOT REQUIRED] {}", self.artifact),
        }
    }
}

/// Why a node lost in one root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    /// `None` for a transitive eviction.
    pub conflict_manager: Option<String>,
    pub parent: Option<ModuleRevisionId>,
    pub selected: Vec<ModuleRevisionId>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerReport {
    pub mrid: ModuleRevisionId,
    pub confs: Vec<String>,
    /// The dependency as declared by the caller.
    pub asked: ModuleRevisionId,
}

/// Snapshot of one dependency node as seen from one root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub id: ModuleRevisionId,
    pub resolved: ModuleRevisionId,
    /// Present once the descriptor is loaded.
    pub status: Option<String>,
    pub publication: Option<DateTime<Utc>>,
    pub resolver: Option<String>,
    pub artifact_resolver: Option<String>,
    pub is_default: Option<bool>,
    pub evicted: Option<EvictionReport>,
    pub problem: Option<String>,
    pub downloaded: bool,
    pub searched: bool,
    /// Dependency configurations required in the root configuration.
    pub confs: Vec<String>,
    pub licenses: Vec<License>,
    pub homepage: Option<String>,
    pub callers: Vec<CallerReport>,
    pub artifacts: Vec<ArtifactDownloadReport>,
}

impl NodeReport {
    pub fn new(id: ModuleRevisionId, resolved: ModuleRevisionId) -> Self {
        Self {
            id,
            resolved,
            status: None,
            publication: None,
            resolver: None,
            artifact_resolver: None,
            is_default: None,
            evicted: None,
            problem: None,
            downloaded: false,
            searched: false,
            confs: vec![],
            licenses: vec![],
            homepage: None,
            callers: vec![],
            artifacts: vec![],
        }
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_some()
    }

    pub fn has_problem(&self) -> bool {
        self.problem.is_some()
    }
}

impl Display for NodeReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resolved)
    }
}

/// Resolution of one root configuration. Nodes are kept most dependent first.
#[derive(Debug, Clone)]
pub struct ConfigurationResolveReport {
    pub module: ModuleRevisionId,
    pub conf: String,
    pub date: DateTime<Utc>,
    pub resolve_id: String,
    nodes: Vec<NodeReport>,
    has_changed: Option<bool>,
}

impl ConfigurationResolveReport {
    pub fn new(
        module: ModuleRevisionId,
        conf: impl Into<String>,
        date: DateTime<Utc>,
        resolve_id: impl Into<String>,
    ) -> Self {
        Self {
            module,
            conf: conf.into(),
            date,
            resolve_id: resolve_id.into(),
            nodes: vec![],
            has_changed: None,
        }
    }

    pub fn add_node(&mut self, node: NodeReport) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[NodeReport] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [NodeReport] {
        &mut self.nodes
    }

    pub fn node(&self, mrid: &ModuleRevisionId) -> Option<&NodeReport> {
        self.nodes
            .iter()
            .find(|node| &node.resolved == mrid)
            .or_else(|| self.nodes.iter().find(|node| &node.id == mrid))
    }

    /// Non evicted, error free dependencies, a dependency always before its
    /// own dependencies.
    pub fn module_revision_ids(&self) -> IndexSet<ModuleRevisionId> {
        self.nodes
            .iter()
            .filter(|node| !node.is_evicted() && !node.has_problem())
            .map(|node| node.resolved.clone())
            .collect()
    }

    pub fn unresolved_dependencies(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|node| node.has_problem()).collect()
    }

    pub fn evicted_nodes(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|node| node.is_evicted()).collect()
    }

    pub fn downloaded_nodes(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|node| node.downloaded).collect()
    }

    pub fn searched_nodes(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|node| node.searched).collect()
    }

    pub fn download_reports(&self, mrid: &ModuleRevisionId) -> &[ArtifactDownloadReport] {
        self.node(mrid).map_or(&[], |node| node.artifacts.as_slice())
    }

    /// Module ids in node order.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let ids: IndexSet<ModuleId> = self
            .nodes
            .iter()
            .map(|node| node.resolved.module_id().clone())
            .collect();
        ids.into_iter().collect()
    }

    pub fn nodes_of(&self, module_id: &ModuleId) -> Vec<&NodeReport> {
        self.nodes
            .iter()
            .filter(|node| node.resolved.module_id() == module_id)
            .collect()
    }

    pub fn nodes_number(&self) -> usize {
        self.nodes.len()
    }

    pub fn artifacts_number(&self) -> usize {
        self.nodes.iter().map(|node| node.artifacts.len()).sum()
    }

    /// Download reports, optionally restricted to one status and to non
    /// evicted modules.
    pub fn artifacts_reports(
        &self,
        status: Option<DownloadStatus>,
        with_evicted: bool,
    ) -> Vec<&ArtifactDownloadReport> {
        self.nodes
            .iter()
            .filter(|node| with_evicted || !node.is_evicted())
            .flat_map(|node| node.artifacts.iter())
            .filter(|report| status.map_or(true, |status| report.status == status))
            .collect()
    }

    pub fn all_artifacts_reports(&self) -> Vec<&ArtifactDownloadReport> {
        self.artifacts_reports(None, true)
    }

    pub fn downloaded_artifacts_reports(&self) -> Vec<&ArtifactDownloadReport> {
        self.artifacts_reports(Some(DownloadStatus::Successful), true)
    }

    /// Failed downloads, merged artifacts excluded.
    pub fn failed_artifacts_reports(&self) -> Vec<&ArtifactDownloadReport> {
        self.artifacts_reports(Some(DownloadStatus::Failed), true)
            .into_iter()
            .filter(|report| !report.artifact.is_merged())
            .collect()
    }

    pub fn has_error(&self) -> bool {
        !self.unresolved_dependencies().is_empty() || !self.failed_artifacts_reports().is_empty()
    }

    /// Compares the dependency set with the report left in `cache` by the
    /// previous resolve. Must run before the new report is written.
    pub fn check_if_changed(&mut self, cache: &ResolutionCache) {
        let previous = cache.report_path(&self.resolve_id, &self.conf);
        let changed = if previous.exists() {
            match XmlReportParser::parse(&previous) {
                Ok(parser) => {
                    let previous: IndexSet<ModuleRevisionId> =
                        parser.dependency_revision_ids().into_iter().collect();
                    let current = self.module_revision_ids();
                    previous.len() != current.len() || !previous.iter().all(|m| current.contains(m))
                }
                Err(error) => {
                    warn!(
                        "Error while parsing configuration resolve report {}: {}",
                        previous.display(),
                        error
                    );
                    true
                }
            }
        } else {
            true
        };
        self.has_changed = Some(changed);
    }

    /// `true` until [`Self::check_if_changed`] says otherwise.
    pub fn has_changed(&self) -> bool {
        self.has_changed.unwrap_or(true)
    }

    /// The row of the summary table for this configuration.
    pub fn summary_line(&self) -> String {
        let mut line = String::from("\t");
        append(&mut line, &self.conf, 18);
        append(&mut line, &self.nodes_number().to_string(), 7);
        append(&mut line, &self.searched_nodes().len().to_string(), 7);
        append(&mut line, &self.downloaded_nodes().len().to_string(), 7);
        append(&mut line, &self.evicted_nodes().len().to_string(), 7);
        line.push('|');
        append(&mut line, &self.artifacts_number().to_string(), 7);
        append(
            &mut line,
            &self.downloaded_artifacts_reports().len().to_string(),
            7,
        );
        line.push('|');
        line
    }
}

/// Centers `value` in a `width` wide cell, truncating it when too long.
fn append(line: &mut String, value: &str, width: usize) {
    let chars: Vec<char> = value.chars().collect();
    line.push('|');
    if chars.len() >= width {
        line.extend(&chars[..width]);
    } else {
        let missing = width - chars.len();
        let half = missing / 2;
        line.extend(std::iter::repeat(' ').take(missing - half));
        line.extend(&chars);
        line.extend(std::iter::repeat(' ').take(half));
    }
}

/// Resolution of a module in every requested configuration.
#[derive(Debug, Clone)]
pub struct ResolveReport {
    pub descriptor: Arc<ModuleDescriptor>,
    pub resolve_id: String,
    confs: IndexMap<String, ConfigurationResolveReport>,
    problem_messages: Vec<String>,
    /// Resolved ids of every node, most dependent first.
    dependencies: Vec<ModuleRevisionId>,
    artifacts: Vec<Artifact>,
    pub resolve_time_ms: u64,
    pub download_time_ms: u64,
}

impl ResolveReport {
    pub fn new(descriptor: Arc<ModuleDescriptor>, resolve_id: impl Into<String>) -> Self {
        Self {
            descriptor,
            resolve_id: resolve_id.into(),
            confs: IndexMap::new(),
            problem_messages: vec![],
            dependencies: vec![],
            artifacts: vec![],
            resolve_time_ms: 0,
            download_time_ms: 0,
        }
    }

    pub fn add_report(&mut self, report: ConfigurationResolveReport) {
        self.confs.insert(report.conf.clone(), report);
    }

    pub fn configuration_report(&self, conf: &str) -> Option<&ConfigurationResolveReport> {
        self.confs.get(conf)
    }

    pub fn configuration_report_mut(
        &mut self,
        conf: &str,
    ) -> Option<&mut ConfigurationResolveReport> {
        self.confs.get_mut(conf)
    }

    pub fn configuration_reports(&self) -> impl Iterator<Item = &ConfigurationResolveReport> {
        self.confs.values()
    }

    pub fn configurations(&self) -> Vec<String> {
        self.confs.keys().cloned().collect()
    }

    pub fn set_dependencies(&mut self, dependencies: Vec<ModuleRevisionId>, artifacts: Vec<Artifact>) {
        self.dependencies = dependencies;
        self.artifacts = artifacts;
    }

    pub fn dependencies(&self) -> &[ModuleRevisionId] {
        &self.dependencies
    }

    /// Artifacts selected for download, whether they were downloaded or not.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Module ids of the dependencies, most dependent first.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let ids: IndexSet<ModuleId> = self
            .dependencies
            .iter()
            .map(|mrid| mrid.module_id().clone())
            .collect();
        ids.into_iter().collect()
    }

    pub fn has_error(&self) -> bool {
        self.confs.values().any(ConfigurationResolveReport::has_error)
    }

    pub fn has_changed(&self) -> bool {
        self.confs.values().any(ConfigurationResolveReport::has_changed)
    }

    pub fn evicted_nodes(&self) -> Vec<&NodeReport> {
        unique_nodes(self.confs.values().flat_map(|r| r.evicted_nodes()))
    }

    pub fn unresolved_dependencies(&self) -> Vec<&NodeReport> {
        unique_nodes(self.confs.values().flat_map(|r| r.unresolved_dependencies()))
    }

    pub fn failed_artifacts_reports(&self) -> Vec<&ArtifactDownloadReport> {
        let mut seen = IndexSet::new();
        self.confs
            .values()
            .flat_map(|r| r.failed_artifacts_reports())
            .filter(|report| seen.insert(report.artifact.id()))
            .collect()
    }

    pub fn set_problem_messages(&mut self, problems: Vec<String>) {
        self.problem_messages = problems;
    }

    pub fn problem_messages(&self) -> &[String] {
        &self.problem_messages
    }

    /// Problem messages plus one line per unresolved dependency and failed
    /// download.
    pub fn all_problem_messages(&self) -> Vec<String> {
        let mut messages = self.problem_messages.clone();
        for report in self.confs.values() {
            for node in report.unresolved_dependencies() {
                match node.problem.as_deref() {
                    Some(problem) if !problem.is_empty() => {
                        messages.push(format!("unresolved dependency: {}: {}", node.id, problem))
                    }
                    _ => messages.push(format!("unresolved dependency: {}", node.id)),
                }
            }
            for failed in report.failed_artifacts_reports() {
                messages.push(format!("download failed: {}", failed.artifact));
            }
        }
        messages
    }

    /// The console summary: evicted modules, the per configuration table and
    /// the problem banners.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![];
        let evicted = self.evicted_nodes();
        if !evicted.is_empty() {
            lines.push("\t:: evicted modules:".to_owned());
            for node in evicted {
                let confs: Vec<&str> = self
                    .confs
                    .values()
                    .filter(|r| r.node(&node.resolved).is_some_and(NodeReport::is_evicted))
                    .map(|r| r.conf.as_str())
                    .collect();
                match &node.evicted {
                    Some(eviction) if eviction.conflict_manager.is_none() => lines.push(format!(
                        "\t{} transitively in [{}]",
                        node.resolved,
                        confs.join(", ")
                    )),
                    Some(eviction) => {
                        let by: Vec<String> =
                            eviction.selected.iter().map(ToString::to_string).collect();
                        lines.push(format!(
                            "\t{} by [{}] in [{}]",
                            node.resolved,
                            by.join(", "),
                            confs.join(", ")
                        ));
                        if let Some(detail) = &eviction.detail {
                            lines.push(format!("\t  {}", detail));
                        }
                    }
                    None => {}
                }
            }
        }

        let separator = format!("\t{}", "-".repeat(69));
        lines.push(separator.clone());
        let mut header = String::from("\t");
        append(&mut header, "", 18);
        append(&mut header, "modules", 31);
        header.push('|');
        append(&mut header, "artifacts", 15);
        header.push('|');
        lines.push(header);
        let mut header = String::from("\t");
        for (name, width) in [
            ("conf", 18),
            ("number", 7),
            ("search", 7),
            ("dwnlded", 7),
            ("evicted", 7),
        ] {
            append(&mut header, name, width);
        }
        header.push('|');
        append(&mut header, "number", 7);
        append(&mut header, "dwnlded", 7);
        header.push('|');
        lines.push(header);
        lines.push(separator.clone());
        lines.extend(self.confs.values().map(ConfigurationResolveReport::summary_line));
        lines.push(separator);

        let unresolved = self.unresolved_dependencies();
        if !unresolved.is_empty() {
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
            lines.push("\t::          UNRESOLVED DEPENDENCIES         ::".to_owned());
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
            for node in unresolved {
                lines.push(format!(
                    "\t:: {}: {}",
                    node.id,
                    node.problem.as_deref().unwrap_or_default()
                ));
            }
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
        }
        let failed = self.failed_artifacts_reports();
        if !failed.is_empty() {
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
            lines.push("\t::              FAILED DOWNLOADS            ::".to_owned());
            lines.push("\t:: ^ see resolution messages for details  ^ ::".to_owned());
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
            for report in failed {
                lines.push(format!("\t:: {}", report.artifact));
            }
            lines.push("\t::::::::::::::::::::::::::::::::::::::::::::::".to_owned());
        }
        lines
    }
}

fn unique_nodes<'a>(nodes: impl Iterator<Item = &'a NodeReport>) -> Vec<&'a NodeReport> {
    let mut seen = IndexSet::new();
    nodes.filter(|node| seen.insert(node.resolved.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn mrid(name: &str, revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", name, revision)
    }

    fn node(name: &str, revision: &str) -> NodeReport {
        NodeReport::new(mrid(name, revision), mrid(name, revision))
    }

    fn artifact_report(name: &str, revision: &str, status: DownloadStatus) -> ArtifactDownloadReport {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ArtifactDownloadReport {
            status,
            ..ArtifactDownloadReport::new(Artifact::new(mrid(name, revision), date, name, "jar", "jar"))
        }
    }

    fn report() -> ConfigurationResolveReport {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut report = ConfigurationResolveReport::new(mrid("app", "1.0"), "default", date, "acme-app");

        let mut lib = node("lib", "1.5");
        lib.searched = true;
        lib.downloaded = true;
        lib.artifacts = vec![artifact_report("lib", "1.5", DownloadStatus::Successful)];
        report.add_node(lib);

        let mut old = node("lib", "1.0");
        old.evicted = Some(EvictionReport {
            conflict_manager: Some("latest-revision".to_owned()),
            parent: Some(mrid("app", "1.0")),
            selected: vec![mrid("lib", "1.5")],
            detail: None,
        });
        report.add_node(old);

        let mut broken = node("log", "2.0");
        broken.problem = Some("not found".to_owned());
        report.add_node(broken);

        let mut util = node("util", "1.0");
        util.artifacts = vec![artifact_report("util", "1.0", DownloadStatus::Failed)];
        report.add_node(util);
        report
    }

    #[test]
    fn configuration_queries() {
        let report = report();
        assert_eq!(
            report.module_revision_ids().into_iter().collect::<Vec<_>>(),
            vec![mrid("lib", "1.5"), mrid("util", "1.0")]
        );
        assert_eq!(report.evicted_nodes().len(), 1);
        assert_eq!(report.unresolved_dependencies()[0].id, mrid("log", "2.0"));
        assert_eq!(report.searched_nodes().len(), 1);
        assert_eq!(report.artifacts_number(), 2);
        assert_eq!(report.downloaded_artifacts_reports().len(), 1);
        assert_eq!(report.failed_artifacts_reports().len(), 1);
        assert!(report.has_error());
        assert_eq!(
            report.module_ids(),
            vec![
                ModuleId::new("acme", "lib"),
                ModuleId::new("acme", "log"),
                ModuleId::new("acme", "util")
            ]
        );
        assert_eq!(report.nodes_of(&ModuleId::new("acme", "lib")).len(), 2);
    }

    #[test]
    fn summary_line_is_centered() {
        let report = report();
        assert_eq!(
            report.summary_line(),
            "\t|      default     |   4   |   1   |   1   |   1   ||   2   |   1   |"
        );
    }

    #[test]
    fn problem_messages_list_unresolved_and_failed() {
        let descriptor = Arc::new(ModuleDescriptor::default_for(
            mrid("app", "1.0"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let mut resolve = ResolveReport::new(descriptor, "acme-app");
        resolve.set_problem_messages(vec!["module not found: acme#log;2.0".to_owned()]);
        resolve.add_report(report());
        assert_eq!(
            resolve.all_problem_messages(),
            vec![
                "module not found: acme#log;2.0",
                "unresolved dependency: acme#log;2.0: not found",
                "download failed: acme#util;1.0!util.jar",
            ]
        );
        let summary = resolve.summary();
        assert!(summary.contains(&"\t::          UNRESOLVED DEPENDENCIES         ::".to_owned()));
        assert!(summary.contains(&"\t::              FAILED DOWNLOADS            ::".to_owned()));
        assert!(summary.contains(&"\tacme#lib;1.0 by [acme#lib;1.5] in [default]".to_owned()));
    }

    #[test]
    fn download_status_round_trip() {
        assert_eq!(DownloadStatus::Failed.to_string(), "failed");
        assert_eq!("successful".parse(), Ok(DownloadStatus::Successful));
        assert!("unknown".parse::<DownloadStatus>().is_err());
    }
}
