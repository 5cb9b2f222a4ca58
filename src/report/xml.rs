//! The `<ivy-report>` file left in the cache by each resolve, one per root
//! configuration. Retrieve and the change detection of the next resolve only
//! ever look at this file.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use quick_xml::{
    escape::unescape,
    events::{attributes::Attributes, BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};

use super::{
    ArtifactDownloadReport, ArtifactOrigin, ConfigurationResolveReport, DownloadStatus,
    NodeReport, ReportError, DATE_FORMAT,
};
use crate::model::{Artifact, ModuleId, ModuleRevisionId};

const EXTRA_PREFIX: &str = "extra-";

pub struct XmlReportWriter;

impl XmlReportWriter {
    /// Writes `report` to `path`, creating parent directories as needed.
    /// `confs` lists every configuration resolved along with this one.
    pub fn write(
        report: &ConfigurationResolveReport,
        confs: &[String],
        path: &Path,
    ) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::to_bytes(report, confs)?)?;
        Ok(())
    }

    pub fn to_bytes(
        report: &ConfigurationResolveReport,
        confs: &[String],
    ) -> Result<Vec<u8>, ReportError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("ivy-report").with_attributes([("version", "1.0")]),
        ))?;

        let module = &report.module;
        let date = report.date.format(DATE_FORMAT).to_string();
        let confs = confs.join(", ");
        let mut info = BytesStart::new("info");
        info.push_attribute(("organisation", module.organisation()));
        info.push_attribute(("module", module.name()));
        info.push_attribute(("revision", module.revision()));
        if let Some(branch) = module.branch() {
            info.push_attribute(("branch", branch));
        }
        push_extra(&mut info, module.extra_attributes());
        info.push_attribute(("conf", report.conf.as_str()));
        info.push_attribute(("confs", confs.as_str()));
        info.push_attribute(("date", date.as_str()));
        writer.write_event(Event::Empty(info))?;

        writer.write_event(Event::Start(BytesStart::new("dependencies")))?;
        let mut modules: IndexMap<&ModuleId, Vec<(usize, &NodeReport)>> = IndexMap::new();
        for (position, node) in report.nodes().iter().enumerate() {
            modules
                .entry(node.resolved.module_id())
                .or_default()
                .push((position, node));
        }
        for (module_id, nodes) in modules {
            writer.write_event(Event::Start(
                BytesStart::new("module").with_attributes([
                    ("organisation", module_id.organisation()),
                    ("name", module_id.name()),
                ]),
            ))?;
            for (position, node) in nodes {
                write_revision(&mut writer, node, position)?;
            }
            writer.write_event(Event::End(BytesEnd::new("module")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("dependencies")))?;
        writer.write_event(Event::End(BytesEnd::new("ivy-report")))?;
        Ok(writer.into_inner())
    }
}

fn push_extra(element: &mut BytesStart, extra: &BTreeMap<String, String>) {
    for (key, value) in extra {
        element.push_attribute((format!("{}{}", EXTRA_PREFIX, key).as_str(), value.as_str()));
    }
}

fn write_revision(
    writer: &mut Writer<Vec<u8>>,
    node: &NodeReport,
    position: usize,
) -> Result<(), ReportError> {
    let mrid = &node.resolved;
    let mut revision = BytesStart::new("revision");
    revision.push_attribute(("name", mrid.revision()));
    if let Some(branch) = mrid.branch() {
        revision.push_attribute(("branch", branch));
    }
    if let Some(status) = &node.status {
        revision.push_attribute(("status", status.as_str()));
    }
    if let Some(publication) = node.publication {
        revision.push_attribute(("pubdate", publication.format(DATE_FORMAT).to_string().as_str()));
    }
    if let Some(resolver) = &node.resolver {
        revision.push_attribute(("resolver", resolver.as_str()));
    }
    if let Some(resolver) = &node.artifact_resolver {
        revision.push_attribute(("artresolver", resolver.as_str()));
    }
    if let Some(homepage) = &node.homepage {
        revision.push_attribute(("homepage", homepage.as_str()));
    }
    if let Some(eviction) = &node.evicted {
        let manager = eviction.conflict_manager.as_deref().unwrap_or("transitive");
        revision.push_attribute(("evicted", manager));
        if let Some(detail) = &eviction.detail {
            revision.push_attribute(("evicted-reason", detail.as_str()));
        }
    }
    if let Some(problem) = &node.problem {
        revision.push_attribute(("error", problem.as_str()));
    }
    revision.push_attribute(("downloaded", bool_str(node.downloaded)));
    revision.push_attribute(("searched", bool_str(node.searched)));
    if let Some(is_default) = node.is_default {
        revision.push_attribute(("default", bool_str(is_default)));
    }
    revision.push_attribute(("conf", node.confs.join(", ").as_str()));
    revision.push_attribute(("position", position.to_string().as_str()));
    push_extra(&mut revision, mrid.extra_attributes());
    writer.write_event(Event::Start(revision))?;

    for license in &node.licenses {
        let mut element = BytesStart::new("license");
        element.push_attribute(("name", license.name.as_str()));
        if let Some(url) = &license.url {
            element.push_attribute(("url", url.as_str()));
        }
        writer.write_event(Event::Empty(element))?;
    }
    if let Some(eviction) = &node.evicted {
        for selected in &eviction.selected {
            writer.write_event(Event::Empty(
                BytesStart::new("evicted-by").with_attributes([("rev", selected.revision())]),
            ))?;
        }
    }
    for caller in &node.callers {
        let confs = caller.confs.join(", ");
        writer.write_event(Event::Empty(BytesStart::new("caller").with_attributes([
            ("organisation", caller.mrid.organisation()),
            ("name", caller.mrid.name()),
            ("conf", confs.as_str()),
            ("rev", caller.asked.revision()),
            ("callerrev", caller.mrid.revision()),
        ])))?;
    }

    writer.write_event(Event::Start(BytesStart::new("artifacts")))?;
    for report in &node.artifacts {
        let size = report.size.to_string();
        let time = report.download_time_ms.to_string();
        let status = report.status.to_string();
        let mut artifact = BytesStart::new("artifact");
        artifact.push_attribute(("name", report.name()));
        artifact.push_attribute(("type", report.kind()));
        artifact.push_attribute(("ext", report.ext()));
        push_extra(&mut artifact, &report.artifact.extra);
        artifact.push_attribute(("status", status.as_str()));
        artifact.push_attribute(("details", report.details.as_str()));
        artifact.push_attribute(("size", size.as_str()));
        artifact.push_attribute(("time", time.as_str()));
        let location = report
            .local_file
            .as_ref()
            .map(|file| file.to_string_lossy().into_owned());
        if let Some(location) = &location {
            artifact.push_attribute(("location", location.as_str()));
        }
        match &report.origin {
            Some(origin) => {
                writer.write_event(Event::Start(artifact))?;
                writer.write_event(Event::Empty(
                    BytesStart::new("origin-location").with_attributes([
                        ("is-local", bool_str(origin.is_local)),
                        ("location", origin.location.as_str()),
                    ]),
                ))?;
                writer.write_event(Event::End(BytesEnd::new("artifact")))?;
            }
            None => writer.write_event(Event::Empty(artifact))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new("artifacts")))?;
    writer.write_event(Event::End(BytesEnd::new("revision")))?;
    Ok(())
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// One `<revision>` element read back.
#[derive(Debug, Clone)]
struct ParsedRevision {
    mrid: ModuleRevisionId,
    position: usize,
    evicted: bool,
    error: bool,
    is_default: bool,
    publication: DateTime<Utc>,
    artifacts: Vec<ArtifactDownloadReport>,
}

#[derive(Debug, Clone)]
pub struct XmlReportParser {
    resolved_module: ModuleRevisionId,
    conf: String,
    date: Option<DateTime<Utc>>,
    revisions: Vec<ParsedRevision>,
}

impl XmlReportParser {
    pub fn parse(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content, path)
    }

    /// `source` only names the report in errors.
    pub fn parse_str(content: &str, source: &Path) -> Result<Self, ReportError> {
        let invalid = |reason: String| ReportError::Invalid {
            report: source.to_path_buf(),
            reason,
        };

        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut info: Option<(ModuleRevisionId, String, Option<DateTime<Utc>>)> = None;
        let mut module: Option<ModuleId> = None;
        let mut current: Option<ParsedRevision> = None;
        let mut revisions = vec![];

        loop {
            let (element, is_empty) = match reader.read_event()? {
                Event::Start(element) => (element, false),
                Event::Empty(element) => (element, true),
                Event::End(end) => {
                    if end.local_name().as_ref() == b"revision" {
                        revisions.extend(current.take());
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };
            let attributes = read_attributes(element.attributes());
            match element.local_name().as_ref() {
                b"info" => {
                    let mrid = attributes
                        .get("module")
                        .and_then(|module| {
                            module_revision_id(
                                attributes.get("organisation").map_or("", String::as_str),
                                module,
                                attributes.get("revision"),
                                &attributes,
                            )
                        })
                        .ok_or_else(|| invalid("incomplete info element".to_owned()))?;
                    let date = attributes
                        .get("date")
                        .map(|date| parse_date(date).map_err(&invalid))
                        .transpose()?;
                    let conf = attributes.get("conf").cloned().unwrap_or_default();
                    info = Some((mrid, conf, date));
                }
                b"module" => {
                    let organisation = attributes.get("organisation").cloned().unwrap_or_default();
                    let name = attributes
                        .get("name")
                        .ok_or_else(|| invalid("module without a name".to_owned()))?;
                    module = Some(ModuleId::new(organisation, name.clone()));
                }
                b"revision" => {
                    let module_id = module
                        .clone()
                        .ok_or_else(|| invalid("revision outside of a module".to_owned()))?;
                    let mrid = module_revision_id(
                        module_id.organisation(),
                        module_id.name(),
                        attributes.get("name"),
                        &attributes,
                    )
                    .ok_or_else(|| invalid(format!("revision of {} without a name", module_id)))?;
                    let publication = match attributes.get("pubdate") {
                        Some(date) => parse_date(date).map_err(&invalid)?,
                        None => DateTime::<Utc>::default(),
                    };
                    let position = match attributes.get("position") {
                        Some(position) => position
                            .parse()
                            .map_err(|_| invalid(format!("bad position `{}`", position)))?,
                        None => revisions.len(),
                    };
                    let revision = ParsedRevision {
                        mrid,
                        position,
                        evicted: attributes.contains_key("evicted"),
                        error: attributes.contains_key("error"),
                        is_default: attributes.get("default").is_some_and(|d| d == "true"),
                        publication,
                        artifacts: vec![],
                    };
                    if is_empty {
                        revisions.push(revision);
                    } else {
                        current = Some(revision);
                    }
                }
                b"artifact" => {
                    if let Some(revision) = current.as_mut() {
                        let report = artifact_report(revision, &attributes).map_err(&invalid)?;
                        revision.artifacts.push(report);
                    }
                }
                b"origin-location" => {
                    let last = current
                        .as_mut()
                        .and_then(|revision| revision.artifacts.last_mut());
                    if let Some(report) = last {
                        report.origin = Some(ArtifactOrigin {
                            is_local: attributes.get("is-local").is_some_and(|l| l == "true"),
                            location: attributes.get("location").cloned().unwrap_or_default(),
                        });
                    }
                }
                _ => {}
            }
        }

        let (resolved_module, conf, date) =
            info.ok_or_else(|| invalid("missing info element".to_owned()))?;
        revisions.sort_by_key(|revision| revision.position);
        Ok(Self {
            resolved_module,
            conf,
            date,
            revisions,
        })
    }

    pub fn resolved_module(&self) -> &ModuleRevisionId {
        &self.resolved_module
    }

    pub fn conf(&self) -> &str {
        &self.conf
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    /// Non evicted, error free revisions, a dependency always before its
    /// own dependencies.
    pub fn dependency_revision_ids(&self) -> Vec<ModuleRevisionId> {
        self.selected().map(|revision| revision.mrid.clone()).collect()
    }

    /// Same as [`Self::dependency_revision_ids`], without modules whose
    /// descriptor was synthesised.
    pub fn real_dependency_revision_ids(&self) -> Vec<ModuleRevisionId> {
        self.selected()
            .filter(|revision| !revision.is_default)
            .map(|revision| revision.mrid.clone())
            .collect()
    }

    pub fn publication(&self, mrid: &ModuleRevisionId) -> Option<DateTime<Utc>> {
        self.revisions
            .iter()
            .find(|revision| &revision.mrid == mrid)
            .map(|revision| revision.publication)
    }

    pub fn artifact_reports(&self) -> Vec<ArtifactDownloadReport> {
        self.revisions
            .iter()
            .filter(|revision| !revision.evicted)
            .flat_map(|revision| revision.artifacts.iter().cloned())
            .collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifact_reports()
            .into_iter()
            .map(|report| report.artifact)
            .collect()
    }

    fn selected(&self) -> impl Iterator<Item = &ParsedRevision> {
        self.revisions
            .iter()
            .filter(|revision| !revision.evicted && !revision.error)
    }
}

fn read_attributes(attributes: Attributes) -> BTreeMap<String, String> {
    attributes
        .flatten()
        .map(|attribute| {
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attribute.value);
            let value = unescape(&raw).map(Cow::into_owned).unwrap_or_else(|_| raw.to_string());
            (key, value)
        })
        .collect()
}

fn extra_attributes(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(EXTRA_PREFIX)
                .map(|key| (key.to_owned(), value.clone()))
        })
        .collect()
}

fn module_revision_id(
    organisation: &str,
    module: &str,
    revision: Option<&String>,
    attributes: &BTreeMap<String, String>,
) -> Option<ModuleRevisionId> {
    Some(
        ModuleRevisionId::of(organisation, module, revision?.clone())
            .with_branch(attributes.get("branch").cloned())
            .with_extra(extra_attributes(attributes)),
    )
}

fn artifact_report(
    revision: &ParsedRevision,
    attributes: &BTreeMap<String, String>,
) -> Result<ArtifactDownloadReport, String> {
    let name = attributes
        .get("name")
        .ok_or_else(|| format!("artifact of {} without a name", revision.mrid))?;
    let kind = attributes.get("type").cloned().unwrap_or_else(|| "jar".to_owned());
    let ext = attributes.get("ext").cloned().unwrap_or_else(|| kind.clone());
    let mut artifact = Artifact::new(
        revision.mrid.clone(),
        revision.publication,
        name.clone(),
        kind,
        ext,
    );
    artifact.extra = extra_attributes(attributes);
    let status = match attributes.get("status") {
        Some(status) => status.parse()?,
        None => DownloadStatus::No,
    };
    Ok(ArtifactDownloadReport {
        status,
        details: attributes.get("details").cloned().unwrap_or_default(),
        size: attributes.get("size").and_then(|s| s.parse().ok()).unwrap_or(0),
        download_time_ms: attributes.get("time").and_then(|t| t.parse().ok()).unwrap_or(0),
        local_file: attributes.get("location").map(PathBuf::from),
        ..ArtifactDownloadReport::new(artifact)
    })
}

fn parse_date(date: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(date, DATE_FORMAT)
        .map(|date| date.and_utc())
        .map_err(|e| format!("bad date `{}`: {}", date, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use crate::report::EvictionReport;

    fn mrid(name: &str, revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", name, revision)
    }

    fn report() -> ConfigurationResolveReport {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut report =
            ConfigurationResolveReport::new(mrid("app", "1.0"), "compile", date, "acme-app");

        let mut lib = NodeReport::new(mrid("lib", "[1.0,2.0]"), mrid("lib", "1.5"));
        lib.status = Some("release".to_owned());
        lib.publication = Some(date);
        lib.resolver = Some("local".to_owned());
        lib.artifact_resolver = Some("local".to_owned());
        lib.is_default = Some(false);
        lib.confs = vec!["default".to_owned()];
        lib.artifacts = vec![ArtifactDownloadReport {
            status: DownloadStatus::Successful,
            size: 42,
            local_file: Some(PathBuf::from("/cache/acme/lib/jars/lib-1.5.jar")),
            origin: Some(ArtifactOrigin {
                is_local: true,
                location: "/repo/acme/lib/1.5/lib.jar".to_owned(),
            }),
            ..ArtifactDownloadReport::new(Artifact::new(
                mrid("lib", "1.5"),
                date,
                "lib",
                "jar",
                "jar",
            ))
        }];
        report.add_node(lib);

        let mut old = NodeReport::new(mrid("lib", "1.0"), mrid("lib", "1.0"));
        old.evicted = Some(EvictionReport {
            conflict_manager: Some("latest-revision".to_owned()),
            parent: Some(mrid("app", "1.0")),
            selected: vec![mrid("lib", "1.5")],
            detail: None,
        });
        report.add_node(old);

        let mut missing = NodeReport::new(mrid("gone", "1.0"), mrid("gone", "1.0"));
        missing.problem = Some("not found".to_owned());
        report.add_node(missing);

        let mut synthesised = NodeReport::new(mrid("raw", "0.1"), mrid("raw", "0.1"));
        synthesised.is_default = Some(true);
        report.add_node(synthesised);
        report
    }

    #[test]
    fn written_report_reads_back() {
        let bytes = XmlReportWriter::to_bytes(&report(), &["compile".to_owned()]).unwrap();
        let content = String::from_utf8(bytes).unwrap();
        assert!(content.contains("<ivy-report version=\"1.0\">"));
        assert!(content.contains("evicted=\"latest-revision\""));

        let parser = XmlReportParser::parse_str(&content, Path::new("report.xml")).unwrap();
        assert_eq!(parser.resolved_module(), &mrid("app", "1.0"));
        assert_eq!(parser.conf(), "compile");
        assert_eq!(
            parser.date(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
        );
        assert_eq!(
            parser.dependency_revision_ids(),
            vec![mrid("lib", "1.5"), mrid("raw", "0.1")]
        );
        assert_eq!(parser.real_dependency_revision_ids(), vec![mrid("lib", "1.5")]);

        let artifacts = parser.artifact_reports();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, DownloadStatus::Successful);
        assert_eq!(artifacts[0].size, 42);
        assert_eq!(
            artifacts[0].local_file,
            Some(PathBuf::from("/cache/acme/lib/jars/lib-1.5.jar"))
        );
        assert_eq!(artifacts[0].origin.as_ref().map(|o| o.is_local), Some(true));
        assert_eq!(artifacts[0].artifact.id(), report().nodes()[0].artifacts[0].artifact.id());
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut report = report();
        report.nodes_mut()[2].problem = Some("bad <descriptor> & \"quotes\"".to_owned());
        let bytes = XmlReportWriter::to_bytes(&report, &["compile".to_owned()]).unwrap();
        let content = String::from_utf8(bytes).unwrap();
        assert!(content.contains("&lt;descriptor&gt; &amp;"));
        XmlReportParser::parse_str(&content, Path::new("report.xml")).unwrap();
    }

    #[test]
    fn missing_info_is_invalid() {
        let result = XmlReportParser::parse_str(
            "<ivy-report version=\"1.0\"><dependencies/></ivy-report>",
            Path::new("broken.xml"),
        );
        assert!(matches!(result, Err(ReportError::Invalid { .. })));
    }
}
