use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use toml::Table;

use crate::model::{
    id::{ArtifactId, ArtifactRevisionId, ModuleRevisionId},
    ParseError,
};

pub const DEFAULT_CONFIGURATION: &str = "default";
const DEFAULT_STATUS: &str = "integration";
const DEFAULT_ARTIFACT_TYPE: &str = "jar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    pub extends: Vec<String>,
    pub visibility: Visibility,
    pub transitive: bool,
    pub description: Option<String>,
}

impl Configuration {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: vec![],
            visibility: Visibility::Public,
            transitive: true,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct License {
    pub name: String,
    pub url: Option<String>,
}

/// A file published by a module revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub mrid: ModuleRevisionId,
    pub name: String,
    pub kind: String,
    pub ext: String,
    pub extra: BTreeMap<String, String>,
    pub publication: DateTime<Utc>,
    pub confs: Vec<String>,
}

impl Artifact {
    pub fn new(
        mrid: ModuleRevisionId,
        publication: DateTime<Utc>,
        name: impl Into<String>,
        kind: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            mrid,
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            extra: BTreeMap::new(),
            publication,
            confs: vec![],
        }
    }

    /// The descriptor of a module seen as an artifact of type `ivy`.
    pub fn metadata(mrid: ModuleRevisionId, publication: DateTime<Utc>) -> Self {
        Self::new(mrid, publication, "ivy", "ivy", "toml")
    }

    pub fn id(&self) -> ArtifactRevisionId {
        let artifact_id = ArtifactId::new(
            self.mrid.module_id().clone(),
            self.name.clone(),
            self.kind.clone(),
            self.ext.clone(),
        )
        .with_extra(self.extra.clone());
        ArtifactRevisionId::new(artifact_id, self.mrid.clone())
    }

    pub fn is_merged(&self) -> bool {
        self.extra.contains_key("ivy:merged")
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A dependency declared by a module, as written in its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub parent: ModuleRevisionId,
    pub dependency: ModuleRevisionId,
    pub force: bool,
    pub changing: bool,
    pub transitive: bool,
    conf_mappings: Vec<(Vec<String>, Vec<String>)>,
}

impl DependencyDescriptor {
    pub fn new(parent: ModuleRevisionId, dependency: ModuleRevisionId) -> Self {
        Self {
            parent,
            dependency,
            force: false,
            changing: false,
            transitive: true,
            conf_mappings: vec![(vec!["*".to_owned()], vec!["*".to_owned()])],
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_transitive(mut self, transitive: bool) -> Self {
        self.transitive = transitive;
        self
    }

    /// Replaces the configuration mapping, e.g. `compile->default;test->*`.
    pub fn with_conf_mapping(mut self, mapping: &str) -> Result<Self, ParseError> {
        self.conf_mappings = parse_conf_mapping(mapping)?;
        Ok(self)
    }

    /// The mapping in its textual form, e.g. `compile->default;test->*`.
    pub fn conf_mapping(&self) -> String {
        self.conf_mappings
            .iter()
            .map(|(masters, dependencies)| {
                format!("{}->{}", masters.join(","), dependencies.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn module_configurations(&self) -> Vec<String> {
        let mut confs: Vec<String> = vec![];
        for (masters, _) in &self.conf_mappings {
            for master in masters {
                if !confs.contains(master) {
                    confs.push(master.clone());
                }
            }
        }
        confs
    }

    /// Dependency confs required when the owning module is used in `master_conf`.
    /// `*` is left for the caller to expand against the dependency's descriptor.
    pub fn dependency_configurations(&self, master_conf: &str) -> Vec<String> {
        let mut confs: Vec<String> = vec![];
        for (masters, dependencies) in &self.conf_mappings {
            if masters.iter().any(|m| m == master_conf || m == "*") {
                for conf in dependencies {
                    let conf = if conf == "@" {
                        master_conf.to_owned()
                    } else {
                        conf.clone()
                    };
                    if !confs.contains(&conf) {
                        confs.push(conf);
                    }
                }
            }
        }
        confs
    }
}

fn parse_conf_mapping(mapping: &str) -> Result<Vec<(Vec<String>, Vec<String>)>, ParseError> {
    let split = |s: &str| -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect()
    };
    let mut mappings = vec![];
    for group in mapping.split(';').map(str::trim).filter(|g| !g.is_empty()) {
        let (masters, dependencies) = match group.split_once("->") {
            Some((masters, dependencies)) => (split(masters), split(dependencies)),
            None => (split(group), vec![DEFAULT_CONFIGURATION.to_owned()]),
        };
        if masters.is_empty() || dependencies.is_empty() || dependencies.iter().any(|d| d.contains("->")) {
            return Err(ParseError::InvalidConfigurationMapping(mapping.to_owned()));
        }
        mappings.push((masters, dependencies));
    }
    if mappings.is_empty() {
        return Err(ParseError::InvalidConfigurationMapping(mapping.to_owned()));
    }
    Ok(mappings)
}

/// Metadata of one module revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub mrid: ModuleRevisionId,
    pub status: String,
    pub publication: DateTime<Utc>,
    pub configurations: Vec<Configuration>,
    pub dependencies: Vec<DependencyDescriptor>,
    pub artifacts: Vec<Artifact>,
    pub licenses: Vec<License>,
    pub homepage: Option<String>,
    /// Synthesised because the repository had no descriptor for this revision.
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    organisation: String,
    module: String,
    branch: Option<String>,
    revision: String,
    status: Option<String>,
    publication: Option<String>,
    homepage: Option<String>,
    configurations: Option<Table>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    artifacts: Vec<RawArtifact>,
    #[serde(default)]
    licenses: Vec<License>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfiguration {
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default)]
    visibility: Visibility,
    transitive: Option<bool>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    organisation: String,
    module: String,
    branch: Option<String>,
    revision: String,
    conf: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    changing: bool,
    transitive: Option<bool>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    ext: Option<String>,
    conf: Option<Vec<String>>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

impl ModuleDescriptor {
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        let contents = std::fs::read_to_string(path)?;
        let modified = std::fs::metadata(path)?.modified()?;
        Self::from_toml_str(&contents, Some(DateTime::<Utc>::from(modified)))
    }

    /// Parses a TOML descriptor. `default_publication` is used when the
    /// descriptor does not carry its own publication date.
    pub fn from_toml_str(
        data: &str,
        default_publication: Option<DateTime<Utc>>,
    ) -> Result<Self, ParseError> {
        let raw: RawDescriptor = toml::from_str(data)?;
        let mrid = ModuleRevisionId::of(raw.organisation, raw.module, raw.revision)
            .with_branch(raw.branch)
            .with_extra(raw.extra);
        let publication = match raw.publication {
            Some(date) => DateTime::parse_from_rfc3339(&date)
                .map_err(|_| ParseError::InvalidDate(date.clone()))?
                .with_timezone(&Utc),
            None => default_publication.unwrap_or_else(Utc::now),
        };

        let configurations = match raw.configurations {
            Some(table) if !table.is_empty() => {
                let mut configurations = Vec::with_capacity(table.len());
                for (name, value) in table {
                    let raw_conf: RawConfiguration = value.try_into()?;
                    configurations.push(Configuration {
                        name,
                        extends: raw_conf.extends,
                        visibility: raw_conf.visibility,
                        transitive: raw_conf.transitive.unwrap_or(true),
                        description: raw_conf.description,
                    });
                }
                configurations
            }
            _ => vec![Configuration::public(DEFAULT_CONFIGURATION)],
        };
        for conf in &configurations {
            for extended in &conf.extends {
                if !configurations.iter().any(|c| &c.name == extended) {
                    return Err(ParseError::UnknownExtendedConfiguration(
                        conf.name.clone(),
                        extended.clone(),
                    ));
                }
            }
        }

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for dependency in raw.dependencies {
            let dependency_mrid =
                ModuleRevisionId::of(dependency.organisation, dependency.module, dependency.revision)
                    .with_branch(dependency.branch)
                    .with_extra(dependency.extra);
            let mut dd = DependencyDescriptor::new(mrid.clone(), dependency_mrid)
                .with_force(dependency.force)
                .with_transitive(dependency.transitive.unwrap_or(true));
            dd.changing = dependency.changing;
            if let Some(conf) = dependency.conf {
                dd = dd.with_conf_mapping(&conf)?;
            }
            dependencies.push(dd);
        }

        let public_confs: Vec<String> = configurations
            .iter()
            .filter(|c| c.visibility == Visibility::Public)
            .map(|c| c.name.clone())
            .collect();
        let artifacts = if raw.artifacts.is_empty() {
            let mut artifact = Artifact::new(
                mrid.clone(),
                publication,
                mrid.name(),
                DEFAULT_ARTIFACT_TYPE,
                DEFAULT_ARTIFACT_TYPE,
            );
            artifact.confs = public_confs;
            vec![artifact]
        } else {
            raw.artifacts
                .into_iter()
                .map(|raw_artifact| {
                    let kind = raw_artifact
                        .kind
                        .unwrap_or_else(|| DEFAULT_ARTIFACT_TYPE.to_owned());
                    let ext = raw_artifact.ext.unwrap_or_else(|| kind.clone());
                    let name = raw_artifact
                        .name
                        .unwrap_or_else(|| mrid.name().to_owned());
                    let mut artifact = Artifact::new(mrid.clone(), publication, name, kind, ext);
                    artifact.extra = raw_artifact.extra;
                    artifact.confs = raw_artifact.conf.unwrap_or_else(|| public_confs.clone());
                    artifact
                })
                .collect()
        };

        Ok(ModuleDescriptor {
            mrid,
            status: raw.status.unwrap_or_else(|| DEFAULT_STATUS.to_owned()),
            publication,
            configurations,
            dependencies,
            artifacts,
            licenses: raw.licenses,
            homepage: raw.homepage,
            is_default: false,
        })
    }

    /// Descriptor for a revision found in a repository without metadata:
    /// one public `default` conf publishing `module.jar`.
    pub fn default_for(mrid: ModuleRevisionId, publication: DateTime<Utc>) -> Self {
        let mut artifact = Artifact::new(
            mrid.clone(),
            publication,
            mrid.name(),
            DEFAULT_ARTIFACT_TYPE,
            DEFAULT_ARTIFACT_TYPE,
        );
        artifact.confs = vec![DEFAULT_CONFIGURATION.to_owned()];
        ModuleDescriptor {
            mrid,
            status: DEFAULT_STATUS.to_owned(),
            publication,
            configurations: vec![Configuration::public(DEFAULT_CONFIGURATION)],
            dependencies: vec![],
            artifacts: vec![artifact],
            licenses: vec![],
            homepage: None,
            is_default: true,
        }
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    pub fn configuration_names(&self) -> Vec<String> {
        self.configurations.iter().map(|c| c.name.clone()).collect()
    }

    pub fn public_configuration_names(&self) -> Vec<String> {
        self.configurations
            .iter()
            .filter(|c| c.visibility == Visibility::Public)
            .map(|c| c.name.clone())
            .collect()
    }

    /// `conf` followed by every configuration it extends, transitively.
    pub fn real_configurations(&self, conf: &str) -> Vec<String> {
        let mut result: Vec<String> = vec![];
        let mut queue = vec![conf.to_owned()];
        while let Some(name) = queue.pop() {
            if result.contains(&name) {
                continue;
            }
            if let Some(configuration) = self.configuration(&name) {
                queue.extend(configuration.extends.iter().rev().cloned());
                result.push(name);
            }
        }
        result
    }

    pub fn artifacts_for(&self, conf: &str) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.confs.iter().any(|c| c == conf || c == "*"))
            .collect()
    }

    /// Serializes back to the TOML form read by [`Self::from_toml_str`].
    pub fn to_toml(&self) -> String {
        let mut root = Table::new();
        root.insert("organisation".into(), self.mrid.organisation().into());
        root.insert("module".into(), self.mrid.name().into());
        if let Some(branch) = self.mrid.branch() {
            root.insert("branch".into(), branch.into());
        }
        root.insert("revision".into(), self.mrid.revision().into());
        root.insert("status".into(), self.status.as_str().into());
        root.insert("publication".into(), self.publication.to_rfc3339().into());
        if let Some(homepage) = &self.homepage {
            root.insert("homepage".into(), homepage.as_str().into());
        }
        if !self.mrid.extra_attributes().is_empty() {
            root.insert("extra".into(), string_table(self.mrid.extra_attributes()).into());
        }

        let mut configurations = Table::new();
        for conf in &self.configurations {
            let mut table = Table::new();
            if !conf.extends.is_empty() {
                table.insert("extends".into(), string_array(&conf.extends));
            }
            if conf.visibility == Visibility::Private {
                table.insert("visibility".into(), "private".into());
            }
            if !conf.transitive {
                table.insert("transitive".into(), false.into());
            }
            if let Some(description) = &conf.description {
                table.insert("description".into(), description.as_str().into());
            }
            configurations.insert(conf.name.clone(), table.into());
        }
        root.insert("configurations".into(), configurations.into());

        let dependencies: Vec<toml::Value> = self
            .dependencies
            .iter()
            .map(|dd| {
                let mut table = Table::new();
                table.insert("organisation".into(), dd.dependency.organisation().into());
                table.insert("module".into(), dd.dependency.name().into());
                if let Some(branch) = dd.dependency.branch() {
                    table.insert("branch".into(), branch.into());
                }
                table.insert("revision".into(), dd.dependency.revision().into());
                table.insert("conf".into(), dd.conf_mapping().into());
                if dd.force {
                    table.insert("force".into(), true.into());
                }
                if dd.changing {
                    table.insert("changing".into(), true.into());
                }
                if !dd.transitive {
                    table.insert("transitive".into(), false.into());
                }
                if !dd.dependency.extra_attributes().is_empty() {
                    table.insert(
                        "extra".into(),
                        string_table(dd.dependency.extra_attributes()).into(),
                    );
                }
                table.into()
            })
            .collect();
        if !dependencies.is_empty() {
            root.insert("dependencies".into(), dependencies.into());
        }

        let artifacts: Vec<toml::Value> = self
            .artifacts
            .iter()
            .map(|artifact| {
                let mut table = Table::new();
                table.insert("name".into(), artifact.name.as_str().into());
                table.insert("type".into(), artifact.kind.as_str().into());
                table.insert("ext".into(), artifact.ext.as_str().into());
                table.insert("conf".into(), string_array(&artifact.confs));
                if !artifact.extra.is_empty() {
                    table.insert("extra".into(), string_table(&artifact.extra).into());
                }
                table.into()
            })
            .collect();
        root.insert("artifacts".into(), artifacts.into());

        let licenses: Vec<toml::Value> = self
            .licenses
            .iter()
            .map(|license| {
                let mut table = Table::new();
                table.insert("name".into(), license.name.as_str().into());
                if let Some(url) = &license.url {
                    table.insert("url".into(), url.as_str().into());
                }
                table.into()
            })
            .collect();
        if !licenses.is_empty() {
            root.insert("licenses".into(), licenses.into());
        }

        root.to_string()
    }
}

fn string_array(values: &[String]) -> toml::Value {
    toml::Value::Array(values.iter().map(|v| v.as_str().into()).collect())
}

fn string_table(values: &BTreeMap<String, String>) -> Table {
    values
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const DESCRIPTOR: &str = r#"
organisation = "acme"
module = "app"
revision = "1.0"
status = "release"
publication = "2024-03-01T10:00:00Z"

[configurations]
default = {}
compile = { extends = ["default"] }
test = { extends = ["compile"], visibility = "private" }

[[dependencies]]
organisation = "acme"
module = "util"
revision = "[1.0,2.0["
conf = "compile->default;test->*"

[[dependencies]]
organisation = "acme"
module = "log"
revision = "2.1"
force = true

[[artifacts]]
name = "app"
conf = ["default"]

[[artifacts]]
name = "app-sources"
type = "source"
ext = "jar"
conf = ["compile"]

[[licenses]]
name = "Apache-2.0"
url = "https://www.apache.org/licenses/LICENSE-2.0"
"#;

    #[test]
    fn parse_descriptor() {
        let descriptor = ModuleDescriptor::from_toml_str(DESCRIPTOR, None).unwrap();
        assert_eq!(descriptor.mrid, ModuleRevisionId::of("acme", "app", "1.0"));
        assert_eq!(descriptor.status, "release");
        assert_eq!(
            descriptor.configuration_names(),
            vec!["default", "compile", "test"]
        );
        assert_eq!(
            descriptor.public_configuration_names(),
            vec!["default", "compile"]
        );
        assert_eq!(descriptor.dependencies.len(), 2);
        assert!(descriptor.dependencies[1].force);
        assert_eq!(descriptor.artifacts.len(), 2);
        assert_eq!(descriptor.artifacts[1].kind, "source");
        assert_eq!(descriptor.licenses.len(), 1);
        assert!(!descriptor.is_default);
    }

    #[test]
    fn real_configurations_follow_extends() {
        let descriptor = ModuleDescriptor::from_toml_str(DESCRIPTOR, None).unwrap();
        assert_eq!(
            descriptor.real_configurations("test"),
            vec!["test", "compile", "default"]
        );
        assert_eq!(descriptor.real_configurations("missing"), Vec::<String>::new());
    }

    #[test]
    fn conf_mapping() {
        let descriptor = ModuleDescriptor::from_toml_str(DESCRIPTOR, None).unwrap();
        let util = &descriptor.dependencies[0];
        assert_eq!(util.module_configurations(), vec!["compile", "test"]);
        assert_eq!(util.dependency_configurations("compile"), vec!["default"]);
        assert_eq!(util.dependency_configurations("test"), vec!["*"]);
        assert_eq!(
            util.dependency_configurations("default"),
            Vec::<String>::new()
        );

        let log = &descriptor.dependencies[1];
        assert_eq!(log.dependency_configurations("test"), vec!["*"]);

        let same = DependencyDescriptor::new(descriptor.mrid.clone(), log.dependency.clone())
            .with_conf_mapping("*->@")
            .unwrap();
        assert_eq!(same.dependency_configurations("compile"), vec!["compile"]);
        assert!(DependencyDescriptor::new(descriptor.mrid.clone(), log.dependency.clone())
            .with_conf_mapping("a->b->c")
            .is_err());
    }

    #[test]
    fn default_artifact_when_none_declared() {
        let descriptor = ModuleDescriptor::from_toml_str(
            r#"
organisation = "acme"
module = "util"
revision = "1.5"
"#,
            None,
        )
        .unwrap();
        assert_eq!(descriptor.configuration_names(), vec!["default"]);
        assert_eq!(descriptor.artifacts.len(), 1);
        assert_eq!(descriptor.artifacts[0].name, "util");
        assert_eq!(descriptor.artifacts[0].ext, "jar");
        assert_eq!(descriptor.artifacts_for("default").len(), 1);
        assert_eq!(descriptor.status, "integration");
    }

    #[test]
    fn toml_round_trip_keeps_semantics() {
        let descriptor = ModuleDescriptor::from_toml_str(DESCRIPTOR, None).unwrap();
        let reparsed = ModuleDescriptor::from_toml_str(&descriptor.to_toml(), None).unwrap();
        assert_eq!(reparsed, descriptor);
    }

    #[test]
    fn unknown_extended_configuration_is_rejected() {
        let result = ModuleDescriptor::from_toml_str(
            r#"
organisation = "acme"
module = "util"
revision = "1.5"

[configurations]
compile = { extends = ["runtime"] }
"#,
            None,
        );
        assert!(matches!(
            result,
            Err(ParseError::UnknownExtendedConfiguration(_, _))
        ));
    }
}
