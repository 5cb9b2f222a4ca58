use std::{
    collections::{hash_map::DefaultHasher, BTreeMap},
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
    sync::OnceLock,
};

use regex_lite::Regex;

use crate::model::ParseError;

const ENCODE_SEPARATOR: &str = ":#@#:";
const ENCODE_PREFIX: char = '+';
const NULL_ENCODE: &str = "@#:NULL:#@";

pub const ORGANISATION_KEY: &str = "organisation";
pub const MODULE_KEY: &str = "module";
pub const BRANCH_KEY: &str = "branch";
pub const REVISION_KEY: &str = "revision";

/// Organisation and name of a module, independent of any revision.
#[derive(Debug, Clone)]
pub struct ModuleId {
    organisation: String,
    name: String,
    hash: u64,
}

impl ModuleId {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        let organisation = organisation.into();
        let name = name.into();
        let mut hasher = DefaultHasher::new();
        organisation.hash(&mut hasher);
        name.hash(&mut hasher);
        Self {
            organisation,
            name,
            hash: hasher.finish(),
        }
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ModuleId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.organisation == other.organisation
            && self.name == other.name
    }
}

impl Eq for ModuleId {}

impl Hash for ModuleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for ModuleId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.organisation
            .cmp(&other.organisation)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.organisation, self.name)
    }
}

/// A module at one revision, optionally on a branch, with extra attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleRevisionId {
    module_id: ModuleId,
    branch: Option<String>,
    revision: String,
    extra: BTreeMap<String, String>,
}

impl ModuleRevisionId {
    pub fn new(module_id: ModuleId, revision: impl Into<String>) -> Self {
        Self {
            module_id,
            branch: None,
            revision: normalize_revision(revision.into()),
            extra: BTreeMap::new(),
        }
    }

    pub fn of(
        organisation: impl Into<String>,
        name: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::new(ModuleId::new(organisation, name), revision)
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch.filter(|b| !b.is_empty());
        self
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    /// Same module and branch at another revision.
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        Self {
            module_id: self.module_id.clone(),
            branch: self.branch.clone(),
            revision: normalize_revision(revision.into()),
            extra: self.extra.clone(),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn organisation(&self) -> &str {
        self.module_id.organisation()
    }

    pub fn name(&self) -> &str {
        self.module_id.name()
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn extra_attributes(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// Every attribute, standard ones included, keyed by attribute name.
    pub fn attributes(&self) -> BTreeMap<String, Option<String>> {
        let mut attributes: BTreeMap<String, Option<String>> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        attributes.insert(
            ORGANISATION_KEY.to_owned(),
            Some(self.organisation().to_owned()),
        );
        attributes.insert(MODULE_KEY.to_owned(), Some(self.name().to_owned()));
        attributes.insert(BRANCH_KEY.to_owned(), self.branch.clone());
        attributes.insert(REVISION_KEY.to_owned(), Some(self.revision.clone()));
        attributes
    }

    /// Flat, self-delimiting form used as a cache key.
    pub fn encode_to_string(&self) -> String {
        let mut encoded = String::new();
        for (name, value) in self.attributes() {
            encoded.push(ENCODE_PREFIX);
            encoded.push_str(&name);
            encoded.push_str(ENCODE_SEPARATOR);
            encoded.push(ENCODE_PREFIX);
            encoded.push_str(value.as_deref().unwrap_or(NULL_ENCODE));
            encoded.push_str(ENCODE_SEPARATOR);
        }
        encoded
    }

    pub fn decode(encoded: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidEncodedId(encoded.to_owned());
        let parts: Vec<&str> = encoded
            .split(ENCODE_SEPARATOR)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.len() % 2 != 0 {
            return Err(invalid());
        }
        let mut attributes: BTreeMap<String, Option<String>> = BTreeMap::new();
        for pair in parts.chunks(2) {
            let name = pair[0].strip_prefix(ENCODE_PREFIX).ok_or_else(invalid)?;
            let value = pair[1].strip_prefix(ENCODE_PREFIX).ok_or_else(invalid)?;
            let value = (value != NULL_ENCODE).then(|| value.to_owned());
            attributes.insert(name.to_owned(), value);
        }
        let mut take = |key: &str| attributes.remove(key).flatten();
        let organisation = take(ORGANISATION_KEY).ok_or_else(invalid)?;
        let module = take(MODULE_KEY).ok_or_else(invalid)?;
        let revision = take(REVISION_KEY).ok_or_else(invalid)?;
        let branch = take(BRANCH_KEY);
        let extra = attributes
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        Ok(ModuleRevisionId::of(organisation, module, revision)
            .with_branch(branch)
            .with_extra(extra))
    }
}

impl Display for ModuleRevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.organisation(), self.name())?;
        if let Some(branch) = &self.branch {
            write!(f, "#{}", branch)?;
        }
        write!(f, ";{}", self.revision)
    }
}

fn mrid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let strict = r"[\w\-./+=,\[\]\(\)]";
        Regex::new(&format!(
            r"^({strict}*)#({strict}+)(?:#({strict}+))?;([\w\-./+=,\[\]\(\)\s]+)$"
        ))
        .unwrap()
    })
}

impl FromStr for ModuleRevisionId {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = mrid_pattern()
            .captures(value.trim())
            .ok_or_else(|| ParseError::InvalidModuleRevisionId(value.to_owned()))?;
        let group = |i: usize| captures.get(i).map(|m| m.as_str().to_owned());
        Ok(ModuleRevisionId::of(
            group(1).unwrap_or_default(),
            group(2).unwrap_or_default(),
            group(4).unwrap_or_default().trim(),
        )
        .with_branch(group(3)))
    }
}

/// `[1.0]` designates a single revision and is equivalent to `1.0`.
pub fn normalize_revision(revision: String) -> String {
    if revision.starts_with('[') && revision.ends_with(']') && !revision.contains(',') {
        revision[1..revision.len() - 1].to_owned()
    } else {
        revision
    }
}

/// Identifies an artifact within a module, regardless of revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    module_id: ModuleId,
    name: String,
    kind: String,
    ext: String,
    extra: BTreeMap<String, String>,
}

impl ArtifactId {
    pub fn new(
        module_id: ModuleId,
        name: impl Into<String>,
        kind: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            module_id,
            name: name.into(),
            kind: kind.into(),
            ext: ext.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn extra_attributes(&self) -> &BTreeMap<String, String> {
        &self.extra
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}.{}", self.module_id, self.name, self.ext)?;
        write_kind(f, &self.kind, &self.ext)
    }
}

/// The type only shows when the extension does not already say it.
fn write_kind(f: &mut Formatter<'_>, kind: &str, ext: &str) -> std::fmt::Result {
    if kind != ext {
        write!(f, "({})", kind)?;
    }
    Ok(())
}

/// Identifies an artifact of one module revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactRevisionId {
    artifact_id: ArtifactId,
    mrid: ModuleRevisionId,
}

impl ArtifactRevisionId {
    pub fn new(artifact_id: ArtifactId, mrid: ModuleRevisionId) -> Self {
        Self { artifact_id, mrid }
    }

    pub fn artifact_id(&self) -> &ArtifactId {
        &self.artifact_id
    }

    pub fn module_revision_id(&self) -> &ModuleRevisionId {
        &self.mrid
    }

    pub fn name(&self) -> &str {
        self.artifact_id.name()
    }

    pub fn kind(&self) -> &str {
        self.artifact_id.kind()
    }

    pub fn ext(&self) -> &str {
        self.artifact_id.ext()
    }

    /// Attributes of the owning module revision overlaid with the artifact's own.
    pub fn extra_attributes(&self) -> BTreeMap<String, String> {
        let mut extra = self.mrid.extra_attributes().clone();
        extra.extend(
            self.artifact_id
                .extra_attributes()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        extra
    }
}

impl Display for ArtifactRevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}!{}.{}",
            self.mrid,
            self.artifact_id.name(),
            self.artifact_id.ext()
        )?;
        write_kind(f, self.artifact_id.kind(), self.artifact_id.ext())
    }
}
