//! Resolution settings: repositories, conflict managers, version matchers and
//! the knobs of the walker, built explicitly or read from
//! `trellis-settings.toml`.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    conflict::{
        ConflictError, ConflictManager, FixedConflictManager, LatestCompatibleConflictManager,
        LatestConflictManager, NearestConflictManager, NoConflictManager, RegexpConflictManager,
        StrictConflictManager,
    },
    matcher::{CompiledPattern, PatternMatcherKind},
    model::ModuleId,
    pattern::{substitute_variables, PatternError},
    repository::FileRepository,
    resolver::{ChainResolver, DependencyResolver, PatternResolver},
    version::{
        ChainVersionMatcher, LatestLexicoStrategy, LatestRevisionStrategy, LatestStrategy,
        LatestTimeStrategy, Match, PatternVersionMatcher, Status, StatusManager, VersionMatcher,
    },
};

pub const SETTINGS_FILE_NAME: &str = "trellis-settings.toml";

const DEFAULT_MAX_RESTARTS: usize = 32;
const DEFAULT_IGNORABLE_FILENAMES: [&str; 5] = [".cvsignore", "CVS", ".svn", ".git", ".gitignore"];

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error reading settings: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error in settings: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown resolver `{0}`")]
    UnknownResolver(String),
    #[error("Unknown conflict manager `{0}`")]
    UnknownConflictManager(String),
    #[error("Unknown latest strategy `{0}`")]
    UnknownLatestStrategy(String),
    #[error("Unknown resolver kind `{0}`")]
    UnknownResolverKind(String),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("No cache directory configured")]
    MissingCacheDir,
}

/// Per module overrides, matched with glob patterns on organisation and
/// module name.
#[derive(Debug)]
struct ModuleRule {
    organisation: CompiledPattern,
    module: CompiledPattern,
    conflict_manager: Option<Arc<dyn ConflictManager>>,
    resolver: Option<Arc<dyn DependencyResolver>>,
}

impl ModuleRule {
    fn matches(&self, module_id: &ModuleId) -> bool {
        self.organisation.matches(module_id.organisation()) && self.module.matches(module_id.name())
    }
}

#[derive(Debug)]
pub struct Settings {
    variables: HashMap<String, String>,
    cache_dir: PathBuf,
    resolvers: IndexMap<String, Arc<dyn DependencyResolver>>,
    default_resolver: Option<Arc<dyn DependencyResolver>>,
    conflict_managers: IndexMap<String, Arc<dyn ConflictManager>>,
    default_conflict_manager: Arc<dyn ConflictManager>,
    module_rules: Vec<ModuleRule>,
    strategies: IndexMap<String, Arc<dyn LatestStrategy>>,
    default_latest_strategy: Arc<dyn LatestStrategy>,
    version_matcher: Arc<ChainVersionMatcher>,
    statuses: Arc<StatusManager>,
    ignorable_filenames: Vec<String>,
    debug_conflict_resolution: bool,
    max_restarts: usize,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Reads a settings file. Relative paths inside it are relative to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        SettingsBuilder::from_file(path)?.build()
    }

    pub fn from_toml_str(data: &str, base: &Path) -> Result<Settings, SettingsError> {
        let raw: RawSettings = toml::from_str(data)?;
        raw.into_builder(base)?.build()
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The resolver in charge of `module_id`.
    pub fn resolver(&self, module_id: &ModuleId) -> Option<Arc<dyn DependencyResolver>> {
        self.module_rules
            .iter()
            .filter(|rule| rule.matches(module_id))
            .find_map(|rule| rule.resolver.clone())
            .or_else(|| self.default_resolver.clone())
    }

    pub fn resolver_by_name(&self, name: &str) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }

    pub fn conflict_manager(&self, module_id: &ModuleId) -> Arc<dyn ConflictManager> {
        self.module_rules
            .iter()
            .filter(|rule| rule.matches(module_id))
            .find_map(|rule| rule.conflict_manager.clone())
            .unwrap_or_else(|| self.default_conflict_manager.clone())
    }

    pub fn default_conflict_manager(&self) -> &Arc<dyn ConflictManager> {
        &self.default_conflict_manager
    }

    pub fn conflict_manager_by_name(&self, name: &str) -> Option<Arc<dyn ConflictManager>> {
        self.conflict_managers.get(name).cloned()
    }

    pub fn latest_strategy(&self, name: &str) -> Option<Arc<dyn LatestStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn default_latest_strategy(&self) -> Arc<dyn LatestStrategy> {
        self.default_latest_strategy.clone()
    }

    pub fn version_matcher(&self) -> &ChainVersionMatcher {
        &self.version_matcher
    }

    pub fn statuses(&self) -> &StatusManager {
        &self.statuses
    }

    pub fn ignorable_filenames(&self) -> &[String] {
        &self.ignorable_filenames
    }

    pub fn is_ignorable(&self, file_name: &str) -> bool {
        self.ignorable_filenames.iter().any(|name| name == file_name)
    }

    pub fn debug_conflict_resolution(&self) -> bool {
        self.debug_conflict_resolution
    }

    pub fn max_restarts(&self) -> usize {
        self.max_restarts
    }

    /// Substitutes `${...}` with the settings variables.
    pub fn substitute(&self, value: &str) -> Result<String, PatternError> {
        substitute_variables(value, &self.variables)
    }
}

#[derive(Debug)]
struct RawModuleRule {
    organisation: String,
    module: String,
    conflict_manager: Option<String>,
    resolver: Option<String>,
}

#[derive(Debug, Default)]
pub struct SettingsBuilder {
    cache_dir: Option<PathBuf>,
    variables: HashMap<String, String>,
    resolvers: Vec<Arc<dyn DependencyResolver>>,
    default_resolver: Option<String>,
    conflict_managers: Vec<Arc<dyn ConflictManager>>,
    default_conflict_manager: Option<String>,
    module_rules: Vec<RawModuleRule>,
    version_matchers: Vec<Arc<dyn VersionMatcher>>,
    version_matches: Vec<Match>,
    statuses: Option<Vec<Status>>,
    default_status: Option<String>,
    default_latest_strategy: Option<String>,
    fixed_revisions: Vec<String>,
    regexp: Option<(String, bool)>,
    ignorable_filenames: Option<Vec<String>>,
    debug_conflict_resolution: bool,
    max_restarts: Option<usize>,
}

impl SettingsBuilder {
    /// Starts from a settings file, so that its values can still be
    /// overridden. Relative paths inside it are relative to the file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<SettingsBuilder, SettingsError> {
        debug!("Loading settings from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let raw: RawSettings = toml::from_str(&contents)?;
        raw.into_builder(path.parent().unwrap_or(Path::new(".")))
    }

    /// Where downloaded artifacts and reports are kept. Required.
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn has_cache_dir(&self) -> bool {
        self.cache_dir.is_some()
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Defaults to the first resolver added.
    pub fn default_resolver(mut self, name: impl Into<String>) -> Self {
        self.default_resolver = Some(name.into());
        self
    }

    /// Registers a conflict manager in addition to the built-in ones.
    pub fn conflict_manager(mut self, manager: Arc<dyn ConflictManager>) -> Self {
        self.conflict_managers.push(manager);
        self
    }

    /// Defaults to `latest-revision`.
    pub fn default_conflict_manager(mut self, name: impl Into<String>) -> Self {
        self.default_conflict_manager = Some(name.into());
        self
    }

    pub fn module_conflict_manager(
        mut self,
        organisation: impl Into<String>,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.module_rules.push(RawModuleRule {
            organisation: organisation.into(),
            module: module.into(),
            conflict_manager: Some(name.into()),
            resolver: None,
        });
        self
    }

    pub fn module_resolver(
        mut self,
        organisation: impl Into<String>,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.module_rules.push(RawModuleRule {
            organisation: organisation.into(),
            module: module.into(),
            conflict_manager: None,
            resolver: Some(name.into()),
        });
        self
    }

    /// Gives `matcher` precedence over the default chain.
    pub fn version_matcher(mut self, matcher: Arc<dyn VersionMatcher>) -> Self {
        self.version_matchers.push(matcher);
        self
    }

    pub fn version_match(mut self, rule: Match) -> Self {
        self.version_matches.push(rule);
        self
    }

    /// Defaults to `release`, `milestone`, `integration`.
    pub fn statuses(mut self, statuses: Vec<Status>, default_status: Option<String>) -> Self {
        self.statuses = Some(statuses);
        self.default_status = default_status;
        self
    }

    /// Defaults to `latest-revision`.
    pub fn default_latest_strategy(mut self, name: impl Into<String>) -> Self {
        self.default_latest_strategy = Some(name.into());
        self
    }

    /// Revisions accepted by the `fixed` conflict manager.
    pub fn fixed_revisions(mut self, revisions: Vec<String>) -> Self {
        self.fixed_revisions = revisions;
        self
    }

    /// Pattern of the `regexp` conflict manager. Defaults to `(.*)`.
    pub fn regexp(mut self, pattern: impl Into<String>, ignore_non_matching: bool) -> Self {
        self.regexp = Some((pattern.into(), ignore_non_matching));
        self
    }

    pub fn ignorable_filenames(mut self, names: Vec<String>) -> Self {
        self.ignorable_filenames = Some(names);
        self
    }

    pub fn debug_conflict_resolution(mut self, debug: bool) -> Self {
        self.debug_conflict_resolution = debug;
        self
    }

    /// Defaults to 32.
    pub fn max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    pub fn build(self) -> Result<Settings, SettingsError> {
        let SettingsBuilder {
            cache_dir,
            variables,
            resolvers,
            default_resolver,
            conflict_managers,
            default_conflict_manager,
            module_rules,
            version_matchers,
            version_matches,
            statuses,
            default_status,
            default_latest_strategy,
            fixed_revisions,
            regexp,
            ignorable_filenames,
            debug_conflict_resolution,
            max_restarts,
        } = self;

        let cache_dir = cache_dir.ok_or(SettingsError::MissingCacheDir)?;
        let statuses = Arc::new(match statuses {
            Some(statuses) => StatusManager::new(statuses, default_status),
            None => StatusManager::default(),
        });

        let patterns = if version_matches.is_empty() {
            None
        } else {
            let mut patterns = PatternVersionMatcher::new("pattern");
            for rule in version_matches {
                patterns.add_match(rule);
            }
            Some(patterns)
        };
        let mut chain = ChainVersionMatcher::with_defaults(statuses.clone(), patterns);
        for matcher in version_matchers.into_iter().rev() {
            chain.add(matcher);
        }
        let version_matcher = Arc::new(chain);

        let mut strategies: IndexMap<String, Arc<dyn LatestStrategy>> = IndexMap::new();
        strategies.insert(
            LatestRevisionStrategy::NAME.to_owned(),
            Arc::new(LatestRevisionStrategy::new().with_version_matcher(version_matcher.clone())),
        );
        strategies.insert(LatestLexicoStrategy::NAME.to_owned(), Arc::new(LatestLexicoStrategy));
        strategies.insert(LatestTimeStrategy::NAME.to_owned(), Arc::new(LatestTimeStrategy));
        let strategy_name =
            default_latest_strategy.unwrap_or_else(|| LatestRevisionStrategy::NAME.to_owned());
        let default_latest_strategy = strategies
            .get(&strategy_name)
            .cloned()
            .ok_or(SettingsError::UnknownLatestStrategy(strategy_name))?;

        let mut managers: IndexMap<String, Arc<dyn ConflictManager>> = IndexMap::new();
        managers.insert(NoConflictManager::NAME.to_owned(), Arc::new(NoConflictManager));
        managers.insert(StrictConflictManager::NAME.to_owned(), Arc::new(StrictConflictManager));
        managers.insert(NearestConflictManager::NAME.to_owned(), Arc::new(NearestConflictManager));
        for (name, strategy) in &strategies {
            managers.insert(
                name.clone(),
                Arc::new(LatestConflictManager::new(name.clone(), strategy.clone())),
            );
        }
        managers.insert(
            LatestCompatibleConflictManager::NAME.to_owned(),
            Arc::new(LatestCompatibleConflictManager::new(
                default_latest_strategy.clone(),
            )),
        );
        managers.insert(
            FixedConflictManager::NAME.to_owned(),
            Arc::new(FixedConflictManager::new(fixed_revisions)),
        );
        let (pattern, ignore_non_matching) = regexp
            .unwrap_or_else(|| (RegexpConflictManager::DEFAULT_PATTERN.to_owned(), false));
        managers.insert(
            RegexpConflictManager::NAME.to_owned(),
            Arc::new(RegexpConflictManager::new(&pattern, ignore_non_matching)?),
        );
        for manager in conflict_managers {
            managers.insert(manager.name().to_owned(), manager);
        }
        let manager_name =
            default_conflict_manager.unwrap_or_else(|| LatestRevisionStrategy::NAME.to_owned());
        let default_conflict_manager = managers
            .get(&manager_name)
            .cloned()
            .ok_or(SettingsError::UnknownConflictManager(manager_name))?;

        let resolvers: IndexMap<String, Arc<dyn DependencyResolver>> = resolvers
            .into_iter()
            .map(|resolver| (resolver.name().to_owned(), resolver))
            .collect();
        let default_resolver = match default_resolver {
            Some(name) => Some(
                resolvers
                    .get(&name)
                    .cloned()
                    .ok_or(SettingsError::UnknownResolver(name))?,
            ),
            None => resolvers.values().next().cloned(),
        };

        let mut rules = Vec::with_capacity(module_rules.len());
        for rule in module_rules {
            let conflict_manager = match rule.conflict_manager {
                Some(name) => Some(
                    managers
                        .get(&name)
                        .cloned()
                        .ok_or(SettingsError::UnknownConflictManager(name))?,
                ),
                None => None,
            };
            let resolver = match rule.resolver {
                Some(name) => Some(
                    resolvers
                        .get(&name)
                        .cloned()
                        .ok_or(SettingsError::UnknownResolver(name))?,
                ),
                None => None,
            };
            rules.push(ModuleRule {
                organisation: PatternMatcherKind::Glob.compile(&rule.organisation),
                module: PatternMatcherKind::Glob.compile(&rule.module),
                conflict_manager,
                resolver,
            });
        }

        Ok(Settings {
            variables,
            cache_dir,
            resolvers,
            default_resolver,
            conflict_managers: managers,
            default_conflict_manager,
            module_rules: rules,
            strategies,
            default_latest_strategy,
            version_matcher,
            statuses,
            ignorable_filenames: ignorable_filenames.unwrap_or_else(|| {
                DEFAULT_IGNORABLE_FILENAMES
                    .iter()
                    .map(|name| name.to_string())
                    .collect()
            }),
            debug_conflict_resolution,
            max_restarts: max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    variables: HashMap<String, String>,
    cache_dir: Option<PathBuf>,
    default_resolver: Option<String>,
    resolvers: Vec<RawResolver>,
    default_conflict_manager: Option<String>,
    modules: Vec<RawModule>,
    conflict_managers: RawConflictManagers,
    version_matchers: Vec<Match>,
    statuses: Vec<Status>,
    default_status: Option<String>,
    default_latest_strategy: Option<String>,
    ignorable_filenames: Option<Vec<String>>,
    debug_conflict_resolution: bool,
    max_restarts: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawResolver {
    name: String,
    #[serde(default = "default_resolver_kind")]
    kind: String,
    root: Option<PathBuf>,
    #[serde(default)]
    ivy_patterns: Vec<String>,
    #[serde(default)]
    artifact_patterns: Vec<String>,
    #[serde(default)]
    resolvers: Vec<String>,
}

fn default_resolver_kind() -> String {
    "file".to_owned()
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default = "any")]
    organisation: String,
    #[serde(default = "any")]
    module: String,
    conflict_manager: Option<String>,
    resolver: Option<String>,
}

fn any() -> String {
    "*".to_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConflictManagers {
    fixed: Vec<String>,
    regexp: Option<String>,
    ignore_non_matching: bool,
}

impl RawSettings {
    fn into_builder(self, base: &Path) -> Result<SettingsBuilder, SettingsError> {
        let mut builder = SettingsBuilder::default();
        for (name, value) in &self.variables {
            builder = builder.variable(name, value);
        }
        let substitute = |value: &str| substitute_variables(value, &self.variables);
        let relative = |path: &Path| -> Result<PathBuf, SettingsError> {
            let path = PathBuf::from(substitute(&path.to_string_lossy())?);
            Ok(if path.is_absolute() {
                path
            } else {
                base.join(path)
            })
        };

        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.cache_dir(relative(cache_dir)?);
        }

        let mut built: IndexMap<String, Arc<dyn DependencyResolver>> = IndexMap::new();
        for raw in &self.resolvers {
            let resolver: Arc<dyn DependencyResolver> = match raw.kind.as_str() {
                "file" => {
                    let root = match &raw.root {
                        Some(root) => relative(root)?,
                        None => base.to_path_buf(),
                    };
                    let repository = FileRepository::new(raw.name.clone(), root);
                    let mut resolver = PatternResolver::new(raw.name.clone(), Arc::new(repository));
                    for pattern in &raw.ivy_patterns {
                        resolver = resolver.with_ivy_pattern(pattern.clone());
                    }
                    for pattern in &raw.artifact_patterns {
                        resolver = resolver.with_artifact_pattern(pattern.clone());
                    }
                    Arc::new(resolver)
                }
                "chain" => {
                    let mut members = Vec::with_capacity(raw.resolvers.len());
                    for name in &raw.resolvers {
                        members.push(
                            built
                                .get(name)
                                .cloned()
                                .ok_or_else(|| SettingsError::UnknownResolver(name.clone()))?,
                        );
                    }
                    Arc::new(ChainResolver::new(raw.name.clone(), members))
                }
                other => return Err(SettingsError::UnknownResolverKind(other.to_owned())),
            };
            built.insert(raw.name.clone(), resolver);
        }
        for resolver in built.into_values() {
            builder = builder.resolver(resolver);
        }
        if let Some(name) = self.default_resolver {
            builder = builder.default_resolver(name);
        }

        if let Some(name) = self.default_conflict_manager {
            builder = builder.default_conflict_manager(name);
        }
        for module in self.modules {
            if let Some(manager) = module.conflict_manager {
                builder =
                    builder.module_conflict_manager(&module.organisation, &module.module, manager);
            }
            if let Some(resolver) = module.resolver {
                builder = builder.module_resolver(module.organisation, module.module, resolver);
            }
        }
        builder = builder.fixed_revisions(self.conflict_managers.fixed);
        if let Some(pattern) = self.conflict_managers.regexp {
            builder = builder.regexp(pattern, self.conflict_managers.ignore_non_matching);
        }

        for rule in self.version_matchers {
            builder = builder.version_match(rule);
        }
        if !self.statuses.is_empty() {
            builder = builder.statuses(self.statuses, self.default_status);
        }
        if let Some(name) = self.default_latest_strategy {
            builder = builder.default_latest_strategy(name);
        }
        if let Some(names) = self.ignorable_filenames {
            builder = builder.ignorable_filenames(names);
        }
        if let Some(max_restarts) = self.max_restarts {
            builder = builder.max_restarts(max_restarts);
        }
        Ok(builder.debug_conflict_resolution(self.debug_conflict_resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const SETTINGS: &str = r#"
cache_dir = "${home}/cache"
default_resolver = "all"
default_conflict_manager = "latest-compatible"
max_restarts = 4

[variables]
home = "work"

[[resolvers]]
name = "local"
root = "${home}/repository"
ivy_patterns = ["[organisation]/[module]/[revision]/ivy.toml"]
artifact_patterns = ["[organisation]/[module]/[revision]/[artifact].[ext]"]

[[resolvers]]
name = "all"
kind = "chain"
resolvers = ["local"]

[[modules]]
organisation = "acme"
module = "legacy-*"
conflict_manager = "strict"

[conflict_managers]
fixed = ["1.0"]

[[version_matchers]]
revision = "compatible"
pattern = '${major}\.\d+'
args = "major"
matcher = "regexp"
"#;

    #[test]
    fn load_file() {
        let settings = Settings::from_toml_str(SETTINGS, Path::new("/project")).unwrap();
        assert_eq!(settings.cache_dir(), Path::new("/project/work/cache"));
        assert_eq!(settings.max_restarts(), 4);
        assert_eq!(settings.resolver_names(), vec!["local", "all"]);
        assert_eq!(
            settings
                .resolver(&ModuleId::new("acme", "util"))
                .map(|r| r.name().to_owned()),
            Some("all".to_owned())
        );
        assert_eq!(
            settings
                .conflict_manager(&ModuleId::new("acme", "legacy-io"))
                .name(),
            "strict"
        );
        assert_eq!(
            settings.conflict_manager(&ModuleId::new("acme", "io")).name(),
            "latest-compatible"
        );
        assert!(settings.is_ignorable(".git"));
        let asked = crate::model::ModuleRevisionId::of("acme", "util", "compatible(2)");
        assert!(settings.version_matcher().is_dynamic(&asked));
    }

    #[test]
    fn defaults() {
        let settings = Settings::builder().cache_dir("/tmp/cache").build().unwrap();
        assert_eq!(settings.max_restarts(), 32);
        assert_eq!(
            settings.conflict_manager(&ModuleId::new("a", "b")).name(),
            "latest-revision"
        );
        assert_eq!(settings.default_latest_strategy().name(), "latest-revision");
        assert!(settings.resolver(&ModuleId::new("a", "b")).is_none());
        assert_eq!(settings.statuses().default_status(), "integration");
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            Settings::builder().build(),
            Err(SettingsError::MissingCacheDir)
        ));
        assert!(matches!(
            Settings::builder()
                .cache_dir("/tmp")
                .default_conflict_manager("newest")
                .build(),
            Err(SettingsError::UnknownConflictManager(name)) if name == "newest"
        ));
        assert!(matches!(
            Settings::builder()
                .cache_dir("/tmp")
                .default_latest_strategy("oldest")
                .build(),
            Err(SettingsError::UnknownLatestStrategy(_))
        ));
        assert!(matches!(
            Settings::from_toml_str(
                "cache_dir = \"x\"\n[[resolvers]]\nname = \"c\"\nkind = \"chain\"\nresolvers = [\"missing\"]",
                Path::new("/")
            ),
            Err(SettingsError::UnknownResolver(_))
        ));
    }
}
