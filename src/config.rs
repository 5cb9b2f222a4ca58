use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Overrides read from `TRELLIS_*` environment variables.
pub struct TrellisConfig {
    pub cache_dir: Option<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub max_restarts: Option<usize>,
}

impl TrellisConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            settings_file: raw_config.settings.file,
            max_restarts: raw_config.resolve.maxrestarts,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    settings: SettingsConfig,
    #[serde(default)]
    resolve: ResolveConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct SettingsConfig {
    file: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ResolveConfig {
    maxrestarts: Option<usize>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("TRELLIS")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("TRELLIS_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("TRELLIS_SETTINGS_FILE".to_owned(), "/etc/trellis.toml".to_owned()),
            ("TRELLIS_RESOLVE_MAXRESTARTS".to_owned(), "4".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into())
                },
                settings: SettingsConfig {
                    file: Some("/etc/trellis.toml".into())
                },
                resolve: ResolveConfig {
                    maxrestarts: Some(4)
                },
            }
        )
    }
}
