use std::{env, error::Error, path::PathBuf, sync::Arc};

use home::home_dir;
use log::debug;

use crate::{
    cache::ResolutionCache,
    config::TrellisConfig,
    context::ResolveContext,
    settings::{Settings, SettingsBuilder, SETTINGS_FILE_NAME},
    Trellis,
};

#[derive(Default)]
pub struct TrellisBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    module_file_name: Option<PathBuf>,
    settings_file: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
}

impl TrellisBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the module descriptor file.
    ///
    /// Defaults to `trellis.toml`.
    pub fn module_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_file_name = Some(path.into());
        self
    }

    /// Settings file declaring resolvers and conflict managers.
    ///
    /// Defaults to `$TRELLIS_SETTINGS_FILE`, then to `trellis-settings.toml`
    /// when the root has one.
    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Location of the resolution cache.
    ///
    /// Defaults to `$TRELLIS_CACHE_DIR`, then to the settings' `cache_dir`,
    /// then to `$HOME/.trellis/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    pub fn try_build(self) -> Result<Trellis, Box<dyn Error>> {
        let Self {
            root,
            module_file_name,
            settings_file,
            cache_directory_path,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };
        let config = TrellisConfig::load()?;

        let module_file_name = module_file_name.unwrap_or_else(|| PathBuf::from("trellis.toml"));

        let settings_file = settings_file
            .or(config.settings_file)
            .map(|file| root.join(file))
            .or_else(|| Some(root.join(SETTINGS_FILE_NAME)).filter(|file| file.exists()));
        let mut settings = match settings_file {
            Some(file) => SettingsBuilder::from_file(&file)?,
            None => {
                debug!("No settings file found, using the default settings");
                Settings::builder()
            }
        };

        match cache_directory_path.or(config.cache_dir) {
            Some(cache_directory) => settings = settings.cache_dir(root.join(cache_directory)),
            None if !settings.has_cache_dir() => {
                settings = settings.cache_dir(default_cache_directory()?)
            }
            None => {}
        }
        if let Some(max_restarts) = config.max_restarts {
            settings = settings.max_restarts(max_restarts);
        }
        let settings = settings.build()?;

        let cache = ResolutionCache::new(settings.cache_dir().to_path_buf())?;
        let ctx = ResolveContext::new(Arc::new(settings));

        Ok(Trellis {
            ctx,
            cache,
            root,
            module_file_name,
        })
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".trellis/cache");
    Ok(cache_directory)
}
