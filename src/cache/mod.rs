//! Local cache shared by resolves: downloaded artifacts, resolve reports and
//! the resolved descriptors of resolved modules.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    flock::FileLock,
    model::{Artifact, ModuleDescriptor, ModuleRevisionId, ParseError},
    pattern::{self, PatternError},
};

/// Where downloaded artifacts land inside the cache.
pub const DEFAULT_ARTIFACT_PATTERN: &str =
    "[organisation]/[module]/[type]s/[artifact]-[revision](-[branch]).[ext]";

const LOCK_FILE: &str = ".lock";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} does not exist")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Invalid cache pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("Invalid resolved descriptor: {0}")]
    Parse(#[from] ParseError),
    #[error("Failed to write cache entry: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to read cache entry: {0}")]
    Deserialize(#[from] toml::de::Error),
}

/// The revision a dynamic dependency resolved to, kept next to the resolved
/// descriptor of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRevision {
    pub revision: String,
    pub status: String,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolutionCache {
    location: PathBuf,
    artifact_pattern: String,
}

impl ResolutionCache {
    pub fn new(location: PathBuf) -> Result<ResolutionCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }
        Ok(ResolutionCache {
            location,
            artifact_pattern: DEFAULT_ARTIFACT_PATTERN.to_owned(),
        })
    }

    pub fn with_artifact_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.artifact_pattern = pattern.into();
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Serializes resolves sharing this cache, across processes.
    pub fn lock(&self) -> Result<FileLock, CacheError> {
        let location = self.location.join(LOCK_FILE);
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        info!("Acquired a lock on the cache location");
        Ok(lock)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!("Clearing resolution cache {}.", &self.location.display());
            std::fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }

    pub fn artifact_path(&self, artifact: &Artifact) -> Result<PathBuf, CacheError> {
        let tokens = pattern::artifact_tokens(artifact, None);
        let relative = pattern::substitute(&self.artifact_pattern, &tokens, &HashMap::new())?;
        Ok(self.location.join(relative))
    }

    /// The XML report of the last resolve of `resolve_id` in `conf`.
    pub fn report_path(&self, resolve_id: &str, conf: &str) -> PathBuf {
        self.location.join(format!("{}-{}.xml", resolve_id, conf))
    }

    pub fn resolved_descriptor_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.location
            .join(format!("resolved-{}.toml", file_stem(mrid)))
    }

    pub fn resolved_revisions_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.location
            .join(format!("resolved-{}.revisions.toml", file_stem(mrid)))
    }

    pub fn save_resolved_descriptor(&self, descriptor: &ModuleDescriptor) -> Result<(), CacheError> {
        let path = self.resolved_descriptor_path(&descriptor.mrid);
        trace!("Saving resolved descriptor to {}", path.display());
        std::fs::write(path, descriptor.to_toml())?;
        Ok(())
    }

    pub fn resolved_descriptor(
        &self,
        mrid: &ModuleRevisionId,
    ) -> Result<Option<ModuleDescriptor>, CacheError> {
        let path = self.resolved_descriptor_path(mrid);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(ModuleDescriptor::from_file(&path)?))
    }

    /// Records what each dynamic dependency of `mrid` resolved to, keyed by
    /// the encoded asked revision id.
    pub fn save_resolved_revisions(
        &self,
        mrid: &ModuleRevisionId,
        revisions: &[(ModuleRevisionId, ResolvedRevision)],
    ) -> Result<(), CacheError> {
        let entries: BTreeMap<String, &ResolvedRevision> = revisions
            .iter()
            .map(|(asked, resolved)| (asked.encode_to_string(), resolved))
            .collect();
        std::fs::write(
            self.resolved_revisions_path(mrid),
            toml::to_string(&entries)?,
        )?;
        Ok(())
    }

    pub fn resolved_revisions(
        &self,
        mrid: &ModuleRevisionId,
    ) -> Result<Vec<(ModuleRevisionId, ResolvedRevision)>, CacheError> {
        let path = self.resolved_revisions_path(mrid);
        if !path.exists() {
            return Ok(vec![]);
        }
        let entries: BTreeMap<String, ResolvedRevision> =
            toml::from_str(&std::fs::read_to_string(path)?)?;
        let mut revisions = Vec::with_capacity(entries.len());
        for (encoded, resolved) in entries {
            revisions.push((ModuleRevisionId::decode(&encoded)?, resolved));
        }
        Ok(revisions)
    }
}

fn file_stem(mrid: &ModuleRevisionId) -> String {
    match mrid.branch() {
        Some(branch) => format!(
            "{}-{}-{}-{}",
            mrid.organisation(),
            mrid.name(),
            branch,
            mrid.revision()
        ),
        None => format!(
            "{}-{}-{}",
            mrid.organisation(),
            mrid.name(),
            mrid.revision()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache")).unwrap();
        let mrid = ModuleRevisionId::of("acme", "util", "1.0");
        let artifact = Artifact::new(mrid.clone(), Utc::now(), "util", "jar", "jar");
        assert_eq!(
            cache.artifact_path(&artifact).unwrap(),
            dir.path().join("cache/acme/util/jars/util-1.0.jar")
        );
        let branched = Artifact::new(
            mrid.clone().with_branch(Some("trunk".to_owned())),
            Utc::now(),
            "util",
            "source",
            "jar",
        );
        assert_eq!(
            cache.artifact_path(&branched).unwrap(),
            dir.path().join("cache/acme/util/sources/util-1.0-trunk.jar")
        );
        assert_eq!(
            cache.report_path("acme-app", "compile"),
            dir.path().join("cache/acme-app-compile.xml")
        );
        assert_eq!(
            cache.resolved_descriptor_path(&mrid),
            dir.path().join("cache/resolved-acme-util-1.0.toml")
        );
    }

    #[test]
    fn file_in_place_of_location() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("file");
        std::fs::write(&location, b"").unwrap();
        assert!(matches!(
            ResolutionCache::new(location),
            Err(CacheError::BadLocation { .. })
        ));
    }

    #[test]
    fn resolved_entries_survive() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().to_path_buf()).unwrap();
        let mrid = ModuleRevisionId::of("acme", "app", "1.0");
        let descriptor = ModuleDescriptor::default_for(mrid.clone(), Utc::now());
        assert_eq!(cache.resolved_descriptor(&mrid).unwrap(), None);
        cache.save_resolved_descriptor(&descriptor).unwrap();
        let loaded = cache.resolved_descriptor(&mrid).unwrap().unwrap();
        assert_eq!(loaded.mrid, mrid);
        assert_eq!(loaded.configuration_names(), vec!["default"]);

        let revisions = vec![(
            ModuleRevisionId::of("acme", "util", "latest.integration"),
            ResolvedRevision {
                revision: "1.5".to_owned(),
                status: "integration".to_owned(),
                branch: None,
            },
        )];
        cache.save_resolved_revisions(&mrid, &revisions).unwrap();
        assert_eq!(cache.resolved_revisions(&mrid).unwrap(), revisions);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache")).unwrap();
        let _lock = cache.lock().unwrap();
        cache.clear().unwrap();
        assert!(!cache.location().exists());
    }
}
