//! Resolvers find module descriptors matching a dependency and download
//! artifacts into the resolution cache.

use std::{fmt::Debug, sync::Arc};

use crate::{
    cache::ResolutionCache,
    conflict::ConflictError,
    context::ResolveContext,
    model::{Artifact, DependencyDescriptor, ModuleDescriptor, ModuleRevisionId},
    report::ArtifactDownloadReport,
    resolve::ResolveError,
};

mod chain;
mod pattern;

pub use chain::ChainResolver;
pub use pattern::PatternResolver;

/// What a resolver needs from the resolve in progress.
pub trait ResolveQuery {
    fn context(&self) -> &ResolveContext;

    /// True when `mrid` must not be selected again in the current root conf.
    fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool;

    /// Every revision matching `dd` was blacklisted.
    fn handle_all_blacklisted(
        &self,
        dd: &DependencyDescriptor,
        found: &[ModuleRevisionId],
    ) -> Result<(), ConflictError>;
}

/// Outside of a resolve nothing is blacklisted.
impl ResolveQuery for ResolveContext {
    fn context(&self) -> &ResolveContext {
        self
    }

    fn is_blacklisted(&self, _mrid: &ModuleRevisionId) -> bool {
        false
    }

    fn handle_all_blacklisted(
        &self,
        _dd: &DependencyDescriptor,
        _found: &[ModuleRevisionId],
    ) -> Result<(), ConflictError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedModuleRevision {
    pub descriptor: Arc<ModuleDescriptor>,
    /// The resolver that was asked.
    pub resolver: String,
    /// The resolver that holds the artifacts.
    pub artifact_resolver: String,
    /// Revisions were listed to find it.
    pub searched: bool,
    /// The descriptor was read from the repository rather than from memory.
    pub downloaded: bool,
}

impl ResolvedModuleRevision {
    pub fn id(&self) -> &ModuleRevisionId {
        &self.descriptor.mrid
    }

    pub fn publication_millis(&self) -> i64 {
        self.descriptor.publication.timestamp_millis()
    }
}

pub trait DependencyResolver: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// The descriptor of the best revision matching `dd`, if any.
    fn find_module(
        &self,
        dd: &DependencyDescriptor,
        query: &dyn ResolveQuery,
    ) -> Result<Option<ResolvedModuleRevision>, ResolveError>;

    /// Never fails: problems are reported through the returned status.
    fn download(
        &self,
        artifact: &Artifact,
        cache: &ResolutionCache,
        ctx: &ResolveContext,
    ) -> ArtifactDownloadReport;
}
