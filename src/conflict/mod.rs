//! Conflict managers decide which revisions of one module survive when a
//! parent ends up depending on several of them.
//!
//! A manager may also answer "not yet": the walker then keeps the
//! candidates pending and asks again once more metadata is loaded. The
//! latest-compatible manager can additionally ask for a restart after
//! blacklisting the resolutions that led to an incompatibility.

use std::fmt::{Debug, Display, Formatter};

use thiserror::Error;

use crate::{
    model::{DependencyDescriptor, ModuleRevisionId},
    resolve::Caller,
    version::{ArtifactInfo, Undecidable, VersionMatcher},
};

mod compatible;
mod latest;
mod nearest;
mod regexp;
mod strict;

pub use compatible::LatestCompatibleConflictManager;
pub use latest::LatestConflictManager;
pub use nearest::NearestConflictManager;
pub use regexp::RegexpConflictManager;
pub use strict::{FixedConflictManager, NoConflictManager, StrictConflictManager};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("{0}")]
    StrictConflict(String),
    #[error("Invalid conflict manager pattern `{0}`: {1}")]
    InvalidPattern(String, String),
}

impl ConflictError {
    /// Conflict between two revisions, naming who needs each of them.
    pub fn between(
        node1: &ModuleRevisionId,
        node2: &ModuleRevisionId,
        view: &dyn ConflictView,
    ) -> Self {
        ConflictError::StrictConflict(format!(
            "{} (needed by {}) conflicts with {} (needed by {})",
            node1,
            needed_by(node1, view),
            node2,
            needed_by(node2, view)
        ))
    }
}

pub(crate) fn needed_by(mrid: &ModuleRevisionId, view: &dyn ConflictView) -> String {
    let callers: Vec<String> = view
        .all_callers(mrid)
        .iter()
        .map(ToString::to_string)
        .collect();
    format!("[{}]", callers.join(", "))
}

/// A resolution that must not be picked again: `blacklisted` was reached
/// through a dynamic constraint and led to `evicted` conflicting with
/// `selected` under `conflict_parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Blacklist {
    pub conflict_parent: ModuleRevisionId,
    pub selected: ModuleRevisionId,
    pub evicted: ModuleRevisionId,
    pub blacklisted: ModuleRevisionId,
    pub root_conf: String,
}

impl Display for Blacklist {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} blacklisted to evict {} in favor of {} in {} for {}]",
            self.blacklisted, self.evicted, self.selected, self.conflict_parent, self.root_conf
        )
    }
}

/// Request to redo the current root configuration once the blacklist
/// records are applied and `evicted` is marked evicted in favor of `selected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restart {
    pub message: String,
    pub blacklist: Vec<Blacklist>,
    pub selected: ModuleRevisionId,
    pub evicted: ModuleRevisionId,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// The surviving candidates, a subset of the ones given.
    Resolved(Vec<ModuleRevisionId>),
    /// Not enough metadata loaded yet to decide.
    Deferred,
    Restart(Restart),
}

/// Read-only facts about the nodes of the graph being resolved, scoped to
/// the root configuration currently walked.
pub trait ConflictView {
    fn root_conf(&self) -> &str;

    fn is_root(&self, mrid: &ModuleRevisionId) -> bool;

    fn is_loaded(&self, mrid: &ModuleRevisionId) -> bool;

    /// Last modification time in milliseconds, 0 when unknown.
    fn last_modified(&self, mrid: &ModuleRevisionId) -> i64;

    /// Callers of `mrid` in the current root configuration.
    fn callers(&self, mrid: &ModuleRevisionId) -> Vec<Caller>;

    /// Real callers of `mrid` in every root configuration.
    fn all_callers(&self, mrid: &ModuleRevisionId) -> Vec<ModuleRevisionId>;

    /// What `parent` declared to reach `mrid`, if it depends on it directly.
    fn dependency_descriptor(
        &self,
        mrid: &ModuleRevisionId,
        parent: &ModuleRevisionId,
    ) -> Option<DependencyDescriptor>;

    fn is_evicted(&self, mrid: &ModuleRevisionId) -> bool;

    fn is_completely_evicted(&self, mrid: &ModuleRevisionId) -> bool;

    fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool;

    fn blacklist_data(&self, mrid: &ModuleRevisionId) -> Option<Blacklist>;

    fn version_matcher(&self) -> &dyn VersionMatcher;

    fn debug_conflict_resolution(&self) -> bool {
        false
    }
}

pub trait ConflictManager: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// `conflicts` holds resolved ids of the same module, in discovery order.
    fn resolve_conflicts(
        &self,
        parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError>;

    /// Called by resolvers when every revision matching `dd` is blacklisted.
    fn handle_all_blacklisted_revisions(
        &self,
        _dd: &DependencyDescriptor,
        _found: &[ModuleRevisionId],
        _view: &dyn ConflictView,
    ) -> Result<(), ConflictError> {
        Ok(())
    }
}

/// A node seen by a latest strategy. An unknown modification time makes any
/// time based ordering undecidable.
pub(crate) struct NodeInfo {
    revision: String,
    last_modified: i64,
    label: String,
}

impl NodeInfo {
    pub(crate) fn new(mrid: &ModuleRevisionId, view: &dyn ConflictView) -> Self {
        Self {
            revision: mrid.revision().to_owned(),
            last_modified: view.last_modified(mrid),
            label: mrid.to_string(),
        }
    }
}

impl ArtifactInfo for NodeInfo {
    fn revision(&self) -> &str {
        &self.revision
    }

    fn last_modified(&self) -> Result<i64, Undecidable> {
        if self.last_modified == 0 {
            Err(Undecidable(self.label.clone()))
        } else {
            Ok(self.last_modified)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use indexmap::IndexMap;

    use super::*;
    use crate::version::ExactVersionMatcher;

    /// Hand-built graph facts for exercising managers without a walker.
    #[derive(Debug)]
    pub(crate) struct FakeView {
        pub root: ModuleRevisionId,
        pub callers: HashMap<ModuleRevisionId, Vec<Caller>>,
        pub last_modified: HashMap<ModuleRevisionId, i64>,
        pub evicted: Vec<ModuleRevisionId>,
        pub blacklisted: HashMap<ModuleRevisionId, Blacklist>,
        pub matcher: Box<dyn VersionMatcher>,
    }

    impl FakeView {
        pub(crate) fn new(root: ModuleRevisionId) -> Self {
            Self {
                root,
                callers: HashMap::new(),
                last_modified: HashMap::new(),
                evicted: vec![],
                blacklisted: HashMap::new(),
                matcher: Box::new(ExactVersionMatcher),
            }
        }

        pub(crate) fn with_matcher(mut self, matcher: impl VersionMatcher + 'static) -> Self {
            self.matcher = Box::new(matcher);
            self
        }

        /// Records that `caller` asked for `asked` and got `node`.
        pub(crate) fn depends(
            &mut self,
            caller: &ModuleRevisionId,
            asked: &ModuleRevisionId,
            node: &ModuleRevisionId,
            force: bool,
        ) {
            let dd = DependencyDescriptor::new(caller.clone(), asked.clone()).with_force(force);
            let mut confs = IndexMap::new();
            confs.insert("default".to_owned(), vec!["default".to_owned()]);
            self.callers.entry(node.clone()).or_default().push(Caller {
                mrid: caller.clone(),
                confs,
                dd,
                real: true,
            });
        }
    }

    impl ConflictView for FakeView {
        fn root_conf(&self) -> &str {
            "default"
        }

        fn is_root(&self, mrid: &ModuleRevisionId) -> bool {
            mrid == &self.root
        }

        fn is_loaded(&self, _mrid: &ModuleRevisionId) -> bool {
            true
        }

        fn last_modified(&self, mrid: &ModuleRevisionId) -> i64 {
            self.last_modified.get(mrid).copied().unwrap_or(1)
        }

        fn callers(&self, mrid: &ModuleRevisionId) -> Vec<Caller> {
            self.callers.get(mrid).cloned().unwrap_or_default()
        }

        fn all_callers(&self, mrid: &ModuleRevisionId) -> Vec<ModuleRevisionId> {
            self.callers(mrid).into_iter().map(|c| c.mrid).collect()
        }

        fn dependency_descriptor(
            &self,
            mrid: &ModuleRevisionId,
            parent: &ModuleRevisionId,
        ) -> Option<DependencyDescriptor> {
            self.callers(mrid)
                .into_iter()
                .find(|c| &c.mrid == parent)
                .map(|c| c.dd)
        }

        fn is_evicted(&self, mrid: &ModuleRevisionId) -> bool {
            self.evicted.contains(mrid)
        }

        fn is_completely_evicted(&self, mrid: &ModuleRevisionId) -> bool {
            self.evicted.contains(mrid)
        }

        fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool {
            self.blacklisted.contains_key(mrid)
        }

        fn blacklist_data(&self, mrid: &ModuleRevisionId) -> Option<Blacklist> {
            self.blacklisted.get(mrid).cloned()
        }

        fn version_matcher(&self) -> &dyn VersionMatcher {
            self.matcher.as_ref()
        }
    }

    pub(crate) fn mrid(name: &str, revision: &str) -> ModuleRevisionId {
        ModuleRevisionId::of("acme", name, revision)
    }
}
