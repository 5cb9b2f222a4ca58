use std::sync::Arc;

use log::debug;

use crate::{
    conflict::{ConflictError, ConflictManager, ConflictOutcome, ConflictView, NodeInfo},
    model::ModuleRevisionId,
    version::{ArtifactInfo, LatestStrategy},
};

/// Keeps the latest candidate according to a [`LatestStrategy`].
#[derive(Debug, Clone)]
pub struct LatestConflictManager {
    name: String,
    strategy: Arc<dyn LatestStrategy>,
}

impl LatestConflictManager {
    pub fn new(name: impl Into<String>, strategy: Arc<dyn LatestStrategy>) -> Self {
        Self {
            name: name.into(),
            strategy,
        }
    }

    pub fn strategy(&self) -> &dyn LatestStrategy {
        self.strategy.as_ref()
    }

    /// The latest of `candidates`, or `None` when a timestamp is still unknown.
    pub(crate) fn find_latest(
        &self,
        candidates: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Option<Option<ModuleRevisionId>> {
        let infos: Vec<NodeInfo> = candidates.iter().map(|c| NodeInfo::new(c, view)).collect();
        let refs: Vec<&dyn ArtifactInfo> = infos.iter().map(|i| i as &dyn ArtifactInfo).collect();
        match self.strategy.find_latest(&refs) {
            Ok(latest) => Some(latest.map(|index| candidates[index].clone())),
            Err(undecidable) => {
                if view.debug_conflict_resolution() {
                    debug!("cannot decide yet: {}", undecidable);
                }
                None
            }
        }
    }
}

impl ConflictManager for LatestConflictManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_conflicts(
        &self,
        parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        if conflicts.len() < 2 {
            return Ok(ConflictOutcome::Resolved(conflicts.to_vec()));
        }
        for node in conflicts {
            let forced = view
                .dependency_descriptor(node, parent)
                .is_some_and(|dd| dd.force && &dd.parent == parent);
            if forced {
                return Ok(ConflictOutcome::Resolved(vec![node.clone()]));
            }
        }
        if conflicts
            .iter()
            .any(|node| view.version_matcher().is_dynamic(node))
        {
            return Ok(ConflictOutcome::Deferred);
        }

        let unevicted: Vec<ModuleRevisionId> = conflicts
            .iter()
            .filter(|node| !view.is_completely_evicted(node))
            .cloned()
            .collect();
        let candidates = if unevicted.is_empty() {
            conflicts
        } else {
            &unevicted
        };

        Ok(match self.find_latest(candidates, view) {
            None => ConflictOutcome::Deferred,
            Some(Some(latest)) => ConflictOutcome::Resolved(vec![latest]),
            Some(None) => ConflictOutcome::Resolved(candidates.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        conflict::tests::{mrid, FakeView},
        version::{LatestRevisionStrategy, LatestTimeStrategy, SubVersionMatcher},
    };

    fn latest_revision() -> LatestConflictManager {
        LatestConflictManager::new("latest-revision", Arc::new(LatestRevisionStrategy::new()))
    }

    #[test]
    fn latest_revision_wins() {
        let root = mrid("app", "1.0");
        let view = FakeView::new(root.clone());
        let conflicts = vec![mrid("util", "1.2"), mrid("util", "1.10"), mrid("util", "1.9")];
        assert_eq!(
            latest_revision()
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "1.10")])
        );
    }

    #[test]
    fn same_input_gives_same_answer() {
        let root = mrid("app", "1.0");
        let view = FakeView::new(root.clone());
        let manager = latest_revision();
        let conflicts = vec![mrid("util", "2.0"), mrid("util", "2.0-rc1")];
        let first = manager.resolve_conflicts(&root, &conflicts, &view).unwrap();
        let second = manager.resolve_conflicts(&root, &conflicts, &view).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn force_from_parent_short_circuits() {
        let root = mrid("app", "1.0");
        let mut view = FakeView::new(root.clone());
        let old = mrid("util", "1.0");
        view.depends(&root, &old, &old, true);
        let conflicts = vec![mrid("util", "2.0"), old.clone()];
        assert_eq!(
            latest_revision()
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![old])
        );
    }

    #[test]
    fn dynamic_candidates_are_deferred() {
        let root = mrid("app", "1.0");
        let view = FakeView::new(root.clone()).with_matcher(SubVersionMatcher);
        let conflicts = vec![mrid("util", "1.+"), mrid("util", "1.0")];
        assert_eq!(
            latest_revision()
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Deferred
        );
    }

    #[test]
    fn unknown_time_is_deferred() {
        let root = mrid("app", "1.0");
        let mut view = FakeView::new(root.clone());
        view.last_modified.insert(mrid("util", "1.0"), 0);
        let manager = LatestConflictManager::new("latest-time", Arc::new(LatestTimeStrategy));
        let conflicts = vec![mrid("util", "2.0"), mrid("util", "1.0")];
        assert_eq!(
            manager.resolve_conflicts(&root, &conflicts, &view).unwrap(),
            ConflictOutcome::Deferred
        );
    }

    #[test]
    fn completely_evicted_candidates_are_ignored() {
        let root = mrid("app", "1.0");
        let mut view = FakeView::new(root.clone());
        view.evicted.push(mrid("util", "3.0"));
        let conflicts = vec![mrid("util", "3.0"), mrid("util", "2.0")];
        assert_eq!(
            latest_revision()
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "2.0")])
        );
    }
}
