use crate::{
    conflict::{ConflictError, ConflictManager, ConflictOutcome, ConflictView},
    model::ModuleRevisionId,
};

/// Fails as soon as two different revisions of a module are needed.
#[derive(Debug, Clone, Default)]
pub struct StrictConflictManager;

impl StrictConflictManager {
    pub const NAME: &'static str = "strict";
}

impl ConflictManager for StrictConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        _parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        let mut last: Option<&ModuleRevisionId> = None;
        for node in conflicts {
            if view.version_matcher().is_dynamic(node) {
                return Ok(ConflictOutcome::Deferred);
            }
            if let Some(last) = last {
                if last != node {
                    return Err(ConflictError::between(last, node, view));
                }
            }
            last = Some(node);
        }
        Ok(ConflictOutcome::Resolved(last.cloned().into_iter().collect()))
    }
}

/// Keeps only the revisions listed up front.
#[derive(Debug, Clone, Default)]
pub struct FixedConflictManager {
    revisions: Vec<String>,
}

impl FixedConflictManager {
    pub const NAME: &'static str = "fixed";

    pub fn new(revisions: Vec<String>) -> Self {
        Self { revisions }
    }

    pub fn revisions(&self) -> &[String] {
        &self.revisions
    }
}

impl ConflictManager for FixedConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        _parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        _view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        Ok(ConflictOutcome::Resolved(
            conflicts
                .iter()
                .filter(|node| self.revisions.iter().any(|r| r == node.revision()))
                .cloned()
                .collect(),
        ))
    }
}

/// Keeps every revision: nothing is ever evicted.
#[derive(Debug, Clone, Default)]
pub struct NoConflictManager;

impl NoConflictManager {
    pub const NAME: &'static str = "all";
}

impl ConflictManager for NoConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        _parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        _view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        Ok(ConflictOutcome::Resolved(conflicts.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        conflict::tests::{mrid, FakeView},
        version::VersionRangeMatcher,
    };

    #[test]
    fn strict_keeps_identical_revisions() {
        let root = mrid("app", "1");
        let view = FakeView::new(root.clone());
        let conflicts = vec![mrid("util", "1.0"), mrid("util", "1.0")];
        assert_eq!(
            StrictConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "1.0")])
        );
    }

    #[test]
    fn strict_rejects_distinct_revisions() {
        let root = mrid("app", "1");
        let mut view = FakeView::new(root.clone());
        let lib = mrid("lib", "2");
        view.depends(&root, &mrid("util", "1.0"), &mrid("util", "1.0"), false);
        view.depends(&lib, &mrid("util", "1.1"), &mrid("util", "1.1"), false);
        let result = StrictConflictManager.resolve_conflicts(
            &root,
            &[mrid("util", "1.0"), mrid("util", "1.1")],
            &view,
        );
        assert_eq!(
            result,
            Err(ConflictError::StrictConflict(
                "acme#util;1.0 (needed by [acme#app;1]) conflicts with acme#util;1.1 (needed by [acme#lib;2])"
                    .to_owned()
            ))
        );
    }

    #[test]
    fn strict_waits_for_dynamic_revisions() {
        let root = mrid("app", "1");
        let view = FakeView::new(root.clone()).with_matcher(VersionRangeMatcher::default());
        let conflicts = vec![mrid("util", "1.0"), mrid("util", "[1.0,2.0]")];
        assert_eq!(
            StrictConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Deferred
        );
    }

    #[test]
    fn fixed_keeps_listed_revisions() {
        let root = mrid("app", "1");
        let view = FakeView::new(root.clone());
        let manager = FixedConflictManager::new(vec!["1.1".to_owned(), "3.0".to_owned()]);
        let conflicts = vec![mrid("util", "1.0"), mrid("util", "1.1"), mrid("util", "3.0")];
        assert_eq!(
            manager.resolve_conflicts(&root, &conflicts, &view).unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "1.1"), mrid("util", "3.0")])
        );
    }

    #[test]
    fn all_keeps_everything() {
        let root = mrid("app", "1");
        let view = FakeView::new(root.clone());
        let conflicts = vec![mrid("util", "1.0"), mrid("util", "1.1")];
        assert_eq!(
            NoConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(conflicts)
        );
    }
}
