use std::collections::{HashSet, VecDeque};

use crate::{
    conflict::{ConflictError, ConflictManager, ConflictOutcome, ConflictView},
    model::ModuleRevisionId,
};

/// Keeps the candidates closest to the conflict parent, whatever their
/// revisions.
#[derive(Debug, Clone, Default)]
pub struct NearestConflictManager;

impl NearestConflictManager {
    pub const NAME: &'static str = "nearest";

    /// Hops from `node` up to `parent` through callers, if `parent` is reachable.
    fn distance(
        node: &ModuleRevisionId,
        parent: &ModuleRevisionId,
        view: &dyn ConflictView,
    ) -> Option<usize> {
        let mut seen: HashSet<ModuleRevisionId> = HashSet::from([node.clone()]);
        let mut queue = VecDeque::from([(node.clone(), 0usize)]);
        while let Some((current, hops)) = queue.pop_front() {
            if &current == parent {
                return Some(hops);
            }
            for caller in view.callers(&current) {
                if seen.insert(caller.mrid.clone()) {
                    queue.push_back((caller.mrid, hops + 1));
                }
            }
        }
        None
    }
}

impl ConflictManager for NearestConflictManager {
    fn name(&self) -> &str {
        Self::NAME
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

        let direct: Vec<&ModuleRevisionId> = conflicts
            .iter()
            .filter(|node| view.callers(node).iter().any(|c| &c.mrid == parent))
            .collect();
        if let Some(forced) = direct.iter().find(|node| {
            view.dependency_descriptor(node, parent)
                .is_some_and(|dd| dd.force)
        }) {
            return Ok(ConflictOutcome::Resolved(vec![(*forced).clone()]));
        }
        if !direct.is_empty() {
            return Ok(ConflictOutcome::Resolved(
                direct.into_iter().cloned().collect(),
            ));
        }

        let distances: Vec<Option<usize>> = conflicts
            .iter()
            .map(|node| Self::distance(node, parent, view))
            .collect();
        let Some(nearest) = distances.iter().flatten().min().copied() else {
            return Ok(ConflictOutcome::Resolved(conflicts.to_vec()));
        };
        Ok(ConflictOutcome::Resolved(
            conflicts
                .iter()
                .zip(distances)
                .filter(|(_, distance)| *distance == Some(nearest))
                .map(|(node, _)| node.clone())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::conflict::tests::{mrid, FakeView};

    #[test]
    fn direct_child_beats_two_hops() {
        let root = mrid("app", "1");
        let lib = mrid("lib", "1");
        let mut view = FakeView::new(root.clone());
        view.depends(&root, &lib, &lib, false);
        view.depends(&lib, &mrid("util", "9.0"), &mrid("util", "9.0"), false);
        view.depends(&root, &mrid("util", "1.0"), &mrid("util", "1.0"), false);

        let conflicts = vec![mrid("util", "9.0"), mrid("util", "1.0")];
        assert_eq!(
            NearestConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "1.0")])
        );
    }

    #[test]
    fn forced_direct_child_wins() {
        let root = mrid("app", "1");
        let mut view = FakeView::new(root.clone());
        view.depends(&root, &mrid("util", "1.0"), &mrid("util", "1.0"), false);
        view.depends(&root, &mrid("util", "2.0"), &mrid("util", "2.0"), true);

        let conflicts = vec![mrid("util", "1.0"), mrid("util", "2.0")];
        assert_eq!(
            NearestConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "2.0")])
        );
    }

    #[test]
    fn shortest_path_wins_without_direct_children() {
        // app -> a -> util 1.0
        // app -> b -> c -> util 2.0
        let root = mrid("app", "1");
        let (a, b, c) = (mrid("a", "1"), mrid("b", "1"), mrid("c", "1"));
        let mut view = FakeView::new(root.clone());
        view.depends(&root, &a, &a, false);
        view.depends(&root, &b, &b, false);
        view.depends(&b, &c, &c, false);
        view.depends(&a, &mrid("util", "1.0"), &mrid("util", "1.0"), false);
        view.depends(&c, &mrid("util", "2.0"), &mrid("util", "2.0"), false);

        let conflicts = vec![mrid("util", "2.0"), mrid("util", "1.0")];
        assert_eq!(
            NearestConflictManager
                .resolve_conflicts(&root, &conflicts, &view)
                .unwrap(),
            ConflictOutcome::Resolved(vec![mrid("util", "1.0")])
        );
    }
}
