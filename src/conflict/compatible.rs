use std::sync::Arc;

use log::debug;

use crate::{
    conflict::{
        Blacklist, ConflictError, ConflictManager, ConflictOutcome, ConflictView,
        LatestConflictManager, Restart,
    },
    model::{DependencyDescriptor, ModuleRevisionId},
    version::LatestStrategy,
};

/// Like the latest manager, but only keeps revisions compatible with every
/// constraint that asked for them.
///
/// When a dynamic constraint and a static one cannot agree, the dynamic
/// resolutions leading to the losing side are blacklisted and the walker is
/// asked to restart, so the constraint resolves to another revision. When no
/// such resolution exists on some path the conflict is fatal.
#[derive(Debug, Clone)]
pub struct LatestCompatibleConflictManager {
    latest: LatestConflictManager,
}

impl LatestCompatibleConflictManager {
    pub const NAME: &'static str = "latest-compatible";

    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        Self {
            latest: LatestConflictManager::new(Self::NAME, strategy),
        }
    }

    fn handle_incompatible(
        &self,
        parent: &ModuleRevisionId,
        node: &ModuleRevisionId,
        other: &ModuleRevisionId,
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        let pair = [node.clone(), other.clone()];
        let latest = match self.latest.find_latest(&pair, view) {
            Some(Some(latest)) => latest,
            _ => return Ok(ConflictOutcome::Deferred),
        };
        let oldest = if &latest == node { other } else { node };

        if let Some(restart) = self.blacklist_incompatible(parent, oldest, &latest, view) {
            return Ok(ConflictOutcome::Restart(restart));
        }
        // Every path to the latest one is static, try keeping it instead.
        if let Some(restart) = self.blacklist_incompatible(parent, &latest, oldest, view) {
            return Ok(ConflictOutcome::Restart(restart));
        }
        Err(ConflictError::between(node, other, view))
    }

    fn blacklist_incompatible(
        &self,
        parent: &ModuleRevisionId,
        selected: &ModuleRevisionId,
        evicted: &ModuleRevisionId,
        view: &dyn ConflictView,
    ) -> Option<Restart> {
        let walk = CallerWalk {
            parent,
            selected,
            evicted,
            view,
        };
        let mut stack = vec![evicted.clone()];
        let blacklist = walk.blacklist_callers(&mut stack)?;
        let names: Vec<String> = blacklist.iter().map(|b| b.blacklisted.to_string()).collect();
        if view.debug_conflict_resolution() {
            debug!(
                "evicting {} by [{}] in {} with blacklisting of {}",
                evicted,
                selected,
                parent,
                names.join(" ")
            );
        }
        Some(Restart {
            message: format!(
                "trying to handle incompatibilities between {} and {}",
                selected, evicted
            ),
            blacklist,
            selected: selected.clone(),
            evicted: evicted.clone(),
            detail: format!("with blacklisting of {}", names.join(" ")),
        })
    }
}

/// Walks callers upwards from the node to evict, looking on every path for
/// a resolution made through a dynamic constraint.
struct CallerWalk<'a> {
    parent: &'a ModuleRevisionId,
    selected: &'a ModuleRevisionId,
    evicted: &'a ModuleRevisionId,
    view: &'a dyn ConflictView,
}

impl CallerWalk<'_> {
    fn blacklist_callers(&self, stack: &mut Vec<ModuleRevisionId>) -> Option<Vec<Blacklist>> {
        let node = stack.last()?.clone();
        let mut blacklisted: Vec<Blacklist> = vec![];
        for caller in self.view.callers(&node) {
            if self.view.is_blacklisted(&caller.mrid) {
                continue;
            }
            if self.view.version_matcher().is_dynamic(caller.asked()) {
                let record = Blacklist {
                    conflict_parent: self.parent.clone(),
                    selected: self.selected.clone(),
                    evicted: self.evicted.clone(),
                    blacklisted: node.clone(),
                    root_conf: self.view.root_conf().to_owned(),
                };
                if !blacklisted.contains(&record) {
                    blacklisted.push(record);
                }
                if self.view.is_evicted(&node)
                    && !self.follow_caller(stack, &node, &caller.mrid, &mut blacklisted)
                {
                    return None;
                }
            } else if !self.follow_caller(stack, &node, &caller.mrid, &mut blacklisted) {
                return None;
            }
        }
        if blacklisted.is_empty() && !in_stack_below_top(stack, &node) {
            return None;
        }
        Some(blacklisted)
    }

    fn follow_caller(
        &self,
        stack: &mut Vec<ModuleRevisionId>,
        node: &ModuleRevisionId,
        caller: &ModuleRevisionId,
        blacklisted: &mut Vec<Blacklist>,
    ) -> bool {
        // A cycle closes here, nothing more to find on this path.
        if in_stack_below_top(stack, node) {
            return true;
        }
        stack.push(caller.clone());
        let sub = self.blacklist_callers(stack);
        stack.pop();
        match sub {
            Some(sub) => {
                for record in sub {
                    if !blacklisted.contains(&record) {
                        blacklisted.push(record);
                    }
                }
                true
            }
            None => false,
        }
    }
}

fn in_stack_below_top(stack: &[ModuleRevisionId], node: &ModuleRevisionId) -> bool {
    stack[..stack.len().saturating_sub(1)].contains(node)
}

impl ConflictManager for LatestCompatibleConflictManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_conflicts(
        &self,
        parent: &ModuleRevisionId,
        conflicts: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<ConflictOutcome, ConflictError> {
        let Some((node, others)) = conflicts.split_first() else {
            return Ok(ConflictOutcome::Resolved(vec![]));
        };
        if others.is_empty() {
            return Ok(ConflictOutcome::Resolved(conflicts.to_vec()));
        }
        let matcher = view.version_matcher();

        if matcher.is_dynamic(node) {
            for other in others {
                if matcher.is_dynamic(other) {
                    return Ok(ConflictOutcome::Deferred);
                }
                if !matcher.accept(node, other) {
                    return self.handle_incompatible(parent, node, other, view);
                }
            }
            if others.len() == 1 {
                return Ok(ConflictOutcome::Resolved(others.to_vec()));
            }
            self.latest.resolve_conflicts(parent, others, view)
        } else {
            for other in others {
                if !matcher.accept(other, node) {
                    return self.handle_incompatible(parent, node, other, view);
                }
            }
            Ok(ConflictOutcome::Resolved(vec![node.clone()]))
        }
    }

    fn handle_all_blacklisted_revisions(
        &self,
        _dd: &DependencyDescriptor,
        found: &[ModuleRevisionId],
        view: &dyn ConflictView,
    ) -> Result<(), ConflictError> {
        for mrid in found {
            if let Some(data) = view.blacklist_data(mrid) {
                return Err(ConflictError::between(&data.evicted, &data.selected, view));
            }
        }
        Ok(())
    }
}
