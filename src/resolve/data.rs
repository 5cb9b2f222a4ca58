//! The node store of a resolve and the graph queries built on it.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use crate::{
    conflict::{Blacklist, ConflictError, ConflictView},
    context::ResolveContext,
    model::{DependencyDescriptor, ModuleId, ModuleRevisionId},
    resolve::{
        node::{EvictionData, Node, NodeRef},
        Caller,
    },
    resolver::ResolveQuery,
    version::VersionMatcher,
};

/// Every node of one resolve, addressed by index. Several ids may point at
/// the same node once a dynamic revision resolved to an already known one.
#[derive(Debug)]
pub struct ResolveData {
    nodes: Vec<Node>,
    index: HashMap<ModuleRevisionId, NodeRef>,
    root: NodeRef,
    /// Every blacklist record ever applied, to detect restarts that add nothing.
    blacklist_log: IndexSet<Blacklist>,
}

impl ResolveData {
    pub(crate) fn new(root: Node) -> Self {
        let mut index = HashMap::new();
        index.insert(root.id.clone(), 0);
        Self {
            nodes: vec![root],
            index,
            root: 0,
            blacklist_log: IndexSet::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeRef {
        self.root
    }

    pub(crate) fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node]
    }

    pub(crate) fn node_mut(&mut self, node: NodeRef) -> &mut Node {
        &mut self.nodes[node]
    }

    pub(crate) fn get(&self, mrid: &ModuleRevisionId) -> Option<NodeRef> {
        self.index.get(mrid).copied()
    }

    pub(crate) fn register(&mut self, mrid: ModuleRevisionId, node: NodeRef) {
        self.index.insert(mrid, node);
    }

    pub(crate) fn create(&mut self, id: ModuleRevisionId) -> NodeRef {
        let node = self.nodes.len();
        self.nodes.push(Node::new(id.clone()));
        self.index.insert(id, node);
        node
    }

    /// The node standing for `node`: itself, or the one it was merged into.
    pub(crate) fn real(&self, node: NodeRef) -> NodeRef {
        let state = &self.nodes[node];
        self.get(state.resolved_id())
            .or_else(|| self.get(&state.id))
            .unwrap_or(node)
    }

    pub(crate) fn is_root(&self, node: NodeRef) -> bool {
        self.real(node) == self.root
    }

    pub(crate) fn resolved_id(&self, node: NodeRef) -> &ModuleRevisionId {
        self.nodes[node].resolved_id()
    }

    /// Indices of the nodes still reachable through the index, in creation order.
    pub(crate) fn real_nodes(&self) -> Vec<NodeRef> {
        let reachable: HashSet<NodeRef> = self.index.values().copied().collect();
        (0..self.nodes.len()).filter(|n| reachable.contains(n)).collect()
    }

    pub(crate) fn blacklist_count(&self) -> usize {
        self.blacklist_log.len()
    }

    // --- conflict bookkeeping held by ancestors ---

    pub(crate) fn selected_nodes(&self, ancestor: NodeRef, mid: &ModuleId, root_conf: &str) -> IndexSet<NodeRef> {
        self.nodes[ancestor]
            .eviction
            .selected
            .get(&(mid.clone(), root_conf.to_owned()))
            .map(|nodes| nodes.iter().map(|n| self.real(*n)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_selected_nodes(
        &mut self,
        ancestor: NodeRef,
        mid: &ModuleId,
        root_conf: &str,
        selected: IndexSet<NodeRef>,
    ) {
        self.nodes[ancestor]
            .eviction
            .selected
            .insert((mid.clone(), root_conf.to_owned()), selected);
    }

    pub(crate) fn evicted_nodes(&self, ancestor: NodeRef, mid: &ModuleId, root_conf: &str) -> IndexSet<NodeRef> {
        self.nodes[ancestor]
            .eviction
            .evicted_nodes
            .get(&(mid.clone(), root_conf.to_owned()))
            .map(|nodes| nodes.iter().map(|n| self.real(*n)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_evicted_nodes(
        &mut self,
        ancestor: NodeRef,
        mid: &ModuleId,
        root_conf: &str,
        evicted: IndexSet<NodeRef>,
    ) {
        let revisions: HashSet<ModuleRevisionId> = evicted
            .iter()
            .flat_map(|n| [self.nodes[*n].id.clone(), self.resolved_id(*n).clone()])
            .collect();
        let key = (mid.clone(), root_conf.to_owned());
        let eviction = &mut self.nodes[ancestor].eviction;
        eviction.evicted_revisions.insert(key.clone(), revisions);
        eviction.evicted_nodes.insert(key, evicted);
    }

    /// Asked and resolved ids of the selected nodes.
    pub(crate) fn resolved_revisions(
        &self,
        ancestor: NodeRef,
        mid: &ModuleId,
        root_conf: &str,
    ) -> HashSet<ModuleRevisionId> {
        self.nodes[ancestor]
            .eviction
            .selected
            .get(&(mid.clone(), root_conf.to_owned()))
            .map(|nodes| {
                nodes
                    .iter()
                    .flat_map(|n| [self.nodes[*n].id.clone(), self.resolved_id(*n).clone()])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn evicted_revisions(
        &self,
        ancestor: NodeRef,
        mid: &ModuleId,
        root_conf: &str,
    ) -> HashSet<ModuleRevisionId> {
        self.nodes[ancestor]
            .eviction
            .evicted_revisions
            .get(&(mid.clone(), root_conf.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn pending_conflicts(&self, ancestor: NodeRef, mid: &ModuleId, root_conf: &str) -> IndexSet<NodeRef> {
        self.nodes[ancestor]
            .eviction
            .pending
            .get(&(mid.clone(), root_conf.to_owned()))
            .map(|nodes| nodes.iter().map(|n| self.real(*n)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn set_pending_conflicts(
        &mut self,
        ancestor: NodeRef,
        mid: &ModuleId,
        root_conf: &str,
        pending: IndexSet<NodeRef>,
    ) {
        let key = (mid.clone(), root_conf.to_owned());
        let eviction = &mut self.nodes[ancestor].eviction;
        if pending.is_empty() {
            eviction.pending.remove(&key);
        } else {
            eviction.pending.insert(key, pending);
        }
    }

    /// Every `(ancestor, module)` slot still waiting for a decision in `root_conf`.
    pub(crate) fn undecided(&self, root_conf: &str) -> Vec<(NodeRef, ModuleId)> {
        let mut slots = vec![];
        for ancestor in self.real_nodes() {
            for ((mid, conf), pending) in &self.nodes[ancestor].eviction.pending {
                if conf == root_conf && !pending.is_empty() {
                    slots.push((ancestor, mid.clone()));
                }
            }
        }
        slots.sort();
        slots
    }

    // --- eviction of a node ---

    /// Eviction data of `node` in `root_conf`, ignoring stale data that now
    /// selects the node itself.
    pub(crate) fn eviction_data(&self, node: NodeRef, root_conf: &str) -> Option<&EvictionData> {
        let data = self.nodes[node].eviction.evicted.get(root_conf)?;
        match &data.selected {
            Some(selected) if selected.iter().any(|s| self.real(*s) == self.real(node)) => None,
            _ => Some(data),
        }
    }

    pub(crate) fn is_evicted(&self, node: NodeRef, root_conf: &str) -> bool {
        let node = self.real(node);
        if node == self.root {
            return false;
        }
        let Some(data) = self.eviction_data(node, root_conf) else {
            return false;
        };
        if data.is_transitive() {
            return true;
        }
        let resolved = self.resolved_revisions(self.root, self.nodes[node].module_id(), root_conf);
        !resolved.contains(self.resolved_id(node))
    }

    pub(crate) fn is_completely_evicted(&self, node: NodeRef) -> bool {
        let node = self.real(node);
        if node == self.root {
            return false;
        }
        let confs = self.nodes[node].root_confs();
        !confs.is_empty() && confs.iter().all(|conf| self.is_evicted(node, conf))
    }

    /// Marks `node` evicted in `root_conf`. The selected nodes inherit its
    /// callers, its usage and the confs it still had to fetch.
    pub(crate) fn mark_evicted(&mut self, node: NodeRef, root_conf: &str, data: EvictionData) {
        if let Some(selected) = data.selected.clone() {
            let callers: Vec<Caller> = self.nodes[node]
                .callers
                .get(root_conf)
                .map(|callers| callers.values().cloned().collect())
                .unwrap_or_default();
            let usage = self.nodes[node].usage.clone();
            let confs_to_fetch = self.nodes[node].confs_to_fetch.clone();
            let selected: Vec<NodeRef> = selected.into_iter().map(|s| self.real(s)).collect();
            for selected in selected {
                if selected == node {
                    continue;
                }
                let target = &mut self.nodes[selected];
                let known = target.callers.entry(root_conf.to_owned()).or_default();
                for caller in &callers {
                    known.entry(caller.mrid.clone()).or_insert_with(|| Caller {
                        real: false,
                        ..caller.clone()
                    });
                }
                let merged = target.merged_usages.entry(node).or_default();
                merged.merge_root_conf(&usage, root_conf);
                target.confs_to_fetch.extend(confs_to_fetch.iter().cloned());
            }
        }
        self.nodes[node]
            .eviction
            .evicted
            .insert(root_conf.to_owned(), data);
    }

    // --- blacklisting ---

    /// Applies a blacklist record: decisions taken under the callers of the
    /// node are forgotten and the node can no longer be found through the
    /// ids it was asked with.
    pub(crate) fn blacklist(&mut self, node: NodeRef, record: Blacklist) {
        let root_conf = record.root_conf.clone();
        let mut pending = vec![node];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let callers: Vec<NodeRef> = self.nodes[current]
                .callers
                .get(&root_conf)
                .map(|callers| callers.keys().filter_map(|c| self.get(c)).collect())
                .unwrap_or_default();
            for caller in callers {
                self.nodes[caller].clear_eviction();
                pending.push(caller);
            }
        }

        let resolved = self.resolved_id(node).clone();
        self.index
            .retain(|mrid, target| *target != node || mrid == &resolved);

        self.blacklist_log.insert(record.clone());
        let records = self.nodes[node]
            .usage
            .blacklisted
            .entry(root_conf)
            .or_default();
        if !records.contains(&record) {
            records.push(record);
        }
    }

    // --- transitivity ---

    pub(crate) fn dependency_descriptor(&self, node: NodeRef, parent: NodeRef) -> Option<&DependencyDescriptor> {
        self.nodes[node].dds.get(&parent).or_else(|| {
            let parent = self.real(parent);
            self.nodes[node]
                .dds
                .iter()
                .find(|(p, _)| self.real(**p) == parent)
                .map(|(_, dd)| dd)
        })
    }
}

/// The graph as seen by conflict managers and resolvers while one root
/// configuration is walked.
pub(crate) struct GraphView<'a> {
    pub data: &'a ResolveData,
    pub ctx: &'a ResolveContext,
    pub root_conf: &'a str,
}

impl GraphView<'_> {
    fn lookup(&self, mrid: &ModuleRevisionId) -> Option<NodeRef> {
        self.data.get(mrid)
    }
}

impl ConflictView for GraphView<'_> {
    fn root_conf(&self) -> &str {
        self.root_conf
    }

    fn is_root(&self, mrid: &ModuleRevisionId) -> bool {
        self.lookup(mrid).is_some_and(|n| self.data.is_root(n))
    }

    fn is_loaded(&self, mrid: &ModuleRevisionId) -> bool {
        self.lookup(mrid)
            .is_some_and(|n| self.data.node(n).is_loaded())
    }

    fn last_modified(&self, mrid: &ModuleRevisionId) -> i64 {
        self.lookup(mrid)
            .and_then(|n| self.data.node(n).descriptor.as_ref())
            .map_or(0, |md| md.publication.timestamp_millis())
    }

    fn callers(&self, mrid: &ModuleRevisionId) -> Vec<Caller> {
        self.lookup(mrid)
            .and_then(|n| self.data.node(n).callers.get(self.root_conf))
            .map(|callers| callers.values().cloned().collect())
            .unwrap_or_default()
    }

    fn all_callers(&self, mrid: &ModuleRevisionId) -> Vec<ModuleRevisionId> {
        let Some(node) = self.lookup(mrid) else {
            return vec![];
        };
        let mut all: IndexSet<ModuleRevisionId> = IndexSet::new();
        let node = self.data.node(node);
        let mut confs: Vec<&String> = node.callers.keys().collect();
        confs.sort();
        for conf in confs {
            all.extend(
                node.callers[conf]
                    .values()
                    .filter(|caller| caller.real)
                    .map(|caller| caller.mrid.clone()),
            );
        }
        all.into_iter().collect()
    }

    fn dependency_descriptor(
        &self,
        mrid: &ModuleRevisionId,
        parent: &ModuleRevisionId,
    ) -> Option<DependencyDescriptor> {
        let node = self.lookup(mrid)?;
        let parent = self.lookup(parent)?;
        self.data.dependency_descriptor(node, parent).cloned()
    }

    fn is_evicted(&self, mrid: &ModuleRevisionId) -> bool {
        self.lookup(mrid)
            .is_some_and(|n| self.data.is_evicted(n, self.root_conf))
    }

    fn is_completely_evicted(&self, mrid: &ModuleRevisionId) -> bool {
        self.lookup(mrid)
            .is_some_and(|n| self.data.is_completely_evicted(n))
    }

    fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool {
        self.lookup(mrid)
            .is_some_and(|n| self.data.node(n).is_blacklisted(self.root_conf))
    }

    fn blacklist_data(&self, mrid: &ModuleRevisionId) -> Option<Blacklist> {
        self.lookup(mrid)
            .and_then(|n| self.data.node(n).blacklist_data(self.root_conf))
            .cloned()
    }

    fn version_matcher(&self) -> &dyn VersionMatcher {
        self.ctx.settings().version_matcher()
    }

    fn debug_conflict_resolution(&self) -> bool {
        self.ctx.settings().debug_conflict_resolution()
    }
}

impl ResolveQuery for GraphView<'_> {
    fn context(&self) -> &ResolveContext {
        self.ctx
    }

    fn is_blacklisted(&self, mrid: &ModuleRevisionId) -> bool {
        ConflictView::is_blacklisted(self, mrid)
    }

    fn handle_all_blacklisted(
        &self,
        dd: &DependencyDescriptor,
        found: &[ModuleRevisionId],
    ) -> Result<(), ConflictError> {
        self.ctx
            .settings()
            .conflict_manager(dd.dependency.module_id())
            .handle_all_blacklisted_revisions(dd, found, self)
    }
}
