//! One module revision in the graph being resolved, with everything the
//! walker learns about it per root configuration.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    conflict::Blacklist,
    model::{
        Configuration, DependencyDescriptor, ModuleDescriptor, ModuleId, ModuleRevisionId,
        Visibility,
    },
    resolve::Caller,
    resolver::ResolvedModuleRevision,
};

pub(crate) type NodeRef = usize;

/// Key of the per ancestor conflict bookkeeping.
pub(crate) type ModuleConf = (ModuleId, String);

/// Why a node lost in one root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EvictionData {
    pub parent: Option<NodeRef>,
    pub conflict_manager: Option<String>,
    /// `None` when the node was evicted transitively, with all of its callers.
    pub selected: Option<Vec<NodeRef>>,
    pub detail: Option<String>,
}

impl EvictionData {
    pub fn transitive() -> Self {
        Self {
            parent: None,
            conflict_manager: None,
            selected: None,
            detail: None,
        }
    }

    pub fn is_transitive(&self) -> bool {
        self.selected.is_none()
    }
}

/// Conflict state of a node, both as a loser and as the ancestor under which
/// conflicts of its dependencies are settled.
#[derive(Debug, Clone, Default)]
pub(crate) struct Eviction {
    pub evicted: HashMap<String, EvictionData>,
    pub selected: HashMap<ModuleConf, IndexSet<NodeRef>>,
    pub evicted_nodes: HashMap<ModuleConf, IndexSet<NodeRef>>,
    pub evicted_revisions: HashMap<ModuleConf, HashSet<ModuleRevisionId>>,
    pub pending: HashMap<ModuleConf, IndexSet<NodeRef>>,
}

/// How a node is used: which of its confs each root conf and each parent
/// conf need, through which descriptors, and what got blacklisted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Usage {
    pub root_confs: IndexMap<String, IndexSet<String>>,
    pub required: HashMap<(NodeRef, String), IndexSet<String>>,
    pub dependers: HashMap<String, Vec<DependencyDescriptor>>,
    pub blacklisted: HashMap<String, Vec<Blacklist>>,
}

impl Usage {
    pub fn add_root_confs<'a>(&mut self, root_conf: &str, confs: impl IntoIterator<Item = &'a String>) {
        self.root_confs
            .entry(root_conf.to_owned())
            .or_default()
            .extend(confs.into_iter().cloned());
    }

    pub fn required(&self, parent: NodeRef, parent_conf: &str) -> Option<&IndexSet<String>> {
        self.required.get(&(parent, parent_conf.to_owned()))
    }

    pub fn add_required(&mut self, parent: NodeRef, parent_conf: &str, confs: &[String]) {
        self.required
            .entry((parent, parent_conf.to_owned()))
            .or_default()
            .extend(confs.iter().cloned());
    }

    pub fn add_depender(&mut self, root_conf: &str, dd: &DependencyDescriptor) {
        let dependers = self.dependers.entry(root_conf.to_owned()).or_default();
        if !dependers.contains(dd) {
            dependers.push(dd.clone());
        }
    }

    /// Folds `other` into this usage for `root_conf` only.
    pub fn merge_root_conf(&mut self, other: &Usage, root_conf: &str) {
        if let Some(confs) = other.root_confs.get(root_conf) {
            self.add_root_confs(root_conf, confs);
        }
        for ((parent, parent_conf), confs) in &other.required {
            self.required
                .entry((*parent, parent_conf.clone()))
                .or_default()
                .extend(confs.iter().cloned());
        }
        if let Some(dds) = other.dependers.get(root_conf) {
            for dd in dds {
                self.add_depender(root_conf, dd);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// The id as asked by the first caller that reached this node.
    pub id: ModuleRevisionId,
    pub descriptor: Option<Arc<ModuleDescriptor>>,
    pub module: Option<ResolvedModuleRevision>,
    pub problem: Option<String>,
    pub downloaded: bool,
    pub searched: bool,
    /// Descriptors through which each parent reaches this node.
    pub dds: IndexMap<NodeRef, DependencyDescriptor>,
    /// Per root conf, keyed by the caller's resolved id.
    pub callers: HashMap<String, IndexMap<ModuleRevisionId, Caller>>,
    pub usage: Usage,
    /// Usages of the nodes evicted in favor of this one.
    pub merged_usages: IndexMap<NodeRef, Usage>,
    pub confs_to_fetch: IndexSet<String>,
    pub fetched_confs: IndexSet<String>,
    pub loaded_root_confs: HashSet<String>,
    pub eviction: Eviction,
}

impl Node {
    pub fn new(id: ModuleRevisionId) -> Self {
        Self {
            id,
            descriptor: None,
            module: None,
            problem: None,
            downloaded: false,
            searched: false,
            dds: IndexMap::new(),
            callers: HashMap::new(),
            usage: Usage::default(),
            merged_usages: IndexMap::new(),
            confs_to_fetch: IndexSet::new(),
            fetched_confs: IndexSet::new(),
            loaded_root_confs: HashSet::new(),
            eviction: Eviction::default(),
        }
    }

    pub fn root(descriptor: Arc<ModuleDescriptor>) -> Self {
        let mut node = Self::new(descriptor.mrid.clone());
        node.descriptor = Some(descriptor);
        node
    }

    /// The id of the loaded descriptor, the asked one until then.
    pub fn resolved_id(&self) -> &ModuleRevisionId {
        self.descriptor.as_ref().map_or(&self.id, |md| &md.mrid)
    }

    pub fn module_id(&self) -> &ModuleId {
        self.id.module_id()
    }

    pub fn is_loaded(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn has_problem(&self) -> bool {
        self.problem.is_some()
    }

    /// Root confs in which this node or one it replaced is used.
    pub fn root_confs(&self) -> IndexSet<String> {
        let mut confs: IndexSet<String> = self.usage.root_confs.keys().cloned().collect();
        for usage in self.merged_usages.values() {
            confs.extend(usage.root_confs.keys().cloned());
        }
        confs
    }

    /// The confs of this node needed in `root_conf`.
    pub fn confs(&self, root_conf: &str) -> IndexSet<String> {
        let mut confs = self
            .usage
            .root_confs
            .get(root_conf)
            .cloned()
            .unwrap_or_default();
        for usage in self.merged_usages.values() {
            if let Some(merged) = usage.root_confs.get(root_conf) {
                confs.extend(merged.iter().cloned());
            }
        }
        confs
    }

    /// Confs required from `parent` in `parent_conf`, merged usages included.
    pub fn required_confs(&self, parent: NodeRef, parent_conf: &str) -> IndexSet<String> {
        let mut confs = self
            .usage
            .required(parent, parent_conf)
            .cloned()
            .unwrap_or_default();
        for usage in self.merged_usages.values() {
            if let Some(merged) = usage.required(parent, parent_conf) {
                confs.extend(merged.iter().cloned());
            }
        }
        confs
    }

    pub fn conf_required_by_merged_usage_only(&self, root_conf: &str, conf: &str) -> bool {
        let in_own = self
            .usage
            .root_confs
            .get(root_conf)
            .is_some_and(|confs| confs.contains(conf));
        !in_own
            && self.merged_usages.values().any(|usage| {
                usage
                    .root_confs
                    .get(root_conf)
                    .is_some_and(|confs| confs.contains(conf))
            })
    }

    pub fn has_merged_transitive_depender(&self, root_conf: &str) -> bool {
        self.merged_usages.values().any(|usage| {
            usage
                .dependers
                .get(root_conf)
                .is_some_and(|dds| dds.iter().any(|dd| dd.transitive))
        })
    }

    pub fn is_blacklisted(&self, root_conf: &str) -> bool {
        self.usage
            .blacklisted
            .get(root_conf)
            .is_some_and(|records| !records.is_empty())
    }

    pub fn blacklist_data(&self, root_conf: &str) -> Option<&Blacklist> {
        self.usage.blacklisted.get(root_conf).and_then(|records| records.last())
    }

    pub fn is_completely_blacklisted(&self) -> bool {
        self.root_confs().iter().all(|conf| self.is_blacklisted(conf))
    }

    /// The conf, or its fallback, expanded to the confs it stands for. The
    /// form `main(fallback)` uses the fallback when `main` is missing or private.
    pub fn real_confs(&self, conf: &str) -> Vec<String> {
        let Some(md) = &self.descriptor else {
            return vec![conf.to_owned()];
        };
        let (main, fallback) = split_fallback(conf);
        let usable = main
            .and_then(|main| md.configuration(main))
            .is_some_and(|c| c.visibility == Visibility::Public);
        let chosen = match (usable, main) {
            (true, Some(main)) => main,
            _ if fallback.is_empty() && main.is_some() => return vec![],
            _ => fallback,
        };
        if chosen.starts_with('*') {
            self.resolve_special(&[chosen.to_owned()])
        } else if chosen.contains(',') {
            chosen
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect()
        } else {
            vec![chosen.to_owned()]
        }
    }

    /// Expands `*` and `*!excluded!other` against the public confs once
    /// the descriptor is known.
    pub fn resolve_special(&self, confs: &[String]) -> Vec<String> {
        match (&self.descriptor, confs) {
            (Some(md), [conf]) if conf.starts_with('*') => {
                let public = md.public_configuration_names();
                if conf == "*" {
                    return public;
                }
                let excluded: Vec<&str> = conf.get(2..).unwrap_or_default().split('!').collect();
                public
                    .into_iter()
                    .filter(|c| !excluded.contains(&c.as_str()))
                    .collect()
            }
            _ => confs.to_vec(),
        }
    }

    /// The configuration `conf` names, falling back as in `main(fallback)`.
    pub fn configuration(&self, conf: &str) -> Option<&Configuration> {
        let md = self.descriptor.as_ref()?;
        let (main, fallback) = split_fallback(conf);
        main.and_then(|main| md.configuration(main))
            .or_else(|| md.configuration(fallback))
    }

    /// Confs `conf` extends, transitively, without `conf` itself.
    pub fn extended_confs(&self, conf: &str) -> Vec<String> {
        self.descriptor.as_ref().map_or_else(Vec::new, |md| {
            md.real_configurations(conf)
                .into_iter()
                .filter(|c| c != conf)
                .collect()
        })
    }

    /// True when `conf` lets dependencies be followed transitively.
    pub fn is_conf_transitive(&self, conf: &str) -> bool {
        self.descriptor
            .as_ref()
            .and_then(|md| md.configuration(conf))
            .map_or(true, |c| c.transitive)
    }

    pub fn add_caller(
        &mut self,
        root_conf: &str,
        caller_id: &ModuleRevisionId,
        caller_md: Option<&ModuleDescriptor>,
        caller_conf: &str,
        dependency_confs: &[String],
        dd: &DependencyDescriptor,
    ) {
        let callers = self.callers.entry(root_conf.to_owned()).or_default();
        let caller = callers.entry(caller_id.clone()).or_insert_with(|| Caller {
            mrid: caller_id.clone(),
            confs: IndexMap::new(),
            dd: dd.clone(),
            real: true,
        });
        let mut pending = vec![caller_conf.to_owned()];
        let mut seen = HashSet::new();
        while let Some(conf) = pending.pop() {
            if !seen.insert(conf.clone()) {
                continue;
            }
            let confs = caller.confs.entry(conf.clone()).or_default();
            for dependency_conf in dependency_confs {
                if !confs.contains(dependency_conf) {
                    confs.push(dependency_conf.clone());
                }
            }
            if let Some(configuration) = caller_md.and_then(|md| md.configuration(&conf)) {
                pending.extend(configuration.extends.iter().cloned());
            }
        }
    }

    /// Forgets every conflict decision taken under or about this node.
    pub fn clear_eviction(&mut self) {
        self.eviction = Eviction::default();
    }
}

/// Splits `main(fallback)`. Without parentheses the whole string is the fallback.
fn split_fallback(conf: &str) -> (Option<&str>, &str) {
    match conf.strip_suffix(')').and_then(|c| c.split_once('(')) {
        Some((main, fallback)) if !main.is_empty() => (Some(main), fallback),
        _ => (None, conf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn node() -> Node {
        let md = ModuleDescriptor::from_toml_str(
            r#"
organisation = "acme"
module = "util"
revision = "1.0"

[configurations]
default = {}
runtime = { extends = ["default"] }
test = { visibility = "private" }
"#,
            Some(Utc::now()),
        )
        .unwrap();
        let mut node = Node::new(md.mrid.clone());
        node.descriptor = Some(Arc::new(md));
        node
    }

    #[test]
    fn real_confs_use_fallback_for_private_or_missing() {
        let node = node();
        assert_eq!(node.real_confs("runtime"), vec!["runtime"]);
        assert_eq!(node.real_confs("test(default)"), vec!["default"]);
        assert_eq!(node.real_confs("missing(runtime)"), vec!["runtime"]);
        assert!(node.real_confs("missing()").is_empty());
        assert_eq!(node.real_confs("*"), vec!["default", "runtime"]);
        assert_eq!(node.real_confs("*!default"), vec!["runtime"]);
        assert_eq!(node.real_confs("default, runtime"), vec!["default", "runtime"]);
    }

    #[test]
    fn unloaded_node_keeps_conf_as_is() {
        let node = Node::new(ModuleRevisionId::of("acme", "util", "1.+"));
        assert_eq!(node.real_confs("*"), vec!["*"]);
        assert_eq!(node.resolved_id(), &ModuleRevisionId::of("acme", "util", "1.+"));
    }

    #[test]
    fn callers_include_extended_confs() {
        let mut util = node();
        let caller = node();
        let dd = DependencyDescriptor::new(caller.id.clone(), util.id.clone());
        util.add_caller(
            "default",
            &caller.id,
            caller.descriptor.as_deref(),
            "runtime",
            &["default".to_owned()],
            &dd,
        );
        let recorded = &util.callers["default"][&caller.id];
        assert_eq!(
            recorded.confs.keys().cloned().collect::<Vec<_>>(),
            vec!["runtime", "default"]
        );
    }

    #[test]
    fn merged_usage_only() {
        let mut util = node();
        let mut merged = Usage::default();
        merged.add_root_confs("default", &["runtime".to_owned()]);
        util.merged_usages.insert(7, merged);
        util.usage.add_root_confs("default", &["default".to_owned()]);

        assert!(util.conf_required_by_merged_usage_only("default", "runtime"));
        assert!(!util.conf_required_by_merged_usage_only("default", "default"));
        assert_eq!(
            util.confs("default").into_iter().collect::<Vec<_>>(),
            vec!["default", "runtime"]
        );
    }
}
