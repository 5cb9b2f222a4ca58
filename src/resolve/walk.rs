//! Depth first walk of the dependency graph for one root configuration.
//!
//! Each step works on the top of a path of visits from the root. Conflicts
//! are settled against every ancestor on that path, before the node is
//! loaded and again once its descriptor is known. A conflict manager asking
//! for a restart unwinds the whole walk back to the configuration loop.

use std::{collections::HashSet, sync::Arc, time::Instant};

use indexmap::IndexSet;

use crate::{
    conflict::{ConflictError, ConflictManager, ConflictOutcome, Restart},
    context::{Interrupted, Messages, ResolveContext},
    model::{ModuleId, ModuleRevisionId, Visibility},
    resolve::{
        data::{GraphView, ResolveData},
        node::{EvictionData, NodeRef},
        ResolveError,
    },
    resolver::ResolvedModuleRevision,
    version::VersionMatcher,
};

pub(crate) enum WalkError {
    Restart(Restart),
    Fatal(ResolveError),
}

impl From<ResolveError> for WalkError {
    fn from(error: ResolveError) -> Self {
        WalkError::Fatal(error)
    }
}

impl From<ConflictError> for WalkError {
    fn from(error: ConflictError) -> Self {
        WalkError::Fatal(ResolveError::Conflict(error))
    }
}

impl From<Interrupted> for WalkError {
    fn from(error: Interrupted) -> Self {
        WalkError::Fatal(ResolveError::Interrupted(error))
    }
}

type WalkResult<T> = Result<T, WalkError>;

#[derive(Debug, Clone)]
struct Visit {
    node: NodeRef,
    parent_conf: Option<String>,
    requested_conf: Option<String>,
}

pub(crate) struct Walker<'a> {
    data: &'a mut ResolveData,
    ctx: &'a ResolveContext,
    root_conf: String,
    transitive: bool,
    path: Vec<Visit>,
    fetched: HashSet<(ModuleRevisionId, String)>,
    circulars: HashSet<String>,
}

impl<'a> Walker<'a> {
    pub fn new(
        data: &'a mut ResolveData,
        ctx: &'a ResolveContext,
        root_conf: &str,
        transitive: bool,
    ) -> Self {
        let root = data.root();
        Self {
            data,
            ctx,
            root_conf: root_conf.to_owned(),
            transitive,
            path: vec![Visit {
                node: root,
                parent_conf: None,
                requested_conf: None,
            }],
            fetched: HashSet::new(),
            circulars: HashSet::new(),
        }
    }

    /// Resolves the root configuration, restarting as long as conflict
    /// managers blacklist something new.
    pub fn run(&mut self) -> Result<(), ResolveError> {
        let max_restarts = self.ctx.settings().max_restarts();
        let mut restarts = 0;
        loop {
            let blacklisted = self.data.blacklist_count();
            match self.walk() {
                Ok(()) => break,
                Err(WalkError::Fatal(error)) => return Err(error),
                Err(WalkError::Restart(restart)) => {
                    restarts += 1;
                    let messages = self.messages();
                    messages.verbose("====================================================");
                    messages.verbose("=           RESTARTING RESOLVE PROCESS");
                    messages.verbose(format!("= {}", restart.message));
                    messages.verbose("====================================================");
                    if restarts > max_restarts || self.data.blacklist_count() == blacklisted {
                        return Err(ResolveError::RestartLoop {
                            conf: self.root_conf.clone(),
                            restarts,
                        });
                    }
                    self.fetched.clear();
                }
            }
        }
        for node in self.data.real_nodes() {
            self.data.node_mut(node).confs_to_fetch.clear();
        }
        Ok(())
    }

    fn walk(&mut self) -> WalkResult<()> {
        let root = self.data.root();
        self.path = vec![Visit {
            node: root,
            parent_conf: None,
            requested_conf: Some(self.root_conf.clone()),
        }];
        let root_conf = self.root_conf.clone();
        self.data
            .node_mut(root)
            .confs_to_fetch
            .insert(root_conf.clone());
        self.fetch_dependencies(&root_conf, false)?;
        self.settle_undecided()
    }

    fn messages(&self) -> &Messages {
        self.ctx.messages()
    }

    fn matcher(&self) -> &dyn VersionMatcher {
        self.ctx.settings().version_matcher()
    }

    fn view(&self) -> GraphView<'_> {
        GraphView {
            data: &*self.data,
            ctx: self.ctx,
            root_conf: &self.root_conf,
        }
    }

    fn top(&self) -> usize {
        self.path.len() - 1
    }

    fn current(&self) -> NodeRef {
        self.path[self.top()].node
    }

    fn parent_at(&self, position: usize) -> Option<NodeRef> {
        position.checked_sub(1).map(|p| self.path[p].node)
    }

    fn parent(&self) -> Option<NodeRef> {
        self.parent_at(self.top())
    }

    fn parent_conf(&self) -> Option<String> {
        self.path[self.top()].parent_conf.clone()
    }

    fn label(&self, node: Option<NodeRef>) -> String {
        node.map_or_else(
            || "null".to_owned(),
            |n| self.data.resolved_id(n).to_string(),
        )
    }

    fn is_evicted(&self, node: NodeRef) -> bool {
        self.data.is_evicted(node, &self.root_conf)
    }

    /// Replaces the current visit with one of `node`, keeping its parent.
    fn goto<T>(
        &mut self,
        node: NodeRef,
        f: impl FnOnce(&mut Self) -> WalkResult<T>,
    ) -> WalkResult<T> {
        let top = self.top();
        let saved = self.path[top].clone();
        self.path[top] = Visit {
            node,
            parent_conf: saved.parent_conf.clone(),
            requested_conf: None,
        };
        let result = f(self);
        self.path.truncate(top + 1);
        self.path[top] = saved;
        result
    }

    /// Switches the current visit to the node this one was merged into.
    fn use_real_node(&mut self) {
        if self.path.len() > 1 {
            let top = self.top();
            self.path[top].node = self.data.real(self.path[top].node);
        }
    }

    /// A module appearing twice on the path is not walked again.
    fn is_circular(&self) -> bool {
        let node = self.current();
        let module_id = self.data.node(node).module_id();
        self.path[..self.top()]
            .iter()
            .any(|visit| self.data.node(visit.node).module_id() == module_id)
    }

    /// Whether dependencies of the current node are followed.
    fn is_transitive(&self) -> bool {
        let node = self.current();
        if self.data.is_root(node) {
            return true;
        }
        if !self.transitive {
            return false;
        }
        if let (Some(parent), Some(parent_conf)) = (self.parent(), self.parent_conf()) {
            if !self.data.node(parent).is_conf_transitive(&parent_conf) {
                return false;
            }
            if self
                .data
                .dependency_descriptor(node, parent)
                .is_some_and(|dd| dd.transitive)
            {
                return true;
            }
        }
        self.data
            .node(node)
            .has_merged_transitive_depender(&self.root_conf)
    }

    fn fetch_dependencies(&mut self, conf: &str, should_be_public: bool) -> WalkResult<()> {
        self.ctx.check_interrupted()?;
        let start = Instant::now();
        let node = self.current();
        match (self.parent(), self.parent_conf()) {
            (Some(parent), Some(parent_conf)) => self.messages().verbose(format!(
                "== resolving dependencies {}->{} [{}->{}]",
                self.label(Some(parent)),
                self.label(Some(node)),
                parent_conf,
                conf
            )),
            _ => self.messages().verbose(format!(
                "== resolving dependencies for {} [{}]",
                self.label(Some(node)),
                conf
            )),
        }

        if let Some(parent) = self.parent() {
            let direct_dynamic = self.data.is_root(parent)
                && self
                    .data
                    .dependency_descriptor(node, parent)
                    .is_some_and(|dd| self.matcher().is_dynamic(&dd.dependency));
            // Direct dynamic dependencies are settled once their revision is known.
            if !direct_dynamic {
                self.resolve_conflict(conf)?;
            }
        }

        if self.load_data(conf, should_be_public)? {
            self.resolve_conflict(conf)?;
            let node = self.current();
            if !self.is_evicted(node) && !self.is_circular() {
                for real_conf in self.data.node(node).real_confs(conf) {
                    self.do_fetch_dependencies(&real_conf)?;
                }
            }
        } else if !self.data.node(self.current()).has_problem() {
            // Loaded in another root conf or through another path.
            let node = self.current();
            if !self.is_evicted(node) && !self.is_circular() {
                for real_conf in self.data.node(node).real_confs(conf) {
                    self.do_fetch_dependencies(&real_conf)?;
                }
            }
        }

        let node = self.current();
        if self.is_evicted(node) {
            let selected = self
                .data
                .eviction_data(node, &self.root_conf)
                .and_then(|data| data.selected.clone())
                .unwrap_or_default();
            for selected in selected {
                let selected = self.data.real(selected);
                if self.data.node(selected).is_loaded() {
                    self.goto(selected, |walker| walker.fetch_dependencies(conf, true))?;
                } else {
                    self.data
                        .node_mut(selected)
                        .confs_to_fetch
                        .insert(conf.to_owned());
                }
            }
        }
        self.messages().debug(format!(
            "== resolving dependencies for {} [{}] took {}ms",
            self.label(Some(self.current())),
            conf,
            start.elapsed().as_millis()
        ));
        Ok(())
    }

    fn do_fetch_dependencies(&mut self, conf: &str) -> WalkResult<()> {
        let node = self.current();
        let Some(configuration) = self.data.node(node).configuration(conf).cloned() else {
            if !self
                .data
                .node(node)
                .conf_required_by_merged_usage_only(&self.root_conf, conf)
            {
                self.messages().warn(format!(
                    "configuration not found '{}' in {}: ignoring",
                    conf,
                    self.label(Some(node))
                ));
                if let Some(parent) = self.parent() {
                    self.messages().warn(format!(
                        "it was required from {}",
                        self.label(Some(parent))
                    ));
                }
            }
            return Ok(());
        };

        let top = self.top();
        let requested_was_set = self.path[top].requested_conf.is_some();
        if !requested_was_set {
            self.path[top].requested_conf = Some(conf.to_owned());
        }

        if !configuration.extends.is_empty() {
            self.data
                .node_mut(node)
                .confs_to_fetch
                .extend(configuration.extends.iter().cloned());
        }
        for extended in &configuration.extends {
            self.fetch_dependencies(extended, false)?;
        }

        let key = (self.data.resolved_id(node).clone(), conf.to_owned());
        if !self.fetched.contains(&key) && self.is_transitive() {
            let requested = self.path[top].requested_conf.clone();
            let dependencies = self.dependencies_of(node, &[conf.to_owned()], requested.as_deref());
            for dependency in dependencies {
                self.path.push(Visit {
                    node: dependency,
                    parent_conf: Some(conf.to_owned()),
                    requested_conf: None,
                });
                self.use_real_node();
                let child = self.current();
                let required: Vec<String> = self
                    .data
                    .node(child)
                    .required_confs(node, conf)
                    .into_iter()
                    .collect();
                for required_conf in &required {
                    self.fetch_dependencies(required_conf, true)?;
                }
                let child = self.current();
                if !self.is_evicted(child) && !self.data.node(child).has_problem() {
                    // Confs added while evicting another revision of this module.
                    let remaining: Vec<String> =
                        self.data.node(child).confs_to_fetch.iter().cloned().collect();
                    for remaining_conf in &remaining {
                        self.fetch_dependencies(remaining_conf, false)?;
                    }
                }
                self.path.truncate(top + 1);
            }
            self.fetched.insert(key);
        }

        if !requested_was_set {
            self.path[top].requested_conf = None;
        }
        Ok(())
    }

    /// Nodes `node` depends on in `confs`, created as needed, with their
    /// callers and required confs recorded.
    fn dependencies_of(
        &mut self,
        node: NodeRef,
        confs: &[String],
        requested_conf: Option<&str>,
    ) -> IndexSet<NodeRef> {
        let mut result = IndexSet::new();
        let Some(md) = self.data.node(node).descriptor.clone() else {
            return result;
        };
        let caller_id = self.data.resolved_id(node).clone();
        for conf in confs {
            let requested = requested_conf.unwrap_or(conf.as_str());
            let mut by_asked: Vec<(ModuleRevisionId, NodeRef)> = vec![];
            for dd in &md.dependencies {
                let dependency_confs = dd.dependency_configurations(conf);
                if dependency_confs.is_empty() {
                    continue;
                }
                let asked = &dd.dependency;
                if asked.module_id() == caller_id.module_id() {
                    self.messages().verbose(format!(
                        "a module is not authorized to depend on itself: {}",
                        asked
                    ));
                    continue;
                }
                let dependency = match by_asked
                    .iter()
                    .find(|(id, _)| id == asked)
                    .map(|(_, n)| *n)
                    .or_else(|| self.data.get(asked))
                {
                    Some(existing) => existing,
                    None => self.data.create(asked.clone()),
                };
                if self.path.iter().any(|visit| visit.node == dependency) {
                    self.report_circular(dependency);
                }

                let root_conf = self.root_conf.clone();
                let confs = self.data.node(dependency).resolve_special(&dependency_confs);
                let extended: Vec<String> = confs
                    .iter()
                    .flat_map(|c| self.data.node(dependency).extended_confs(c))
                    .collect();
                let target = self.data.node_mut(dependency);
                target.dds.entry(node).or_insert_with(|| dd.clone());
                target.confs_to_fetch.extend(confs.iter().cloned());
                target.usage.add_root_confs(&root_conf, confs.iter().chain(&extended));
                target.usage.add_required(node, conf, &confs);
                target.add_caller(&root_conf, &caller_id, Some(md.as_ref()), requested, &confs, dd);

                by_asked.push((asked.clone(), dependency));
                result.insert(dependency);
            }
        }
        result
    }

    fn report_circular(&mut self, node: NodeRef) {
        let mut ids: Vec<String> = self
            .path
            .iter()
            .map(|visit| self.data.node(visit.node).id.to_string())
            .collect();
        ids.push(self.data.node(node).id.to_string());
        let cycle = ids.join("->");
        if self.circulars.insert(cycle.clone()) {
            self.messages()
                .warn(format!("circular dependency found: {}", cycle));
        }
    }

    // --- loading ---

    fn load_data(&mut self, conf: &str, should_be_public: bool) -> WalkResult<bool> {
        let node = self.current();
        let parent = self.parent();
        let parent_conf = self.parent_conf();
        let loaded =
            self.load_node_data(node, parent, parent_conf.as_deref(), conf, should_be_public)?;
        if loaded {
            self.use_real_node();
            let node = self.current();
            let resolved = self.data.resolved_id(node).clone();
            if self.data.get(&resolved).is_none() {
                self.data.register(resolved, node);
            }
        }
        Ok(loaded)
    }

    fn load_node_data(
        &mut self,
        node: NodeRef,
        parent: Option<NodeRef>,
        parent_conf: Option<&str>,
        conf: &str,
        should_be_public: bool,
    ) -> WalkResult<bool> {
        let root_conf = self.root_conf.clone();
        self.messages().debug(format!(
            "loadData of {} of rootConf={}",
            self.label(Some(node)),
            root_conf
        ));
        let mut loaded = false;
        let state = self.data.node(node);
        if state.has_problem() {
            self.messages().debug("Node has problem.  Skip loading");
        } else if self.is_evicted(node) {
            self.messages().debug(format!(
                "{} is evicted.  Skip loading",
                self.label(Some(node))
            ));
        } else if state.confs_to_fetch.is_empty() && state.loaded_root_confs.contains(&root_conf) {
            self.messages().debug(format!(
                "{} has no new confs to load. Skip loading",
                self.label(Some(node))
            ));
        } else {
            self.data
                .node_mut(node)
                .loaded_root_confs
                .insert(root_conf.clone());
            if self.data.node(node).is_loaded() {
                loaded = true;
            } else {
                match self.find_module(node, parent)? {
                    None => return Ok(false),
                    Some(module) => {
                        let asked = self.data.node(node).id.clone();
                        if &asked != module.id() {
                            if let Some(resolved) = self.data.get(module.id()).filter(|r| *r != node) {
                                self.data.node_mut(node).descriptor = Some(module.descriptor.clone());
                                if !self.handle_configuration(
                                    node,
                                    false,
                                    parent,
                                    parent_conf,
                                    conf,
                                    should_be_public,
                                ) {
                                    return Ok(false);
                                }
                                self.move_to_real_node(
                                    node,
                                    resolved,
                                    module,
                                    parent,
                                    parent_conf,
                                    conf,
                                    should_be_public,
                                )?;
                                return Ok(true);
                            }
                            let mut line = format!("\t[{}] {}", module.id().revision(), asked);
                            if !self.matcher().is_dynamic(&asked) {
                                line.push_str(" (forced)");
                            }
                            self.messages().verbose(line);
                        }
                        let required: Vec<String> = match (parent, parent_conf) {
                            (Some(parent), Some(parent_conf)) => self
                                .data
                                .node(node)
                                .required_confs(parent, parent_conf)
                                .into_iter()
                                .collect(),
                            _ => vec![],
                        };
                        let state = self.data.node_mut(node);
                        state.downloaded = module.downloaded;
                        state.searched = module.searched;
                        state.descriptor = Some(module.descriptor.clone());
                        state.module = Some(module);
                        state.confs_to_fetch.shift_remove("*");
                        let special = state.resolve_special(&required);
                        state.confs_to_fetch.extend(special);
                        loaded = true;
                    }
                }
            }
        }

        if !self.handle_configuration(node, loaded, parent, parent_conf, conf, should_be_public) {
            return Ok(false);
        }
        if self.data.node(node).has_problem() {
            self.messages().debug(format!(
                "problem : {}",
                self.data.node(node).problem.as_deref().unwrap_or_default()
            ));
            return Ok(false);
        }
        if let Some(parent) = parent {
            if let Some(dd) = self.data.dependency_descriptor(node, parent).cloned() {
                self.data.node_mut(node).usage.add_depender(&root_conf, &dd);
            }
        }
        Ok(loaded)
    }

    /// Asks the resolver in charge for the descriptor of `node`, recording a
    /// problem on the node when none is found.
    fn find_module(
        &mut self,
        node: NodeRef,
        parent: Option<NodeRef>,
    ) -> WalkResult<Option<ResolvedModuleRevision>> {
        let asked = self.data.node(node).id.clone();
        let Some(resolver) = self.ctx.settings().resolver(asked.module_id()) else {
            let problem = format!("no resolver found for {}: check your configuration", asked.module_id());
            self.messages().error(problem.clone());
            self.data.node_mut(node).problem = Some(problem);
            return Ok(None);
        };
        let Some(dd) = parent
            .and_then(|parent| self.data.dependency_descriptor(node, parent))
            .cloned()
        else {
            self.data.node_mut(node).problem = Some(format!("no dependency descriptor for {}", asked));
            return Ok(None);
        };
        self.messages()
            .debug(format!("\tusing {} to resolve {}", resolver.name(), asked));
        let found = resolver.find_module(&dd, &self.view());
        match found {
            Err(ResolveError::Interrupted(interrupted)) => Err(interrupted.into()),
            Err(ResolveError::Conflict(conflict)) => Err(conflict.into()),
            Err(error) => {
                self.messages()
                    .debug(format!("Unexpected error while resolving {}: {}", asked, error));
                self.data.node_mut(node).problem = Some(error.to_string());
                Ok(None)
            }
            Ok(None) => {
                self.messages().warn(format!("\tmodule not found: {}", asked));
                self.data.node_mut(node).problem = Some("not found".to_owned());
                Ok(None)
            }
            Ok(Some(module)) => {
                self.messages().verbose(format!(
                    "\tfound {} in {}",
                    module.id(),
                    module.artifact_resolver
                ));
                let matcher = self.matcher();
                if matcher.is_dynamic(&asked) && matcher.is_dynamic(module.id()) {
                    let problem = format!(
                        "impossible to resolve dynamic revision for {}: check your configuration and make sure revision is part of your pattern",
                        asked
                    );
                    self.messages().error(problem.clone());
                    self.data.node_mut(node).problem = Some(problem);
                    return Ok(None);
                }
                Ok(Some(module))
            }
        }
    }

    /// `node` resolved to a revision already in the graph: fold it into that
    /// node and let the index point there.
    #[allow(clippy::too_many_arguments)]
    fn move_to_real_node(
        &mut self,
        node: NodeRef,
        resolved: NodeRef,
        module: ResolvedModuleRevision,
        parent: Option<NodeRef>,
        parent_conf: Option<&str>,
        conf: &str,
        should_be_public: bool,
    ) -> WalkResult<()> {
        let root_conf = self.root_conf.clone();
        let discarded = self.data.node(node).clone();
        {
            let target = self.data.node_mut(resolved);
            if target.descriptor.is_none() {
                target.descriptor = Some(module.descriptor.clone());
            }
            target.downloaded |= module.downloaded;
            target.searched |= module.searched;
            if target.module.is_none() {
                target.module = Some(module.clone());
            }
            for (parent, dd) in &discarded.dds {
                target.dds.entry(*parent).or_insert_with(|| dd.clone());
            }
            if let Some(callers) = discarded.callers.get(&root_conf) {
                let known = target.callers.entry(root_conf.clone()).or_default();
                for (mrid, caller) in callers {
                    known.entry(mrid.clone()).or_insert_with(|| caller.clone());
                }
            }
            target.usage.merge_root_conf(&discarded.usage, &root_conf);
            for usage in discarded.merged_usages.values() {
                target.usage.merge_root_conf(usage, &root_conf);
            }
            target.confs_to_fetch.extend(discarded.fetched_confs.iter().cloned());
            target.confs_to_fetch.extend(discarded.confs_to_fetch.iter().cloned());
        }
        self.data.register(discarded.id.clone(), resolved);
        self.load_node_data(resolved, parent, parent_conf, conf, should_be_public)?;
        self.messages().verbose(format!(
            "\t[{}] {}",
            module.id().revision(),
            discarded.id
        ));
        Ok(())
    }

    /// Records the confs of `node` used in the current root conf, failing
    /// the node when one is missing or not public.
    fn handle_configuration(
        &mut self,
        node: NodeRef,
        loaded: bool,
        parent: Option<NodeRef>,
        parent_conf: Option<&str>,
        conf: &str,
        should_be_public: bool,
    ) -> bool {
        let Some(md) = self.data.node(node).descriptor.clone() else {
            return true;
        };
        let root_conf = self.root_conf.clone();
        let is_root = self.data.is_root(node);
        let confs = self.data.node(node).real_confs(conf);
        let extended: Vec<String> = confs
            .iter()
            .flat_map(|c| md.real_configurations(c))
            .collect();
        self.data
            .node_mut(node)
            .usage
            .add_root_confs(&root_conf, confs.iter().chain(&extended));

        let required_from = format!("{} {}", self.label(parent), parent_conf.unwrap_or("null"));
        for real_conf in &confs {
            let problem = match md.configuration(real_conf) {
                None => {
                    self.data.node_mut(node).confs_to_fetch.shift_remove(conf);
                    if self
                        .data
                        .node(node)
                        .conf_required_by_merged_usage_only(&root_conf, conf)
                    {
                        self.messages().verbose(format!(
                            "configuration required by evicted revision is not available in selected revision. skipping {} in {}",
                            conf,
                            self.label(Some(node))
                        ));
                        None
                    } else if conf != real_conf {
                        Some(format!(
                            "configuration not found in {}: '{}'. Missing configuration: '{}'. It was required from {}",
                            self.label(Some(node)),
                            conf,
                            real_conf,
                            required_from
                        ))
                    } else {
                        Some(format!(
                            "configuration not found in {}: '{}'. It was required from {}",
                            self.label(Some(node)),
                            real_conf,
                            required_from
                        ))
                    }
                }
                Some(c) if should_be_public && !is_root && c.visibility != Visibility::Public => {
                    self.data.node_mut(node).confs_to_fetch.shift_remove(conf);
                    if self
                        .data
                        .node(node)
                        .conf_required_by_merged_usage_only(&root_conf, conf)
                    {
                        self.messages().verbose(format!(
                            "configuration required by evicted revision is not visible in selected revision. skipping {} in {}",
                            conf,
                            self.label(Some(node))
                        ));
                        None
                    } else {
                        Some(format!(
                            "configuration not public in {}: '{}'. It was required from {}",
                            self.label(Some(node)),
                            c.name,
                            required_from
                        ))
                    }
                }
                Some(_) => continue,
            };
            if let Some(problem) = problem {
                self.data.node_mut(node).problem = Some(problem);
            }
            return false;
        }
        if loaded {
            let state = self.data.node_mut(node);
            state.fetched_confs.insert(conf.to_owned());
            for real_conf in &confs {
                state.confs_to_fetch.shift_remove(real_conf);
            }
            state.confs_to_fetch.shift_remove(conf);
        }
        true
    }

    // --- conflicts ---

    fn resolve_conflict(&mut self, conf: &str) -> WalkResult<bool> {
        let top = self.top();
        self.resolve_conflict_in(top.checked_sub(1), conf, IndexSet::new())
    }

    /// Settles the conflicts of the current node with the dependencies of
    /// the ancestor at `ancestor` on the path, then of every ancestor above.
    fn resolve_conflict_in(
        &mut self,
        ancestor: Option<usize>,
        conf: &str,
        mut toevict: IndexSet<NodeRef>,
    ) -> WalkResult<bool> {
        let Some(position) = ancestor else {
            return Ok(true);
        };
        let node = self.current();
        let ancestor_node = self.path[position].node;
        if node == ancestor_node {
            return Ok(true);
        }
        let root_conf = self.root_conf.clone();
        let mid = self.data.node(node).module_id().clone();
        let resolved_id = self.data.resolved_id(node).clone();
        let debug = self.ctx.settings().debug_conflict_resolution();

        if self
            .data
            .evicted_revisions(ancestor_node, &mid, &root_conf)
            .contains(&resolved_id)
        {
            if debug {
                self.messages().debug(format!(
                    "conflict resolution already done for {} in {}",
                    resolved_id,
                    self.label(Some(ancestor_node))
                ));
            }
            return Ok(true);
        }

        if self
            .data
            .resolved_revisions(ancestor_node, &mid, &root_conf)
            .contains(&resolved_id)
        {
            if debug {
                self.messages().debug(format!(
                    "conflict resolution already done for {} in {}",
                    resolved_id,
                    self.label(Some(ancestor_node))
                ));
            }
            if !self.resolve_conflict_in(position.checked_sub(1), conf, toevict)? {
                return Ok(false);
            }
            self.check_evicted_in_root(node, ancestor_node, &mid);
            return Ok(true);
        }

        let mut resolved_nodes = self.data.selected_nodes(ancestor_node, &mid, &root_conf);
        resolved_nodes.extend(self.data.pending_conflicts(ancestor_node, &mid, &root_conf));
        let conflicts = self.compute_conflicts(node, position, &toevict, &mut resolved_nodes);

        let manager = self.ctx.settings().conflict_manager(&mid);
        let resolved = match self.resolve_conflicts(node, position, &conflicts, &manager)? {
            Some(resolved) => resolved,
            None => {
                if debug {
                    self.messages().debug(format!(
                        "impossible to resolve conflicts for {} in {} yet",
                        resolved_id,
                        self.label(Some(ancestor_node))
                    ));
                }
                self.messages().debug(format!(
                    "setting all nodes as pending conflicts for later conflict resolution: {}",
                    self.labels(&conflicts)
                ));
                self.data
                    .set_pending_conflicts(ancestor_node, &mid, &root_conf, conflicts);
                return Ok(false);
            }
        };
        if debug {
            self.messages().debug(format!(
                "selected revisions for {} in {}: {}",
                resolved_id,
                self.label(Some(ancestor_node)),
                self.labels(&resolved)
            ));
        }

        if resolved.contains(&node) {
            let toevict: IndexSet<NodeRef> = resolved_nodes
                .into_iter()
                .filter(|n| !resolved.contains(n))
                .collect();
            for evicted in &toevict {
                self.data.mark_evicted(
                    *evicted,
                    &root_conf,
                    EvictionData {
                        parent: Some(ancestor_node),
                        conflict_manager: Some(manager.name().to_owned()),
                        selected: Some(resolved.iter().copied().collect()),
                        detail: None,
                    },
                );
                if debug {
                    self.messages().debug(format!(
                        "evicting {} by {}",
                        self.label(Some(*evicted)),
                        self.labels(&resolved)
                    ));
                }
            }
            self.data
                .set_selected_nodes(ancestor_node, &mid, &root_conf, resolved.clone());
            let mut evicted: IndexSet<NodeRef> = self
                .data
                .evicted_nodes(ancestor_node, &mid, &root_conf)
                .into_iter()
                .filter(|n| !resolved.contains(n))
                .collect();
            evicted.extend(toevict.iter().copied());
            self.data
                .set_evicted_nodes(ancestor_node, &mid, &root_conf, evicted);
            self.data
                .set_pending_conflicts(ancestor_node, &mid, &root_conf, IndexSet::new());
            self.resolve_conflict_in(position.checked_sub(1), conf, toevict)
        } else {
            if resolved.is_empty() && debug {
                self.messages().verbose(format!(
                    "conflict manager '{}' evicted all revisions among {}",
                    manager.name(),
                    self.labels(&conflicts)
                ));
            }
            toevict.retain(|n| !resolved.contains(n));
            let mut evicted: IndexSet<NodeRef> = self
                .data
                .evicted_nodes(ancestor_node, &mid, &root_conf)
                .into_iter()
                .filter(|n| !resolved.contains(n))
                .collect();
            evicted.extend(toevict.iter().copied());
            evicted.insert(node);
            self.data
                .set_evicted_nodes(ancestor_node, &mid, &root_conf, evicted);
            self.data
                .set_pending_conflicts(ancestor_node, &mid, &root_conf, IndexSet::new());
            self.data.mark_evicted(
                node,
                &root_conf,
                EvictionData {
                    parent: Some(ancestor_node),
                    conflict_manager: Some(manager.name().to_owned()),
                    selected: Some(resolved.iter().copied().collect()),
                    detail: None,
                },
            );
            if debug {
                self.messages().debug(format!(
                    "evicting {} by {}",
                    resolved_id,
                    self.labels(&resolved)
                ));
            }

            let previous = self.data.selected_nodes(ancestor_node, &mid, &root_conf);
            let mut solved = true;
            if previous != resolved {
                self.data
                    .set_selected_nodes(ancestor_node, &mid, &root_conf, resolved.clone());
                for selected in resolved.iter().filter(|s| !previous.contains(*s)) {
                    let toevict = toevict.clone();
                    solved &= self.goto(*selected, |walker| {
                        walker.resolve_conflict_in(position.checked_sub(1), conf, toevict)
                    })?;
                }
            }
            Ok(solved)
        }
    }

    /// Once every ancestor agreed on `node`, it may still have lost in the
    /// root: carry that eviction over.
    fn check_evicted_in_root(&mut self, node: NodeRef, ancestor: NodeRef, mid: &ModuleId) {
        let root = self.data.root();
        let root_conf = self.root_conf.clone();
        let selected = self.data.selected_nodes(root, mid, &root_conf);
        let resolved_id = self.data.resolved_id(node);
        if selected
            .iter()
            .any(|s| self.data.resolved_id(*s) == resolved_id)
        {
            return;
        }
        let data = EvictionData {
            parent: Some(ancestor),
            conflict_manager: Some(self.ctx.settings().conflict_manager(mid).name().to_owned()),
            selected: Some(selected.into_iter().collect()),
            detail: None,
        };
        if self.ctx.settings().debug_conflict_resolution() {
            self.messages().debug(format!(
                "{} was previously evicted in root module conf {}",
                self.label(Some(node)),
                root_conf
            ));
        }
        self.data.mark_evicted(node, &root_conf, data);
    }

    fn compute_conflicts(
        &mut self,
        node: NodeRef,
        position: usize,
        toevict: &IndexSet<NodeRef>,
        selected: &mut IndexSet<NodeRef>,
    ) -> IndexSet<NodeRef> {
        let root_conf = self.root_conf.clone();
        let mid = self.data.node(node).module_id().clone();
        let ancestor = self.path[position].node;
        let parent_position = self.top() - 1;
        let parent = self.path[parent_position].node;

        let mut conflicts = IndexSet::new();
        conflicts.insert(node);
        let before = selected.len();
        selected.retain(|n| !toevict.contains(n));
        let evicted_in_selected = selected.len() != before;

        if evicted_in_selected || (selected.is_empty() && parent != ancestor) {
            let confs: Vec<String> = self.data.node(ancestor).confs(&root_conf).into_iter().collect();
            let requested = self.path[position].requested_conf.clone();
            for dependency in self.dependencies_of(ancestor, &confs, requested.as_deref()) {
                if self.data.node(dependency).module_id() == &mid {
                    conflicts.insert(dependency);
                }
                conflicts.extend(self.data.selected_nodes(dependency, &mid, &root_conf));
            }
        } else if selected.is_empty() {
            let confs: Vec<String> = self.data.node(parent).confs(&root_conf).into_iter().collect();
            let requested = self.path[parent_position].requested_conf.clone();
            for dependency in self.dependencies_of(parent, &confs, requested.as_deref()) {
                if self.data.node(dependency).module_id() == &mid {
                    conflicts.insert(dependency);
                }
            }
        } else {
            conflicts.extend(selected.iter().copied());
        }
        conflicts
            .into_iter()
            .map(|n| self.data.real(n))
            .collect()
    }

    /// `None` while the manager cannot decide yet.
    fn resolve_conflicts(
        &mut self,
        node: NodeRef,
        position: usize,
        conflicts: &IndexSet<NodeRef>,
        manager: &Arc<dyn ConflictManager>,
    ) -> WalkResult<Option<IndexSet<NodeRef>>> {
        let root_conf = self.root_conf.clone();
        let mid = self.data.node(node).module_id().clone();
        let ancestor = self.path[position].node;
        let parent_position = self.top() - 1;
        let debug = self.ctx.settings().debug_conflict_resolution();

        let default_manager = Arc::ptr_eq(manager, self.ctx.settings().default_conflict_manager());
        if parent_position != position
            && default_manager
            && &self
                .data
                .selected_nodes(self.path[parent_position].node, &mid, &root_conf)
                == conflicts
        {
            if debug {
                self.messages().debug(format!(
                    "no new conflicting revisions for {} in {}: {}",
                    self.label(Some(node)),
                    self.label(Some(ancestor)),
                    self.labels(conflicts)
                ));
            }
            return Ok(Some(conflicts.clone()));
        }
        if debug {
            self.messages().debug(format!(
                "found conflicting revisions for {} in {}: {}",
                self.label(Some(node)),
                self.label(Some(ancestor)),
                self.labels(conflicts)
            ));
        }
        let ids: Vec<ModuleRevisionId> = conflicts
            .iter()
            .map(|n| self.data.resolved_id(*n).clone())
            .collect();
        let ancestor_id = self.data.resolved_id(ancestor).clone();
        let outcome = manager.resolve_conflicts(&ancestor_id, &ids, &self.view())?;
        match outcome {
            ConflictOutcome::Resolved(kept) => Ok(Some(self.nodes_for(conflicts, &kept))),
            ConflictOutcome::Deferred => Ok(None),
            ConflictOutcome::Restart(restart) => {
                Err(self.restart(restart, ancestor, manager.name()))
            }
        }
    }

    /// Maps the ids kept by a manager back to the candidate nodes.
    fn nodes_for(&self, candidates: &IndexSet<NodeRef>, kept: &[ModuleRevisionId]) -> IndexSet<NodeRef> {
        candidates
            .iter()
            .copied()
            .filter(|n| kept.contains(self.data.resolved_id(*n)))
            .collect()
    }

    /// Applies the blacklist records of a restart, and the eviction that
    /// motivated them, before unwinding the walk.
    fn restart(&mut self, restart: Restart, ancestor: NodeRef, manager: &str) -> WalkError {
        for record in &restart.blacklist {
            if let Some(node) = self.data.get(&record.blacklisted) {
                self.messages()
                    .verbose(format!("blacklisting {}", record));
                self.data.blacklist(node, record.clone());
            }
        }
        if let (Some(evicted), Some(selected)) =
            (self.data.get(&restart.evicted), self.data.get(&restart.selected))
        {
            let root_conf = self.root_conf.clone();
            self.data.mark_evicted(
                evicted,
                &root_conf,
                EvictionData {
                    parent: Some(ancestor),
                    conflict_manager: Some(manager.to_owned()),
                    selected: Some(vec![selected]),
                    detail: Some(restart.detail.clone()),
                },
            );
        }
        WalkError::Restart(restart)
    }

    /// Last chance for conflicts that stayed pending through the walk: ask
    /// once more, and keep every candidate when still undecided.
    fn settle_undecided(&mut self) -> WalkResult<()> {
        let root_conf = self.root_conf.clone();
        for (ancestor, mid) in self.data.undecided(&root_conf) {
            let pending = self.data.pending_conflicts(ancestor, &mid, &root_conf);
            if pending.is_empty() {
                continue;
            }
            let manager = self.ctx.settings().conflict_manager(&mid);
            let ids: Vec<ModuleRevisionId> = pending
                .iter()
                .map(|n| self.data.resolved_id(*n).clone())
                .collect();
            let ancestor_id = self.data.resolved_id(ancestor).clone();
            let outcome = manager.resolve_conflicts(&ancestor_id, &ids, &self.view())?;
            let kept = match outcome {
                ConflictOutcome::Resolved(kept) => self.nodes_for(&pending, &kept),
                ConflictOutcome::Deferred => {
                    self.messages().warn(format!(
                        "impossible to decide between {} in {}: keeping all of them",
                        self.labels(&pending),
                        ancestor_id
                    ));
                    pending.clone()
                }
                ConflictOutcome::Restart(restart) => {
                    return Err(self.restart(restart, ancestor, manager.name()))
                }
            };
            let losers: IndexSet<NodeRef> =
                pending.iter().copied().filter(|n| !kept.contains(n)).collect();
            for loser in &losers {
                self.data.mark_evicted(
                    *loser,
                    &root_conf,
                    EvictionData {
                        parent: Some(ancestor),
                        conflict_manager: Some(manager.name().to_owned()),
                        selected: Some(kept.iter().copied().collect()),
                        detail: None,
                    },
                );
            }
            let mut selected: IndexSet<NodeRef> = self
                .data
                .selected_nodes(ancestor, &mid, &root_conf)
                .into_iter()
                .filter(|n| !losers.contains(n))
                .collect();
            selected.extend(kept.iter().copied());
            self.data
                .set_selected_nodes(ancestor, &mid, &root_conf, selected);
            let mut evicted: IndexSet<NodeRef> = self
                .data
                .evicted_nodes(ancestor, &mid, &root_conf)
                .into_iter()
                .filter(|n| !kept.contains(n))
                .collect();
            evicted.extend(losers);
            self.data
                .set_evicted_nodes(ancestor, &mid, &root_conf, evicted);
            self.data
                .set_pending_conflicts(ancestor, &mid, &root_conf, IndexSet::new());
        }
        Ok(())
    }

    fn labels(&self, nodes: &IndexSet<NodeRef>) -> String {
        let labels: Vec<String> = nodes.iter().map(|n| self.label(Some(*n))).collect();
        format!("[{}]", labels.join(", "))
    }
}
