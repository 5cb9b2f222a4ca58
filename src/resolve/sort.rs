use std::collections::HashSet;

use indexmap::IndexMap;

use crate::resolve::{data::ResolveData, node::NodeRef};

/// Orders `nodes` so that every node comes after the nodes it depends on.
/// Cycles are broken where they are first met, and unrelated nodes keep
/// their input order.
pub(crate) fn least_dependent_first(data: &ResolveData, nodes: &[NodeRef]) -> Vec<NodeRef> {
    let mut dependencies: IndexMap<NodeRef, Vec<NodeRef>> =
        nodes.iter().map(|node| (*node, vec![])).collect();
    for node in nodes {
        for parent in data.node(*node).dds.keys() {
            let parent = data.real(*parent);
            if let Some(children) = dependencies.get_mut(&parent) {
                if !children.contains(node) {
                    children.push(*node);
                }
            }
        }
    }

    let mut sorted = Vec::with_capacity(nodes.len());
    let mut done = HashSet::new();
    let mut visiting = HashSet::new();
    for node in nodes {
        visit(*node, &dependencies, &mut visiting, &mut done, &mut sorted);
    }
    sorted
}

fn visit(
    node: NodeRef,
    dependencies: &IndexMap<NodeRef, Vec<NodeRef>>,
    visiting: &mut HashSet<NodeRef>,
    done: &mut HashSet<NodeRef>,
    sorted: &mut Vec<NodeRef>,
) {
    if done.contains(&node) || !visiting.insert(node) {
        return;
    }
    for dependency in dependencies.get(&node).into_iter().flatten() {
        visit(*dependency, dependencies, visiting, done, sorted);
    }
    visiting.remove(&node);
    done.insert(node);
    sorted.push(node);
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::{
        model::{DependencyDescriptor, ModuleRevisionId},
        resolve::node::Node,
    };

    fn depend(data: &mut ResolveData, parent: NodeRef, child: NodeRef) {
        let dd = DependencyDescriptor::new(
            data.node(parent).id.clone(),
            data.node(child).id.clone(),
        );
        data.node_mut(child).dds.insert(parent, dd);
    }

    #[test]
    fn dependencies_come_first() {
        let mut data = ResolveData::new(Node::new(ModuleRevisionId::of("acme", "app", "1.0")));
        let a = data.create(ModuleRevisionId::of("acme", "a", "1.0"));
        let b = data.create(ModuleRevisionId::of("acme", "b", "1.0"));
        let c = data.create(ModuleRevisionId::of("acme", "c", "1.0"));
        let unrelated = data.create(ModuleRevisionId::of("acme", "d", "1.0"));
        depend(&mut data, a, b);
        depend(&mut data, b, c);

        assert_eq!(
            least_dependent_first(&data, &[a, unrelated, b, c]),
            vec![c, b, a, unrelated]
        );
    }

    #[test]
    fn cycles_are_tolerated() {
        let mut data = ResolveData::new(Node::new(ModuleRevisionId::of("acme", "app", "1.0")));
        let a = data.create(ModuleRevisionId::of("acme", "a", "1.0"));
        let b = data.create(ModuleRevisionId::of("acme", "b", "1.0"));
        depend(&mut data, a, b);
        depend(&mut data, b, a);

        assert_eq!(least_dependent_first(&data, &[a, b]), vec![b, a]);
    }
}
