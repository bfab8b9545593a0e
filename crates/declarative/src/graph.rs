//! Desired-state graph: resources plus explicit ordering edges

use crate::error::{Error, Result};
use crate::resource::{Attributes, Identity, Resource};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Resources and the ordering constraints between them for one run
///
/// Resources keep their insertion order, which is also the tie-break for
/// resources that have no ordering constraint between them.
#[derive(Debug, Clone, Default)]
pub struct DesiredStateGraph {
    resources: Vec<Resource>,
    index: HashMap<Identity, usize>,
    /// `(before, after)` pairs of resource indices
    edges: BTreeSet<(usize, usize)>,
}

impl DesiredStateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource
    ///
    /// Declaring the same identity again with identical attributes is a
    /// no-op; with different attributes it is a [`Error::DuplicateIdentity`].
    pub fn define_resource(
        &mut self,
        identity: Identity,
        attributes: Attributes,
    ) -> Result<&Resource> {
        self.add(Resource::new(identity, attributes))
    }

    /// Register an already-built resource
    pub fn add(&mut self, resource: Resource) -> Result<&Resource> {
        resource.validate()?;

        if let Some(&existing) = self.index.get(&resource.identity) {
            if self.resources[existing].attributes != resource.attributes {
                return Err(Error::DuplicateIdentity {
                    identity: resource.identity,
                });
            }
            return Ok(&self.resources[existing]);
        }

        let position = self.resources.len();
        self.index.insert(resource.identity.clone(), position);
        self.resources.push(resource);
        Ok(&self.resources[position])
    }

    /// Require `before` to reach its terminal state before `after` starts
    pub fn add_edge(&mut self, before: &Identity, after: &Identity) -> Result<()> {
        let from = self.position(before)?;
        let to = self.position(after)?;
        self.edges.insert((from, to));
        Ok(())
    }

    fn position(&self, identity: &Identity) -> Result<usize> {
        self.index
            .get(identity)
            .copied()
            .ok_or_else(|| Error::UnknownIdentity {
                identity: identity.clone(),
            })
    }

    pub fn get(&self, identity: &Identity) -> Option<&Resource> {
        self.index.get(identity).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.index.contains_key(identity)
    }

    /// Resources in insertion order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every edge as `(before, after)` identities
    pub fn edges(&self) -> impl Iterator<Item = (&Identity, &Identity)> + '_ {
        self.edges.iter().map(|&(from, to)| {
            (
                &self.resources[from].identity,
                &self.resources[to].identity,
            )
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether a direct edge `before -> after` exists
    pub fn has_edge(&self, before: &Identity, after: &Identity) -> bool {
        match (self.index.get(before), self.index.get(after)) {
            (Some(&from), Some(&to)) => self.edges.contains(&(from, to)),
            _ => false,
        }
    }

    /// Direct predecessors of a resource
    pub fn predecessors(&self, identity: &Identity) -> Vec<&Identity> {
        let Some(&target) = self.index.get(identity) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|&&(_, to)| to == target)
            .map(|&(from, _)| &self.resources[from].identity)
            .collect()
    }

    /// Direct successors of a resource
    pub fn successors(&self, identity: &Identity) -> Vec<&Identity> {
        let Some(&source) = self.index.get(identity) else {
            return Vec::new();
        };
        self.edges
            .range((source, 0)..=(source, usize::MAX))
            .map(|&(_, to)| &self.resources[to].identity)
            .collect()
    }

    /// Whether `before` must finish before `after`, directly or transitively
    pub fn precedes(&self, before: &Identity, after: &Identity) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(before), self.index.get(after)) else {
            return false;
        };
        let adjacency = self.adjacency();
        let mut seen = vec![false; self.resources.len()];
        let mut stack = adjacency[from].clone();
        while let Some(next) = stack.pop() {
            if next == to {
                return true;
            }
            if !seen[next] {
                seen[next] = true;
                stack.extend(adjacency[next].iter().copied());
            }
        }
        false
    }

    /// Successor lists by resource index
    pub(crate) fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.resources.len()];
        for &(from, to) in &self.edges {
            adjacency[from].push(to);
        }
        adjacency
    }

    /// Resource indices in a valid application order
    ///
    /// Kahn's algorithm with the ready set ordered by insertion index, so
    /// unconstrained resources keep their declaration order.
    pub(crate) fn order_indices(&self) -> Result<Vec<usize>> {
        let count = self.resources.len();
        let adjacency = self.adjacency();
        let mut in_degree = vec![0usize; count];
        for &(_, to) in &self.edges {
            in_degree[to] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(count);

        while let Some(Reverse(next)) = ready.pop() {
            order.push(next);
            for &succ in &adjacency[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() == count {
            return Ok(order);
        }

        Err(Error::CycleDetected {
            identities: self
                .cycle_members(&in_degree)
                .into_iter()
                .map(|i| self.resources[i].identity.clone())
                .collect(),
        })
    }

    /// Unordered resources that also have unordered successors
    ///
    /// Nodes left over by Kahn's algorithm are either on a cycle or
    /// downstream of one; repeatedly pruning leftovers with no leftover
    /// successor leaves only the cycle members.
    fn cycle_members(&self, in_degree: &[usize]) -> Vec<usize> {
        let adjacency = self.adjacency();
        let mut remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        loop {
            let mut pruned = false;
            for node in 0..remaining.len() {
                if remaining[node] && !adjacency[node].iter().any(|&s| remaining[s]) {
                    remaining[node] = false;
                    pruned = true;
                }
            }
            if !pruned {
                break;
            }
        }
        (0..remaining.len()).filter(|&i| remaining[i]).collect()
    }

    /// Resources in a valid application order
    pub fn topological_order(&self) -> Result<Vec<&Resource>> {
        Ok(self
            .order_indices()?
            .into_iter()
            .map(|i| &self.resources[i])
            .collect())
    }

    /// Fail with the first configuration error, if any
    pub fn validate(&self) -> Result<()> {
        self.order_indices().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use crate::types::Ensure;

    fn dir(name: &str) -> Identity {
        Identity::new(ResourceKind::Directory, name)
    }

    fn graph_of(names: &[&str]) -> DesiredStateGraph {
        let mut graph = DesiredStateGraph::new();
        for name in names {
            graph
                .define_resource(dir(name), Attributes::new(Ensure::Directory))
                .unwrap();
        }
        graph
    }

    fn names(order: &[&Resource]) -> Vec<String> {
        order.iter().map(|r| r.name().to_string()).collect()
    }

    #[test]
    fn test_duplicate_identity_with_same_attributes_is_noop() {
        let mut graph = graph_of(&["/a"]);
        graph
            .define_resource(dir("/a"), Attributes::new(Ensure::Directory))
            .unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_duplicate_identity_with_different_attributes() {
        let mut graph = graph_of(&["/a"]);
        let err = graph
            .define_resource(dir("/a"), Attributes::new(Ensure::Directory).mode(0o700))
            .unwrap_err();
        assert_eq!(err, Error::DuplicateIdentity { identity: dir("/a") });
    }

    #[test]
    fn test_invalid_attributes_rejected_on_define() {
        let mut graph = DesiredStateGraph::new();
        let err = graph
            .define_resource(
                Identity::new(ResourceKind::File, "/x"),
                Attributes::new(Ensure::File),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributes { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_edge_to_unknown_identity() {
        let mut graph = graph_of(&["/a"]);
        let err = graph.add_edge(&dir("/a"), &dir("/missing")).unwrap_err();
        assert_eq!(
            err,
            Error::UnknownIdentity {
                identity: dir("/missing")
            }
        );
    }

    #[test]
    fn test_unconstrained_order_is_insertion_order() {
        let graph = graph_of(&["/c", "/a", "/b"]);
        let order = graph.topological_order().unwrap();
        assert_eq!(names(&order), vec!["/c", "/a", "/b"]);
    }

    #[test]
    fn test_edges_override_insertion_order() {
        let mut graph = graph_of(&["/c", "/a", "/b"]);
        graph.add_edge(&dir("/b"), &dir("/c")).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(names(&order), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_cycle_names_both_identities() {
        let mut graph = graph_of(&["/a", "/b", "/c"]);
        graph.add_edge(&dir("/a"), &dir("/b")).unwrap();
        graph.add_edge(&dir("/b"), &dir("/a")).unwrap();
        // downstream of the cycle but not on it
        graph.add_edge(&dir("/b"), &dir("/c")).unwrap();

        let err = graph.topological_order().unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                identities: vec![dir("/a"), dir("/b")]
            }
        );
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let mut graph = graph_of(&["/a"]);
        graph.add_edge(&dir("/a"), &dir("/a")).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_precedes_is_transitive() {
        let mut graph = graph_of(&["/a", "/b", "/c"]);
        graph.add_edge(&dir("/a"), &dir("/b")).unwrap();
        graph.add_edge(&dir("/b"), &dir("/c")).unwrap();

        assert!(graph.precedes(&dir("/a"), &dir("/c")));
        assert!(!graph.precedes(&dir("/c"), &dir("/a")));
        assert!(!graph.has_edge(&dir("/a"), &dir("/c")));
        assert_eq!(graph.successors(&dir("/a")), vec![&dir("/b")]);
        assert_eq!(graph.predecessors(&dir("/c")), vec![&dir("/b")]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = graph_of(&["/a", "/b"]);
        graph.add_edge(&dir("/a"), &dir("/b")).unwrap();
        graph.add_edge(&dir("/a"), &dir("/b")).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }
}
