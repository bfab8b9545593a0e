//! Execution planner - turns a graph into a validated, ordered plan

use crate::error::Result;
use crate::graph::DesiredStateGraph;
use crate::resource::{Resource, ResourceKind};

/// A validated graph with its application order fixed
///
/// The only way to build one is through [`ExecutionPlan::new`], so anything
/// that executes a plan knows the graph passed every configuration check.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    graph: DesiredStateGraph,
    /// Graph indices in application order
    order: Vec<usize>,
}

impl ExecutionPlan {
    /// Validate the graph and fix its order
    pub fn new(graph: DesiredStateGraph) -> Result<Self> {
        let order = graph.order_indices()?;
        Ok(Self { graph, order })
    }

    pub fn graph(&self) -> &DesiredStateGraph {
        &self.graph
    }

    /// Resources in application order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.order.iter().map(|&i| &self.graph.resources()[i])
    }

    /// Resource at a plan position
    pub fn resource_at(&self, position: usize) -> &Resource {
        &self.graph.resources()[self.order[position]]
    }

    /// Total number of resources in the plan
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Predecessor and successor lists keyed by plan position
    pub(crate) fn links(&self) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let mut position_of = vec![0; self.order.len()];
        for (position, &index) in self.order.iter().enumerate() {
            position_of[index] = position;
        }

        let mut predecessors = vec![Vec::new(); self.order.len()];
        let mut successors = vec![Vec::new(); self.order.len()];
        for (index, targets) in self.graph.adjacency().into_iter().enumerate() {
            for target in targets {
                predecessors[position_of[target]].push(position_of[index]);
                successors[position_of[index]].push(position_of[target]);
            }
        }
        (predecessors, successors)
    }

    /// Restrict the plan to resources matching a target pattern
    ///
    /// Target format: `kind` or `kind:name` (name matches as a substring).
    /// Every transitive dependency of a selected resource is kept as well,
    /// so a filtered plan never runs a resource ahead of its requirements.
    pub fn filter_by_target(self, target: Option<&str>) -> Result<Self> {
        let Some(target) = target else {
            return Ok(self);
        };
        let (kind, name) = parse_target(target);

        let resources = self.graph.resources();
        let mut keep = vec![false; resources.len()];
        for (index, resource) in resources.iter().enumerate() {
            if matches_filter(resource, kind.as_deref(), name.as_deref()) {
                keep[index] = true;
            }
        }

        // Walk dependencies backwards from the selection
        for &index in self.order.iter().rev() {
            if !keep[index] {
                continue;
            }
            for predecessor in self.graph.predecessors(&resources[index].identity) {
                if let Some(position) = resources.iter().position(|r| &r.identity == predecessor) {
                    keep[position] = true;
                }
            }
        }

        let mut filtered = DesiredStateGraph::new();
        for (index, resource) in resources.iter().enumerate() {
            if keep[index] {
                filtered.add(resource.clone())?;
            }
        }
        for (before, after) in self.graph.edges() {
            if filtered.contains(before) && filtered.contains(after) {
                filtered.add_edge(before, after)?;
            }
        }

        Self::new(filtered)
    }
}

/// Parse a target string like "kind:name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once(':') {
        Some((kind, name)) => (Some(kind.to_string()), Some(name.to_string())),
        None if is_kind_filter(target) => (Some(target.to_string()), None),
        None => (None, Some(target.to_string())),
    }
}

fn is_kind_filter(candidate: &str) -> bool {
    ResourceKind::parse(candidate).is_some()
        || matches!(candidate, "packages" | "repos" | "files")
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &Resource, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind {
        // Allow common aliases
        let matches_kind = match k {
            "packages" => matches!(
                resource.kind(),
                ResourceKind::Package | ResourceKind::PipPackage
            ),
            "repos" => resource.kind() == ResourceKind::VcsRepo,
            "files" => matches!(
                resource.kind(),
                ResourceKind::File | ResourceKind::Directory
            ),
            _ => resource.kind().as_str() == k,
        };
        if !matches_kind {
            return false;
        }
    }

    if let Some(n) = name
        && !resource.name().contains(n)
    {
        return false;
    }

    true
}
