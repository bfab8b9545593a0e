//! Diff computation for resources

use crate::planner::ExecutionPlan;
use crate::resource::{Identity, ProviderSet, Resource};
use crate::types::ResourceState;
use anyhow::{Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A diff between current and desired state of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Unique identifier of the resource
    pub identity: Identity,
    /// Human-readable description
    pub description: String,
    /// Current state
    pub current: ResourceState,
    /// Desired state
    pub desired: ResourceState,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    ///
    /// A probe error is reported as an `Unknown` current state rather than
    /// hidden, since it will fail the real run too.
    pub fn from_resource(resource: &Resource, providers: &dyn ProviderSet) -> Result<Option<Self>> {
        let provider = providers
            .provider_for(resource.kind())
            .ok_or_else(|| anyhow!("no provider registered for {} resources", resource.kind()))?;

        let desired = provider.desired_state(resource)?;
        let current = provider.probe(resource).unwrap_or_else(|e| {
            log::debug!("Probe of {} failed: {e:#}", resource.identity);
            ResourceState::Unknown
        });

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            identity: resource.identity.clone(),
            description: resource.description(),
            current,
            desired,
        }))
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Absent)
        )
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        !self.is_addition() && !self.is_removal()
    }
}

/// Compute diffs for every resource in a plan
///
/// Probes run in parallel; the result keeps plan order and only contains
/// resources that have differences between current and desired state.
pub fn compute_diffs(plan: &ExecutionPlan, providers: &dyn ProviderSet) -> Vec<ResourceDiff> {
    let resources: Vec<&Resource> = plan.resources().collect();
    resources
        .par_iter()
        .map(|r| match ResourceDiff::from_resource(r, providers) {
            Ok(diff) => diff,
            Err(e) => Some(ResourceDiff {
                identity: r.identity.clone(),
                description: format!("{} ({e:#})", r.description()),
                current: ResourceState::Unknown,
                desired: r.desired_state(),
            }),
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind, in kind order
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<&'static str, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<&'static str, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups
            .entry(diff.identity.kind.as_str())
            .or_default()
            .push(diff);
    }
    groups
}
