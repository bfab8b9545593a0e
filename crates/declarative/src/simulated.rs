//! In-memory target host for tests and previews
//!
//! [`SimulatedHost`] provides every resource kind and remembers the state
//! it converged each identity to, so repeated runs behave like repeated
//! runs against a real machine.

use crate::context::ApplyContext;
use crate::graph::DesiredStateGraph;
use crate::lock;
use crate::resource::{Identity, Provider, ProviderSet, Resource, ResourceKind};
use crate::types::{ApplyResult, ResourceState};
use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SimulatedHost {
    state: Mutex<HashMap<Identity, ResourceState>>,
    probe_failures: Mutex<HashSet<Identity>>,
    apply_failures: Mutex<HashSet<Identity>>,
    applied: Mutex<Vec<Identity>>,
    apply_delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every apply take at least `delay`
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    /// Make probing this identity fail
    pub fn fail_probe(&self, identity: Identity) {
        lock(&self.probe_failures).insert(identity);
    }

    /// Make applying this identity fail
    pub fn fail_apply(&self, identity: Identity) {
        lock(&self.apply_failures).insert(identity);
    }

    /// Mark every resource in the graph as already converged
    pub fn converge(&self, graph: &DesiredStateGraph) {
        let mut state = lock(&self.state);
        for resource in graph.resources() {
            state.insert(resource.identity.clone(), resource.desired_state());
        }
    }

    pub fn set_state(&self, identity: Identity, observed: ResourceState) {
        lock(&self.state).insert(identity, observed);
    }

    /// Current simulated state of an identity
    pub fn state_of(&self, identity: &Identity) -> ResourceState {
        lock(&self.state)
            .get(identity)
            .cloned()
            .unwrap_or(ResourceState::Absent)
    }

    /// Identities in the order their apply step ran
    pub fn applied(&self) -> Vec<Identity> {
        lock(&self.applied).clone()
    }

    pub fn apply_count(&self) -> usize {
        lock(&self.applied).len()
    }

    /// Highest number of applies that were running at the same time
    pub fn max_concurrent_applies(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Provider for SimulatedHost {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        if lock(&self.probe_failures).contains(&resource.identity) {
            bail!("simulated probe failure for {}", resource.identity);
        }
        Ok(self.state_of(&resource.identity))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        if !self.apply_delay.is_zero() {
            std::thread::sleep(self.apply_delay);
        }

        let outcome = if lock(&self.apply_failures).contains(&resource.identity) {
            Err(anyhow::anyhow!(
                "simulated apply failure for {}",
                resource.identity
            ))
        } else {
            let desired = resource.desired_state();
            let previous = lock(&self.state).insert(resource.identity.clone(), desired.clone());
            lock(&self.applied).push(resource.identity.clone());
            Ok(match (previous, desired) {
                (_, ResourceState::Absent) => ApplyResult::Removed,
                (None | Some(ResourceState::Absent), _) => ApplyResult::Created,
                _ => ApplyResult::Modified,
            })
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl ProviderSet for SimulatedHost {
    fn provider_for(&self, _kind: ResourceKind) -> Option<&dyn Provider> {
        Some(self)
    }
}
