//! # Declarative
//!
//! Desired-state graphs and an idempotent reconciler.
//!
//! ## Core Concepts
//!
//! - **Resource**: one unit of desired state, identified by `(kind, name)`
//! - **DesiredStateGraph**: resources plus explicit "before/after" edges
//! - **ExecutionPlan**: a validated graph with its application order fixed
//! - **Provider**: per-kind capability that probes and converges resources
//! - **Executor**: walks a plan with a bounded worker pool, probing each
//!   resource and applying only what differs
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     Attributes, DesiredStateGraph, Ensure, ExecuteOptions, ExecutionPlan, Identity,
//!     ResourceKind, SimulatedHost, execute_simple,
//! };
//!
//! let mut graph = DesiredStateGraph::new();
//! let home = Identity::new(ResourceKind::Directory, "/home/svc");
//! let key = Identity::new(ResourceKind::File, "/home/svc/key");
//! graph.define_resource(home.clone(), Attributes::new(Ensure::Directory))?;
//! graph.define_resource(key.clone(), Attributes::new(Ensure::File).content("k").mode(0o600))?;
//! graph.add_edge(&home, &key)?;
//!
//! let plan = ExecutionPlan::new(graph)?;
//! let host = SimulatedHost::new();
//! let report = execute_simple(&plan, &host, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`Provider`]: observes and converges one resource kind
//! - [`ProviderSet`]: maps kinds to providers for a target host
//! - [`ProgressCallback`]: receives progress updates from the dispatch loop
//!
//! Configuration errors ([`Error`]) are all raised while building the graph
//! or the plan, before any provider is called.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod harness;
pub mod planner;
pub mod resource;
pub mod simulated;
pub mod types;

use std::sync::{Mutex, MutexGuard};

// Re-export main types at crate root
pub use context::{ApplyContext, CancelToken, NoProgress, ProgressCallback};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, group_by_kind};
pub use error::{Error, Result};
pub use executor::{execute, execute_simple};
pub use graph::DesiredStateGraph;
pub use planner::ExecutionPlan;
pub use resource::{
    Attributes, Content, Identity, Provider, ProviderSet, Resource, ResourceKind, content_digest,
};
pub use simulated::SimulatedHost;
pub use types::{
    AppliedResult, ApplyResult, Ensure, ExecuteOptions, ExecuteSummary, FailureStage, Phase,
    ResourceState, RunReport,
};

/// Lock a mutex, recovering the data if a worker panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
