//! Apply context and callback traits
//!
//! These let the crate run without depending on a particular terminal UI
//! or signal handling implementation.

use crate::resource::Identity;
use crate::types::ApplyResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for execution operations
///
/// Called from the dispatch loop only, never from worker threads.
pub trait ProgressCallback: Send {
    /// Called once before the first resource is dispatched
    fn on_run_start(&mut self, total: usize);

    /// Called when a resource is handed to a worker
    fn on_resource_start(&mut self, id: &Identity, description: &str);

    /// Called when a resource reaches a terminal result
    fn on_resource_complete(&mut self, id: &Identity, result: &ApplyResult);

    /// Called once after the last result is recorded
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_resource_start(&mut self, _id: &Identity, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &Identity, _result: &ApplyResult) {}
    fn on_run_complete(&mut self) {}
}

/// Cooperative cancellation flag shared between a run and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; in-flight resources still finish
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to provider apply operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyContext {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl ApplyContext {
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self { dry_run, verbose }
    }
}
