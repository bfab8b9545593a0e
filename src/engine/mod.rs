//! Terminal front end for the reconciler
//!
//! The engine orchestrates:
//! 1. Diffing - Probe every resource and show what differs
//! 2. Confirming - Ask before touching the host
//! 3. Executing - Reconcile with bounded parallelism and report the outcome

pub mod differ;
pub mod executor;

pub use executor::{ApplyOptions, ReportFile};
