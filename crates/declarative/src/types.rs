//! Core types for declarative resource management

use crate::resource::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired presence of a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    /// Exists, whatever its version
    #[default]
    Present,
    /// Does not exist
    Absent,
    /// Exists and tracks the newest upstream revision
    Latest,
    /// Exists as a directory
    Directory,
    /// Exists as a regular file
    File,
}

impl Ensure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Latest => "latest",
            Self::Directory => "directory",
            Self::File => "file",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Where in the per-resource state machine a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Probe,
    Apply,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => f.write_str("probe"),
            Self::Apply => f.write_str("apply"),
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Probing or applying failed
    Failed { stage: FailureStage, error: String },
    /// Apply was skipped
    Skipped { reason: String },
    /// Not attempted because a dependency failed
    Blocked { dependency: String },
    /// Not attempted because the run was cancelled
    Cancelled,
}

impl ApplyResult {
    /// Build a failure raised by a provider's apply step
    pub fn apply_failed(error: impl Into<String>) -> Self {
        Self::Failed {
            stage: FailureStage::Apply,
            error: error.into(),
        }
    }

    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::Failed { .. } | Self::Blocked { .. } | Self::Cancelled
        )
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }

    /// Whether dependents may proceed after this result
    pub fn unblocks_dependents(&self) -> bool {
        matches!(
            self,
            Self::NoChange | Self::Created | Self::Modified | Self::Removed | Self::Skipped { .. }
        )
    }

    /// Short status symbol for terminal output
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoChange => "○",
            Self::Created | Self::Modified | Self::Removed => "✓",
            Self::Failed { .. } => "✗",
            Self::Skipped { .. } => "⊘",
            Self::Blocked { .. } => "⊗",
            Self::Cancelled => "–",
        }
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => f.write_str("unchanged"),
            Self::Created => f.write_str("created"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
            Self::Failed { stage, error } => write!(f, "{stage} failed: {error}"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Blocked { dependency } => write!(f, "blocked by failed dependency {dependency}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-resource state machine positions
///
/// `Pending -> Probing -> {NoChangeNeeded -> Done} | {Applying -> Done} | {Applying -> Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Probing,
    NoChangeNeeded,
    Applying,
    Done,
    Failed,
}

/// What happened to one resource during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResult {
    pub identity: Identity,
    /// State observed before any change
    pub previous: Option<ResourceState>,
    pub result: ApplyResult,
    /// State observed after the run touched the resource
    pub final_state: Option<ResourceState>,
    /// Transitions taken, in order
    pub phases: Vec<Phase>,
}

impl AppliedResult {
    /// A result for a resource that was never dispatched
    pub fn not_attempted(identity: Identity, result: ApplyResult) -> Self {
        Self {
            identity,
            previous: None,
            result,
            final_state: None,
            phases: vec![Phase::Pending],
        }
    }

    /// Whether the resource reached `Done`
    pub fn is_done(&self) -> bool {
        self.phases.last() == Some(&Phase::Done)
    }

    /// Whether the apply step ran for this resource
    pub fn was_applied(&self) -> bool {
        self.phases.contains(&Phase::Applying)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0 && self.cancelled == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created
            + self.modified
            + self.removed
            + self.skipped
            + self.failed
            + self.no_change
            + self.blocked
            + self.cancelled
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
            ApplyResult::Blocked { .. } => self.blocked += 1,
            ApplyResult::Cancelled => self.cancelled += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Probe only, never apply
    pub dry_run: bool,
    /// Maximum number of resources probed or applied at once
    pub jobs: usize,
    /// Verbose output
    pub verbose: bool,
    /// Stop dispatching after the first failure
    pub strict: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            verbose: false,
            strict: false,
        }
    }
}

/// Ordered outcome of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// One entry per resource, in plan order
    pub results: Vec<AppliedResult>,
    pub summary: ExecuteSummary,
}

impl RunReport {
    pub fn from_results(results: Vec<AppliedResult>) -> Self {
        let mut summary = ExecuteSummary::default();
        for applied in &results {
            summary.add_result(&applied.result);
        }
        Self { results, summary }
    }

    /// True only if every resource reached `Done`
    pub fn is_success(&self) -> bool {
        self.results.iter().all(AppliedResult::is_done)
    }

    /// Look up the result for one identity
    pub fn get(&self, identity: &Identity) -> Option<&AppliedResult> {
        self.results.iter().find(|r| &r.identity == identity)
    }

    /// Number of resources whose apply step ran
    pub fn applied_count(&self) -> usize {
        self.results.iter().filter(|r| r.was_applied()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn test_summary_counts_every_outcome() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Blocked {
            dependency: "user:confcollect".into(),
        });
        summary.add_result(&ApplyResult::Cancelled);

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_changes(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_dry_run_skip_still_unblocks() {
        let skipped = ApplyResult::Skipped {
            reason: "dry run".into(),
        };
        assert!(skipped.unblocks_dependents());
        assert!(!ApplyResult::apply_failed("boom").unblocks_dependents());
    }

    #[test]
    fn test_report_success_requires_done() {
        let id = Identity::new(ResourceKind::File, "/tmp/x");
        let pending = AppliedResult::not_attempted(id.clone(), ApplyResult::Cancelled);
        let report = RunReport::from_results(vec![pending]);
        assert!(!report.is_success());
        assert_eq!(report.summary.cancelled, 1);
        assert!(report.get(&id).is_some());
    }
}
