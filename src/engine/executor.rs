//! Apply a plan on the local host with terminal progress

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use declarative::{
    ApplyResult, CancelToken, ExecuteOptions, ExecuteSummary, ExecutionPlan, Identity,
    ProgressCallback, ProviderSet, RunReport, compute_diffs, execute,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use super::differ::display_diff;
use crate::platform::PlatformFacts;
use crate::ui;

/// Options for an interactive apply
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Probe only, never change anything
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Stop dispatching after the first failure
    pub strict: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            strict: false,
            yes: false,
            verbose: false,
        }
    }
}

impl ApplyOptions {
    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: self.dry_run,
            jobs: self.jobs,
            verbose: self.verbose,
            strict: self.strict,
        }
    }
}

/// Progress bar fed from the dispatch loop
pub struct BarProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl BarProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose,
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
        {
            self.bar.set_style(style.progress_chars("█▓▒░"));
        }
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn on_resource_start(&mut self, id: &Identity, _description: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_resource_complete(&mut self, id: &Identity, result: &ApplyResult) {
        if self.verbose || !result.is_success() || result.is_change() {
            self.bar.println(format!(
                "  {} {id} {}",
                ui::outcome_symbol(result),
                result.to_string().dimmed()
            ));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Show the diff, confirm, then reconcile
///
/// Returns the report of the run, or None if the user declined.
pub fn run(
    plan: &ExecutionPlan,
    providers: &dyn ProviderSet,
    opts: &ApplyOptions,
    cancel: &CancelToken,
) -> Result<Option<RunReport>> {
    // 1. Show what will change
    let diffs = compute_diffs(plan, providers);
    display_diff(&diffs, plan);

    // 2. Confirm (unless --yes)
    if !diffs.is_empty() && !opts.yes && !opts.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(None);
    }

    // 3. Reconcile
    println!();
    println!(
        "  {} {} {} resources with {} jobs...",
        "→".cyan(),
        if opts.dry_run { "Checking" } else { "Applying" },
        plan.len(),
        opts.jobs.max(1)
    );
    let mut progress = BarProgress::new(opts.verbose);
    let report = execute(plan, providers, &opts.execute_options(), cancel, &mut progress)?;

    // 4. Summary
    print_failures(&report);
    print_summary(&report.summary, opts.dry_run);
    if cancel.is_cancelled() {
        println!("  {} Run cancelled; in-flight resources were allowed to finish", "⚠".yellow());
    }

    Ok(Some(report))
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_failures(report: &RunReport) {
    let failures: Vec<_> = report
        .results
        .iter()
        .filter(|r| matches!(r.result, ApplyResult::Failed { .. }))
        .collect();
    if failures.is_empty() {
        return;
    }

    println!();
    println!("  {}", "Failures".red().bold());
    for applied in failures {
        println!(
            "    {} {}: {}",
            ui::outcome_symbol(&applied.result),
            applied.identity,
            applied.result
        );
    }
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.no_change > 0 {
        println!("    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    if summary.blocked > 0 {
        println!("    • {} {} blocked", summary.blocked, "resources".red());
    }
    if summary.cancelled > 0 {
        println!("    • {} resources cancelled", summary.cancelled);
    }
}

/// A run report as written to disk
#[derive(Debug, Serialize)]
pub struct ReportFile<'a> {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub success: bool,
    pub facts: &'a PlatformFacts,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

impl<'a> ReportFile<'a> {
    pub fn new(report: &'a RunReport, facts: &'a PlatformFacts, dry_run: bool) -> Self {
        Self {
            generated_at: Utc::now(),
            dry_run,
            success: report.is_success(),
            facts,
            report,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content + "\n")
            .with_context(|| format!("Could not write report to {}", path.display()))?;
        log::info!("Wrote run report to {}", path.display());
        Ok(())
    }
}
