//! Diff and apply against the local host

use anyhow::{Context as _, Result};
use declarative::{CancelToken, compute_diffs};
use std::path::Path;

use super::Role;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::differ::display_diff;
use crate::engine::executor;
use crate::engine::{ApplyOptions, ReportFile};
use crate::platform::Capabilities;
use crate::providers::HostProviders;
use crate::ui;

/// Show what differs without changing anything
pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let role = Role::load(ctx)?;
    let plan = role.plan(target)?;
    let capabilities = Capabilities::for_family(&role.facts.os_family)?;
    let providers = HostProviders::for_capabilities(&capabilities);

    ui::header("Confcollect Diff");
    let diffs = compute_diffs(&plan, &providers);
    display_diff(&diffs, &plan);
    Ok(())
}

/// Converge the host; returns whether every resource succeeded
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<bool> {
    let role = Role::load(ctx)?;
    let plan = role.plan(args.target.as_deref())?;
    let capabilities = Capabilities::for_family(&role.facts.os_family)?;
    let providers = HostProviders::for_capabilities(&capabilities);

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(role.config.apply.jobs),
        strict: args.strict || role.config.apply.strict,
        yes: args.yes,
        verbose: ctx.verbose > 0,
    };

    ui::header("Applying Configuration");
    if opts.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let cancel = install_interrupt_handler()?;
    let Some(report) = executor::run(&plan, &providers, &opts, &cancel)? else {
        return Ok(true);
    };

    if let Some(path) = &args.report {
        write_report(path, &ReportFile::new(&report, &role.facts, opts.dry_run))?;
    }

    Ok(report.is_success())
}

/// First Ctrl-C stops dispatching, in-flight resources finish
fn install_interrupt_handler() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        if !handle.is_cancelled() {
            eprintln!();
            ui::warn("Interrupted, waiting for running resources to finish...");
        }
        handle.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn write_report(path: &Path, report: &ReportFile<'_>) -> Result<()> {
    report.write(path)?;
    ui::success(&format!("Report written to {}", path.display()));
    Ok(())
}
