//! Host providers: one per resource kind
//!
//! Each provider observes the live host and converges one resource kind.
//! Probes report the resource's own desired state when nothing differs, so
//! the reconciler can compare the two directly; otherwise they report
//! `Absent` or the list of drifted attributes.

mod account;
mod cron;
mod files;
mod ownership;
mod package;
mod pip;
mod vcs;

use crate::platform::Capabilities;
use anyhow::{Context, Result, bail};
use declarative::{
    ApplyContext, ApplyResult, Provider, ProviderSet, Resource, ResourceKind, ResourceState,
};
use std::process::Command;

pub use account::AccountProvider;
pub use cron::CronProvider;
pub use files::{DirectoryProvider, FileProvider};
pub use package::PackageProvider;
pub use pip::PipProvider;
pub use vcs::VcsProvider;

/// Providers for a real Debian or RedHat host
pub struct HostProviders {
    account: AccountProvider,
    directory: DirectoryProvider,
    file: FileProvider,
    package: PackageProvider,
    pip: PipProvider,
    vcs: VcsProvider,
    cron: CronProvider,
    include: IncludeProvider,
}

impl HostProviders {
    pub fn for_capabilities(capabilities: &Capabilities) -> Self {
        Self {
            account: AccountProvider,
            directory: DirectoryProvider,
            file: FileProvider,
            package: PackageProvider::new(capabilities.package_manager),
            pip: PipProvider::new(capabilities.python),
            vcs: VcsProvider,
            cron: CronProvider::default(),
            include: IncludeProvider,
        }
    }
}

impl ProviderSet for HostProviders {
    fn provider_for(&self, kind: ResourceKind) -> Option<&dyn Provider> {
        let provider: &dyn Provider = match kind {
            ResourceKind::User => &self.account,
            ResourceKind::Directory => &self.directory,
            ResourceKind::File => &self.file,
            ResourceKind::Package => &self.package,
            ResourceKind::PipPackage => &self.pip,
            ResourceKind::VcsRepo => &self.vcs,
            ResourceKind::Cron => &self.cron,
            ResourceKind::Include => &self.include,
        };
        Some(provider)
    }
}

/// Stage anchors and class markers: nothing to converge
pub struct IncludeProvider;

impl Provider for IncludeProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        Ok(resource.desired_state())
    }

    fn apply(&self, _resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        Ok(ApplyResult::NoChange)
    }
}

/// Desired state if nothing drifted, otherwise the drift
pub(crate) fn converged_or_drift(resource: &Resource, drift: &[String]) -> ResourceState {
    if drift.is_empty() {
        resource.desired_state()
    } else {
        ResourceState::Modified {
            from: drift.join(", "),
            to: resource.summary(),
        }
    }
}

/// State of something that exists but should not
pub(crate) fn unwanted() -> ResourceState {
    ResourceState::Present { details: None }
}

/// Run a command, failing with its stderr if it exits non-zero
pub(crate) fn run(cmd: &mut Command, what: &str) -> Result<String> {
    log::debug!("Running {cmd:?}");
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run {what}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command and only report whether it succeeded
pub(crate) fn succeeds(cmd: &mut Command, what: &str) -> Result<bool> {
    log::trace!("Checking {cmd:?}");
    let status = cmd
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .with_context(|| format!("Failed to run {what}"))?;
    Ok(status.success())
}

/// Build a command that runs as `account` when we are root
///
/// Unprivileged runs cannot switch accounts, so the command runs as the
/// invoking user.
pub(crate) fn command_as(account: Option<&str>, program: &str) -> Command {
    match account {
        Some(account) if ownership::is_root() && account != "root" => {
            let mut cmd = Command::new("runuser");
            cmd.args(["-u", account, "--", program]);
            cmd
        }
        _ => Command::new(program),
    }
}
