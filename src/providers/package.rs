//! Native packages through apt or yum

use super::{converged_or_drift, run, succeeds, unwanted};
use crate::platform::PackageManager;
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Provider, Resource, ResourceState};
use std::process::Command;

pub struct PackageProvider {
    manager: PackageManager,
}

impl PackageProvider {
    pub fn new(manager: PackageManager) -> Self {
        Self { manager }
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        match self.manager {
            PackageManager::Apt => {
                let output = Command::new("dpkg-query")
                    .args(["-W", "-f=${Status}", name])
                    .output()
                    .context("Failed to run dpkg-query")?;
                let status = String::from_utf8_lossy(&output.stdout);
                Ok(output.status.success() && is_installed_status(&status))
            }
            PackageManager::Yum => succeeds(Command::new("rpm").args(["-q", name]), "rpm -q"),
        }
    }

    fn command(&self, action: &str, name: &str) -> Command {
        let mut cmd = match self.manager {
            PackageManager::Apt => {
                let mut cmd = Command::new("apt-get");
                cmd.env("DEBIAN_FRONTEND", "noninteractive");
                cmd
            }
            PackageManager::Yum => Command::new("yum"),
        };
        cmd.args([action, "-y", name]);
        cmd
    }
}

/// dpkg reports e.g. `install ok installed` or `deinstall ok config-files`
fn is_installed_status(status: &str) -> bool {
    status.split_whitespace().last() == Some("installed")
}

impl Provider for PackageProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let installed = self.is_installed(resource.name())?;
        match (installed, resource.attributes.ensure.is_absent()) {
            (false, _) => Ok(ResourceState::Absent),
            (true, true) => Ok(unwanted()),
            (true, false) => Ok(converged_or_drift(resource, &[])),
        }
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let name = resource.name();
        let tool = self.manager.as_str();

        if resource.attributes.ensure.is_absent() {
            if !self.is_installed(name)? {
                return Ok(ApplyResult::NoChange);
            }
            run(&mut self.command("remove", name), tool)?;
            log::info!("Removed package {name}");
            return Ok(ApplyResult::Removed);
        }

        if self.is_installed(name)? {
            return Ok(ApplyResult::NoChange);
        }
        run(&mut self.command("install", name), tool)?;
        log::info!("Installed package {name} via {tool}");
        Ok(ApplyResult::Created)
    }
}
