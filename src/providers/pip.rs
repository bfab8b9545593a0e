//! Python packages inside the service account's virtualenv

use super::{command_as, converged_or_drift, run, succeeds, unwanted};
use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult, Provider, Resource, ResourceState};
use std::path::{Path, PathBuf};

pub struct PipProvider {
    python: &'static str,
}

impl PipProvider {
    pub fn new(python: &'static str) -> Self {
        Self { python }
    }

    fn virtualenv(resource: &Resource) -> Result<PathBuf> {
        match resource.attributes.get_param("virtualenv") {
            Some(venv) => Ok(PathBuf::from(venv)),
            None => bail!("{} has no virtualenv", resource.identity),
        }
    }

    fn pip(venv: &Path) -> String {
        venv.join("bin/pip").display().to_string()
    }

    fn is_installed(resource: &Resource, venv: &Path) -> Result<bool> {
        let pip = Self::pip(venv);
        if !Path::new(&pip).exists() {
            return Ok(false);
        }
        let mut cmd = command_as(resource.attributes.owner.as_deref(), &pip);
        cmd.args(["show", "--quiet", resource.name()]);
        succeeds(&mut cmd, "pip show")
    }

    fn ensure_virtualenv(&self, resource: &Resource, venv: &Path) -> Result<()> {
        if Path::new(&Self::pip(venv)).exists() {
            return Ok(());
        }
        let python = resource.attributes.get_param("python").unwrap_or(self.python);
        let mut cmd = command_as(resource.attributes.owner.as_deref(), python);
        cmd.args(["-m", "venv"]).arg(venv);
        run(&mut cmd, "python -m venv")?;
        log::info!("Created virtualenv {}", venv.display());
        Ok(())
    }
}

impl Provider for PipProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let venv = Self::virtualenv(resource)?;
        let installed = Self::is_installed(resource, &venv)?;
        match (installed, resource.attributes.ensure.is_absent()) {
            (false, _) => Ok(ResourceState::Absent),
            (true, true) => Ok(unwanted()),
            (true, false) => Ok(converged_or_drift(resource, &[])),
        }
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let venv = Self::virtualenv(resource)?;
        let owner = resource.attributes.owner.as_deref();
        let name = resource.name();

        if resource.attributes.ensure.is_absent() {
            if !Self::is_installed(resource, &venv)? {
                return Ok(ApplyResult::NoChange);
            }
            let mut cmd = command_as(owner, &Self::pip(&venv));
            cmd.args(["uninstall", "--yes", name]);
            run(&mut cmd, "pip uninstall")?;
            return Ok(ApplyResult::Removed);
        }

        self.ensure_virtualenv(resource, &venv)?;
        let mut cmd = command_as(owner, &Self::pip(&venv));
        cmd.args(["install", "--quiet", name]);
        run(&mut cmd, "pip install")?;
        log::info!("Installed {name} into {}", venv.display());
        Ok(ApplyResult::Created)
    }
}
