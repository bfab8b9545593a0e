//! Service accounts via the shadow-utils commands

use super::{converged_or_drift, run, unwanted};
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Provider, Resource, ResourceState};
use nix::unistd::User;
use std::path::Path;
use std::process::Command;

pub struct AccountProvider;

fn lookup(name: &str) -> Result<Option<User>> {
    User::from_name(name).with_context(|| format!("Failed to look up user: {name}"))
}

/// Password hash from the shadow database; None when unreadable
fn shadow_password(name: &str) -> Option<String> {
    let output = Command::new("getent").args(["shadow", name]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .and_then(|line| line.split(':').nth(1))
        .map(str::to_string)
}

/// Supplementary groups: everything except the primary group
fn supplementary_groups(name: &str) -> Result<Vec<String>> {
    let primary = run(Command::new("id").args(["-gn", name]), "id -gn")?;
    let all = run(Command::new("id").args(["-Gn", name]), "id -Gn")?;
    Ok(all
        .split_whitespace()
        .filter(|g| *g != primary.trim())
        .map(str::to_string)
        .collect())
}

fn has_authorized_keys(home: &Path) -> bool {
    home.join(".ssh/authorized_keys")
        .metadata()
        .is_ok_and(|m| m.len() > 0)
}

impl AccountProvider {
    fn drift(resource: &Resource, entry: &User) -> Result<Vec<String>> {
        let attrs = &resource.attributes;
        let mut drift = Vec::new();

        let gecos = entry.gecos.to_string_lossy();
        if let Some(comment) = attrs.get_param("comment")
            && gecos != comment
        {
            drift.push(format!("comment '{gecos}'"));
        }
        if let Some(home) = attrs.get_param("home")
            && entry.dir != Path::new(home)
        {
            drift.push(format!("home {}", entry.dir.display()));
        }
        if let Some(shell) = attrs.get_param("shell")
            && entry.shell != Path::new(shell)
        {
            drift.push(format!("shell {}", entry.shell.display()));
        }
        if let Some(password) = attrs.get_param("password")
            && let Some(actual) = shadow_password(&entry.name)
            && actual != password
        {
            drift.push("password".to_string());
        }
        if attrs.get_param("membership") == Some("inclusive") {
            let extra = supplementary_groups(&entry.name)?;
            if !extra.is_empty() {
                drift.push(format!("groups {}", extra.join(",")));
            }
        }
        if attrs.flag("purge_sshkeys") && has_authorized_keys(&entry.dir) {
            drift.push("unmanaged ssh keys".to_string());
        }

        Ok(drift)
    }

    fn create(resource: &Resource) -> Result<()> {
        let attrs = &resource.attributes;
        let mut cmd = Command::new("useradd");
        cmd.args(["--create-home", "--user-group"]);
        if attrs.flag("system") {
            cmd.arg("--system");
        }
        if let Some(comment) = attrs.get_param("comment") {
            cmd.args(["--comment", comment]);
        }
        if let Some(home) = attrs.get_param("home") {
            cmd.args(["--home-dir", home]);
        }
        if let Some(shell) = attrs.get_param("shell") {
            cmd.args(["--shell", shell]);
        }
        if let Some(password) = attrs.get_param("password") {
            cmd.args(["--password", password]);
        }
        cmd.arg(resource.name());
        run(&mut cmd, "useradd")?;
        Ok(())
    }

    fn update(resource: &Resource, entry: &User) -> Result<()> {
        let attrs = &resource.attributes;
        let mut cmd = Command::new("usermod");
        if let Some(comment) = attrs.get_param("comment") {
            cmd.args(["--comment", comment]);
        }
        if let Some(home) = attrs.get_param("home") {
            cmd.args(["--home", home]);
        }
        if let Some(shell) = attrs.get_param("shell") {
            cmd.args(["--shell", shell]);
        }
        if let Some(password) = attrs.get_param("password") {
            cmd.args(["--password", password]);
        }
        if attrs.get_param("membership") == Some("inclusive") {
            cmd.args(["--groups", ""]);
        }
        cmd.arg(resource.name());
        run(&mut cmd, "usermod")?;

        if attrs.flag("purge_sshkeys") {
            let home = attrs.get_param("home").map_or(entry.dir.as_path(), Path::new);
            Self::purge_ssh_keys(home)?;
        }
        Ok(())
    }

    fn purge_ssh_keys(home: &Path) -> Result<()> {
        let keys = home.join(".ssh/authorized_keys");
        if keys.exists() {
            std::fs::write(&keys, "")
                .with_context(|| format!("Failed to purge {}", keys.display()))?;
            log::info!("Purged {}", keys.display());
        }
        Ok(())
    }
}

impl Provider for AccountProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let Some(entry) = lookup(resource.name())? else {
            return Ok(ResourceState::Absent);
        };
        if resource.attributes.ensure.is_absent() {
            return Ok(unwanted());
        }
        log::debug!("{} has uid {} gid {}", entry.name, entry.uid, entry.gid);
        let drift = Self::drift(resource, &entry)?;
        Ok(converged_or_drift(resource, &drift))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let existing = lookup(resource.name())?;

        if resource.attributes.ensure.is_absent() {
            if existing.is_none() {
                return Ok(ApplyResult::NoChange);
            }
            run(Command::new("userdel").arg(resource.name()), "userdel")?;
            return Ok(ApplyResult::Removed);
        }

        match existing {
            None => {
                Self::create(resource)?;
                log::info!("Created account {}", resource.name());
                Ok(ApplyResult::Created)
            }
            Some(entry) => {
                Self::update(resource, &entry)?;
                log::info!("Updated account {}", resource.name());
                Ok(ApplyResult::Modified)
            }
        }
    }
}
