//! Scheduled jobs in a user's crontab
//!
//! Each managed entry sits on the line after a `# confcollect: <name>`
//! marker, so entries can be found and replaced without touching anything
//! else in the crontab.

use super::{converged_or_drift, unwanted};
use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Provider, Resource, ResourceState};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

const MARKER: &str = "# confcollect: ";
const SCHEDULE_FIELDS: [&str; 5] = ["minute", "hour", "monthday", "month", "weekday"];

/// Crontab edits are read-modify-write, so they are serialized
#[derive(Default)]
pub struct CronProvider {
    edit: Mutex<()>,
}

fn user(resource: &Resource) -> Result<&str> {
    match resource.attributes.get_param("user") {
        Some(user) => Ok(user),
        None => bail!("{} has no user", resource.identity),
    }
}

/// The crontab line for a job
fn render_entry(resource: &Resource) -> Result<String> {
    let attrs = &resource.attributes;
    let Some(command) = attrs.get_param("command") else {
        bail!("{} has no command", resource.identity);
    };
    let schedule: Vec<&str> = SCHEDULE_FIELDS
        .iter()
        .map(|field| attrs.get_param(field).unwrap_or("*"))
        .collect();
    Ok(format!("{} {command}", schedule.join(" ")))
}

/// The managed line for `name`, if present
fn find_entry<'a>(crontab: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{MARKER}{name}");
    let mut lines = crontab.lines();
    lines.find(|line| line.trim_end() == marker)?;
    lines.next()
}

/// Crontab with the entry for `name` replaced, appended, or (None) removed
fn with_entry(crontab: &str, name: &str, entry: Option<&str>) -> String {
    let marker = format!("{MARKER}{name}");
    let mut out: Vec<&str> = Vec::new();
    let mut lines = crontab.lines();
    let mut replaced = false;

    while let Some(line) = lines.next() {
        if line.trim_end() == marker {
            lines.next();
            if let Some(entry) = entry
                && !replaced
            {
                out.push(line);
                out.push(entry);
                replaced = true;
            }
            continue;
        }
        out.push(line);
    }
    if let Some(entry) = entry
        && !replaced
    {
        out.push(&marker);
        out.push(entry);
    }

    let mut text = out.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

fn read_crontab(user: &str) -> Result<String> {
    let output = Command::new("crontab")
        .args(["-l", "-u", user])
        .output()
        .context("Failed to run crontab -l")?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("no crontab") {
        return Ok(String::new());
    }
    bail!("crontab -l failed: {}", stderr.trim())
}

fn write_crontab(user: &str, content: &str) -> Result<()> {
    let mut child = Command::new("crontab")
        .args(["-u", user, "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to run crontab")?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(content.as_bytes())
            .context("Failed to write crontab")?;
    }
    let output = child.wait_with_output().context("Failed to run crontab")?;
    if !output.status.success() {
        bail!(
            "crontab failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

impl Provider for CronProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let crontab = read_crontab(user(resource)?)?;
        let Some(current) = find_entry(&crontab, resource.name()) else {
            return Ok(ResourceState::Absent);
        };
        if resource.attributes.ensure.is_absent() {
            return Ok(unwanted());
        }

        let wanted = render_entry(resource)?;
        let drift = if current == wanted {
            Vec::new()
        } else {
            vec![format!("entry '{current}'")]
        };
        Ok(converged_or_drift(resource, &drift))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let _guard = self.edit.lock().unwrap_or_else(PoisonError::into_inner);
        let user = user(resource)?;
        let name = resource.name();
        let crontab = read_crontab(user)?;
        let existing = find_entry(&crontab, name).is_some();

        if resource.attributes.ensure.is_absent() {
            if !existing {
                return Ok(ApplyResult::NoChange);
            }
            write_crontab(user, &with_entry(&crontab, name, None))?;
            return Ok(ApplyResult::Removed);
        }

        let entry = render_entry(resource)?;
        write_crontab(user, &with_entry(&crontab, name, Some(&entry)))?;
        log::info!("Scheduled {name} for {user}: {entry}");
        Ok(if existing {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}
