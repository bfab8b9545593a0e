//! Git checkouts

use super::{command_as, converged_or_drift, run, unwanted};
use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Ensure, Provider, Resource, ResourceState};
use std::path::Path;
use std::process::Command;

pub struct VcsProvider;

fn ssh_command(identity_file: &str) -> String {
    format!("ssh -i {identity_file} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new")
}

/// `git` for a checkout, run as its owner with its deploy key
fn git(resource: &Resource) -> Command {
    let mut cmd = command_as(resource.attributes.owner.as_deref(), "git");
    if let Some(identity_file) = resource.attributes.get_param("identity_file") {
        cmd.env("GIT_SSH_COMMAND", ssh_command(identity_file));
    }
    cmd
}

fn git_in(resource: &Resource, args: &[&str]) -> Command {
    let mut cmd = git(resource);
    cmd.arg("-C").arg(resource.name()).args(args);
    cmd
}

fn is_checkout(path: &Path) -> bool {
    path.join(".git").exists()
}

fn source(resource: &Resource) -> Result<&str> {
    match resource.attributes.source.as_deref() {
        Some(source) => Ok(source),
        None => bail!("{} has no source", resource.identity),
    }
}

fn rev_parse(resource: &Resource, rev: &str) -> Result<String> {
    let out = run(&mut git_in(resource, &["rev-parse", "--verify", rev]), "git rev-parse")?;
    Ok(out.trim().to_string())
}

/// Commit `reference` names on the source, read without touching the checkout
fn remote_commit(resource: &Resource, reference: &str) -> Result<Option<String>> {
    let out = run(
        &mut git_in(resource, &["ls-remote", source(resource)?, reference]),
        "git ls-remote",
    )?;
    let mut commit = None;
    for line in out.lines() {
        let Some((sha, name)) = line.split_once('\t') else {
            continue;
        };
        // annotated tags: `<tag>^{}` is the commit
        if name.ends_with("^{}") {
            return Ok(Some(sha.to_string()));
        }
        commit.get_or_insert_with(|| sha.to_string());
    }
    Ok(commit)
}

/// Remote branch the current branch tracks, `HEAD` when there is none
fn upstream_ref(resource: &Resource) -> String {
    let tracked = run(
        &mut git_in(resource, &["symbolic-ref", "--quiet", "HEAD"]),
        "git symbolic-ref",
    )
    .ok()
    .and_then(|head| {
        let branch = head.trim().strip_prefix("refs/heads/")?.to_string();
        let key = format!("branch.{branch}.merge");
        run(&mut git_in(resource, &["config", "--get", &key]), "git config").ok()
    });
    match tracked {
        Some(merge) if !merge.trim().is_empty() => merge.trim().to_string(),
        _ => "HEAD".to_string(),
    }
}

impl VcsProvider {
    /// Compare the checkout with its source using read-only git commands
    fn drift(resource: &Resource) -> Result<Vec<String>> {
        let mut drift = Vec::new();

        let origin = run(
            &mut git_in(resource, &["remote", "get-url", "origin"]),
            "git remote get-url",
        )
        .unwrap_or_default();
        if origin.trim() != source(resource)? {
            drift.push(format!("origin {}", origin.trim()));
        }

        let head = rev_parse(resource, "HEAD")?;
        if let Some(revision) = resource.attributes.get_param("revision") {
            // commit ids are not advertised by the remote
            let wanted = match remote_commit(resource, revision)? {
                Some(commit) => commit,
                None => rev_parse(resource, &format!("{revision}^{{commit}}"))
                    .unwrap_or_else(|_| revision.to_string()),
            };
            if head != wanted {
                drift.push(format!("at {head}"));
            }
        } else if resource.attributes.ensure == Ensure::Latest {
            let reference = upstream_ref(resource);
            let Some(upstream) = remote_commit(resource, &reference)? else {
                bail!("{} has no {reference}", source(resource)?);
            };
            if head != upstream {
                drift.push(format!("at {head}, upstream {upstream}"));
            }
        }

        Ok(drift)
    }

    fn clone_checkout(resource: &Resource) -> Result<()> {
        let mut cmd = git(resource);
        cmd.args(["clone", "--quiet", source(resource)?, resource.name()]);
        run(&mut cmd, "git clone")?;
        if let Some(revision) = resource.attributes.get_param("revision") {
            run(
                &mut git_in(resource, &["checkout", "--quiet", revision]),
                "git checkout",
            )?;
        }
        Ok(())
    }

    fn update(resource: &Resource) -> Result<()> {
        let source = source(resource)?;
        run(
            &mut git_in(resource, &["remote", "set-url", "origin", source]),
            "git remote set-url",
        )?;
        run(&mut git_in(resource, &["fetch", "--quiet", "origin"]), "git fetch")?;

        if let Some(revision) = resource.attributes.get_param("revision") {
            run(
                &mut git_in(resource, &["checkout", "--quiet", revision]),
                "git checkout",
            )?;
        } else if resource.attributes.ensure == Ensure::Latest {
            run(
                &mut git_in(resource, &["pull", "--quiet", "--ff-only"]),
                "git pull",
            )?;
        }
        Ok(())
    }
}

impl Provider for VcsProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        if !path.exists() {
            return Ok(ResourceState::Absent);
        }
        if resource.attributes.ensure.is_absent() {
            return Ok(unwanted());
        }
        if !is_checkout(path) {
            return Ok(converged_or_drift(resource, &["not a git checkout".to_string()]));
        }
        let drift = Self::drift(resource)?;
        Ok(converged_or_drift(resource, &drift))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());

        if resource.attributes.ensure.is_absent() {
            if !path.exists() {
                return Ok(ApplyResult::NoChange);
            }
            std::fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            return Ok(ApplyResult::Removed);
        }

        if !path.exists() {
            Self::clone_checkout(resource)?;
            log::info!("Cloned {} into {}", source(resource)?, path.display());
            return Ok(ApplyResult::Created);
        }
        if !is_checkout(path) {
            bail!("{} exists and is not a git checkout", path.display());
        }

        Self::update(resource)?;
        log::info!("Updated {}", path.display());
        Ok(ApplyResult::Modified)
    }
}
