//! Account lookups, modes and ownership for files and directories

use anyhow::{Context, Result, bail};
use declarative::Attributes;
use nix::unistd::{Gid, Group, Uid, User, geteuid};
use std::fs::{self, Metadata};
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::Path;

pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Uid of a named account, if it exists
pub fn uid_of(name: &str) -> Result<Option<u32>> {
    let user =
        User::from_name(name).with_context(|| format!("Failed to look up user: {name}"))?;
    Ok(user.map(|u| u.uid.as_raw()))
}

/// Gid of a named group, if it exists
pub fn gid_of(name: &str) -> Result<Option<u32>> {
    let group =
        Group::from_name(name).with_context(|| format!("Failed to look up group: {name}"))?;
    Ok(group.map(|g| g.gid.as_raw()))
}

/// Account name for a uid
pub fn user_name(uid: u32) -> Option<String> {
    User::from_uid(Uid::from_raw(uid)).ok().flatten().map(|u| u.name)
}

/// Group name for a gid
pub fn group_name(gid: u32) -> Option<String> {
    Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|g| g.name)
}

/// Attributes of an existing path that differ from the desired ones
pub fn drift(meta: &Metadata, attrs: &Attributes) -> Vec<String> {
    let mut drift = Vec::new();

    if let Some(mode) = attrs.mode {
        let actual = meta.mode() & 0o7777;
        if actual != mode {
            drift.push(format!("mode {actual:04o}"));
        }
    }
    if let Some(owner) = &attrs.owner {
        let actual = user_name(meta.uid()).unwrap_or_else(|| meta.uid().to_string());
        if &actual != owner {
            drift.push(format!("owner {actual}"));
        }
    }
    if let Some(group) = &attrs.group {
        let actual = group_name(meta.gid()).unwrap_or_else(|| meta.gid().to_string());
        if &actual != group {
            drift.push(format!("group {actual}"));
        }
    }

    drift
}

/// Set mode and ownership on a path
pub fn apply(path: &Path, attrs: &Attributes) -> Result<()> {
    if let Some(mode) = attrs.mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    let uid = match &attrs.owner {
        Some(owner) => match uid_of(owner)? {
            Some(uid) => Some(uid),
            None => bail!("unknown user '{owner}'"),
        },
        None => None,
    };
    let gid = match &attrs.group {
        Some(group) => match gid_of(group)? {
            Some(gid) => Some(gid),
            None => bail!("unknown group '{group}'"),
        },
        None => None,
    };

    if uid.is_some() || gid.is_some() {
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let unchanged = uid.is_none_or(|u| u == meta.uid()) && gid.is_none_or(|g| g == meta.gid());
        if !unchanged {
            chown(path, uid, gid)
                .with_context(|| format!("Failed to set ownership on {}", path.display()))?;
        }
    }

    Ok(())
}
