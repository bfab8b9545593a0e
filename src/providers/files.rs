//! Directories and regular files

use super::{converged_or_drift, ownership, unwanted};
use anyhow::{Context, Result, bail};
use declarative::{
    ApplyContext, ApplyResult, Content, Ensure, Provider, Resource, ResourceState, content_digest,
};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Metadata for a path, or None if it does not exist
fn metadata(path: &Path) -> Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

pub struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        let Some(meta) = metadata(path)? else {
            return Ok(ResourceState::Absent);
        };
        if resource.attributes.ensure.is_absent() {
            return Ok(unwanted());
        }

        let mut drift = Vec::new();
        if !meta.is_dir() {
            drift.push("not a directory".to_string());
        } else {
            drift.extend(ownership::drift(&meta, &resource.attributes));
        }
        Ok(converged_or_drift(resource, &drift))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());
        let existing = metadata(path)?;

        if resource.attributes.ensure.is_absent() {
            if existing.is_some() {
                fs::remove_dir(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                return Ok(ApplyResult::Removed);
            }
            return Ok(ApplyResult::NoChange);
        }

        let created = match existing {
            Some(meta) if meta.is_dir() => false,
            Some(_) => bail!("{} exists and is not a directory", path.display()),
            None => {
                fs::create_dir(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                true
            }
        };
        ownership::apply(path, &resource.attributes)?;

        log::info!("{} {}", if created { "Created" } else { "Updated" }, path.display());
        Ok(if created {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        })
    }
}

pub struct FileProvider;

impl FileProvider {
    /// Bytes the file should hold, if its content is managed
    fn desired_content(resource: &Resource) -> Result<Option<Vec<u8>>> {
        match &resource.attributes.content {
            Some(Content::Literal(text)) => Ok(Some(text.as_bytes().to_vec())),
            Some(Content::Source(source)) => fs::read(source)
                .map(Some)
                .with_context(|| format!("Failed to read content source {}", source.display())),
            None => Ok(None),
        }
    }
}

impl Provider for FileProvider {
    fn probe(&self, resource: &Resource) -> Result<ResourceState> {
        let path = Path::new(resource.name());
        let Some(meta) = metadata(path)? else {
            return Ok(ResourceState::Absent);
        };
        if resource.attributes.ensure.is_absent() {
            return Ok(unwanted());
        }
        if !meta.is_file() {
            return Ok(converged_or_drift(resource, &["not a regular file".to_string()]));
        }

        let mut drift = Vec::new();
        if let Some(wanted) = Self::desired_content(resource)? {
            let actual = fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if content_digest(&actual) != content_digest(&wanted) {
                drift.push(format!("content {}", content_digest(&actual)));
            }
        }
        drift.extend(ownership::drift(&meta, &resource.attributes));
        Ok(converged_or_drift(resource, &drift))
    }

    fn apply(&self, resource: &Resource, _ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = Path::new(resource.name());
        let existing = metadata(path)?;

        if resource.attributes.ensure.is_absent() {
            if existing.is_some() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                return Ok(ApplyResult::Removed);
            }
            return Ok(ApplyResult::NoChange);
        }
        if existing.as_ref().is_some_and(|m| m.is_dir()) {
            bail!("{} is a directory", path.display());
        }

        let wanted = Self::desired_content(resource)?;
        let current = match &existing {
            Some(_) => Some(
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
            ),
            None => None,
        };

        match (&wanted, &current) {
            (Some(wanted), Some(current)) if wanted == current => {}
            (None, Some(_)) => {}
            (wanted, _) => {
                let data = wanted.as_deref().unwrap_or_default();
                write_atomic(path, data, resource.attributes.mode.unwrap_or(0o644))?;
            }
        }
        ownership::apply(path, &resource.attributes)?;

        let created = existing.is_none();
        log::info!("{} {}", if created { "Created" } else { "Updated" }, path.display());
        Ok(if created {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        })
    }
}

/// Write through a sibling temp file, then rename over the target
///
/// The temp file is created with the final mode, so secrets are never
/// readable by others, not even briefly.
fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("{} has no file name", path.display());
    };
    let tmp = path.with_file_name(format!(".{}.confcollect-tmp", file_name.to_string_lossy()));

    let write = || -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))?;
        file.write_all(data)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move {} into place", path.display()))
    };

    let result = write();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
