//! Resource model and the per-kind provider trait
//!
//! A [`Resource`] is plain data: what should exist, identified by
//! `(kind, name)`. How it is observed and converged is the job of a
//! [`Provider`] registered for its kind.

use crate::context::ApplyContext;
use crate::error::{Error, Result as GraphResult};
use crate::types::{ApplyResult, Ensure, ResourceState};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Kind of desired-state item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    User,
    Directory,
    File,
    Package,
    PipPackage,
    VcsRepo,
    Cron,
    Include,
}

impl ResourceKind {
    pub const ALL: [Self; 8] = [
        Self::User,
        Self::Directory,
        Self::File,
        Self::Package,
        Self::PipPackage,
        Self::VcsRepo,
        Self::Cron,
        Self::Include,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Package => "package",
            Self::PipPackage => "pip_package",
            Self::VcsRepo => "vcsrepo",
            Self::Cron => "cron",
            Self::Include => "include",
        }
    }

    /// Parse a kind name as printed by [`ResourceKind::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique key of a resource within one graph
///
/// Printed as `kind:name`, e.g. `file:/home/confcollect/.ssh/id_rsa`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub kind: ResourceKind,
    pub name: String,
}

impl Identity {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// File content, given inline or as a path to copy from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    Literal(String),
    Source(PathBuf),
}

/// Hex BLAKE3 digest used to compare file content
pub fn content_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Desired attributes of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub ensure: Ensure,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
    pub content: Option<Content>,
    /// Upstream location (checkouts)
    pub source: Option<String>,
    pub provider: Option<String>,
    /// Kind-specific settings (comment, shell, command, virtualenv, ...)
    pub params: BTreeMap<String, String>,
}

impl Attributes {
    pub fn new(ensure: Ensure) -> Self {
        Self {
            ensure,
            ..Self::default()
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set owner and group to the same account
    pub fn owned_by(self, account: &str) -> Self {
        self.owner(account).group(account)
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(Content::Literal(content.into()));
        self
    }

    pub fn content_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.content = Some(Content::Source(path.into()));
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a kind-specific setting
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Look up a boolean kind-specific setting (`"true"` is true)
    pub fn flag(&self, key: &str) -> bool {
        self.get_param(key) == Some("true")
    }
}

/// One unit of desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub identity: Identity,
    pub attributes: Attributes,
}

impl Resource {
    pub fn new(identity: Identity, attributes: Attributes) -> Self {
        Self {
            identity,
            attributes,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.identity.kind
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        format!(
            "{} {} ({})",
            self.identity.kind, self.identity.name, self.attributes.ensure
        )
    }

    /// Check that the attributes required for this kind are present
    pub fn validate(&self) -> GraphResult<()> {
        let attrs = &self.attributes;
        let invalid = |reason: &str| {
            Err(Error::InvalidAttributes {
                identity: self.identity.clone(),
                reason: reason.to_string(),
            })
        };

        if self.identity.name.trim().is_empty() {
            return invalid("name must not be empty");
        }
        if attrs.mode.is_some_and(|m| m > 0o7777) {
            return invalid("mode must be at most 07777");
        }
        if attrs.ensure.is_absent() {
            return Ok(());
        }

        match self.identity.kind {
            ResourceKind::File => {
                if attrs.ensure == Ensure::File && attrs.content.is_none() {
                    return invalid("ensure=file requires content or a content source");
                }
                if attrs.ensure == Ensure::Directory {
                    return invalid("file resources cannot ensure a directory");
                }
            }
            ResourceKind::Directory => {
                if attrs.ensure != Ensure::Directory {
                    return invalid("directory resources must ensure=directory or absent");
                }
            }
            ResourceKind::VcsRepo => {
                if attrs.source.as_deref().is_none_or(|s| s.trim().is_empty()) {
                    return invalid("checkouts require a source URL");
                }
            }
            ResourceKind::Cron => {
                for key in ["command", "user"] {
                    if attrs.get_param(key).is_none_or(|v| v.trim().is_empty()) {
                        return invalid(&format!("cron jobs require '{key}'"));
                    }
                }
            }
            ResourceKind::User
            | ResourceKind::Package
            | ResourceKind::PipPackage
            | ResourceKind::Include => {}
        }

        Ok(())
    }

    /// Canonical one-line summary of every managed attribute
    ///
    /// Literal content is summarised by its digest so secrets never end up
    /// in reports.
    pub fn summary(&self) -> String {
        let attrs = &self.attributes;
        let mut parts = vec![format!("ensure={}", attrs.ensure)];
        if let Some(owner) = &attrs.owner {
            parts.push(format!("owner={owner}"));
        }
        if let Some(group) = &attrs.group {
            parts.push(format!("group={group}"));
        }
        if let Some(mode) = attrs.mode {
            parts.push(format!("mode={mode:04o}"));
        }
        match &attrs.content {
            Some(Content::Literal(text)) => {
                parts.push(format!("content={}", content_digest(text.as_bytes())));
            }
            Some(Content::Source(path)) => parts.push(format!("source={}", path.display())),
            None => {}
        }
        if let Some(source) = &attrs.source {
            parts.push(format!("source={source}"));
        }
        if let Some(provider) = &attrs.provider {
            parts.push(format!("provider={provider}"));
        }
        for (key, value) in &attrs.params {
            parts.push(format!("{key}={value}"));
        }
        parts.join(" ")
    }

    /// Desired state derived from the attributes alone
    pub fn desired_state(&self) -> ResourceState {
        if self.attributes.ensure.is_absent() {
            ResourceState::Absent
        } else {
            ResourceState::Present {
                details: Some(self.summary()),
            }
        }
    }

    /// Every attribute rendered as a string, keyed by attribute name
    ///
    /// Modes are rendered in four-digit octal (`0600`); literal content is
    /// returned verbatim.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        let attrs = &self.attributes;
        let mut map = BTreeMap::new();
        map.insert("ensure".to_string(), attrs.ensure.to_string());
        if let Some(owner) = &attrs.owner {
            map.insert("owner".to_string(), owner.clone());
        }
        if let Some(group) = &attrs.group {
            map.insert("group".to_string(), group.clone());
        }
        if let Some(mode) = attrs.mode {
            map.insert("mode".to_string(), format!("{mode:04o}"));
        }
        match &attrs.content {
            Some(Content::Literal(text)) => {
                map.insert("content".to_string(), text.clone());
            }
            Some(Content::Source(path)) => {
                map.insert("content_source".to_string(), path.display().to_string());
            }
            None => {}
        }
        if let Some(source) = &attrs.source {
            map.insert("source".to_string(), source.clone());
        }
        if let Some(provider) = &attrs.provider {
            map.insert("provider".to_string(), provider.clone());
        }
        for (key, value) in &attrs.params {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

/// Capability interface for one resource kind
///
/// Implementations observe and converge resources on the target host.
/// `apply` is only called when `probe` and `desired_state` disagree, and
/// must be safe to call again after a partial failure.
pub trait Provider: Send + Sync {
    /// Observe the current state of the resource
    fn probe(&self, resource: &Resource) -> Result<ResourceState>;

    /// The state `probe` reports once the resource has converged
    ///
    /// Providers that derive part of the desired state from the host
    /// (e.g. hashing a content source) override this.
    fn desired_state(&self, resource: &Resource) -> Result<ResourceState> {
        Ok(resource.desired_state())
    }

    /// Perform the minimal change that converges the resource
    fn apply(&self, resource: &Resource, ctx: &ApplyContext) -> Result<ApplyResult>;
}

/// Lookup from resource kind to the provider that manages it
pub trait ProviderSet: Send + Sync {
    fn provider_for(&self, kind: ResourceKind) -> Option<&dyn Provider>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, attrs: Attributes) -> Resource {
        Resource::new(Identity::new(ResourceKind::File, name), attrs)
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new(ResourceKind::VcsRepo, "/home/confcollect/src/git_repo");
        assert_eq!(id.to_string(), "vcsrepo:/home/confcollect/src/git_repo");
    }

    #[test]
    fn test_kind_parse_roundtrips_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("service"), None);
    }

    #[test]
    fn test_file_requires_content() {
        let err = file("/etc/motd", Attributes::new(Ensure::File))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributes { .. }));

        assert!(
            file("/etc/motd", Attributes::new(Ensure::File).content("hi"))
                .validate()
                .is_ok()
        );
        assert!(file("/etc/motd", Attributes::new(Ensure::Absent)).validate().is_ok());
    }

    #[test]
    fn test_checkout_requires_source() {
        let repo = Resource::new(
            Identity::new(ResourceKind::VcsRepo, "/srv/repo"),
            Attributes::new(Ensure::Latest),
        );
        assert!(repo.validate().is_err());
    }

    #[test]
    fn test_cron_requires_command_and_user() {
        let cron = Resource::new(
            Identity::new(ResourceKind::Cron, "getconfs"),
            Attributes::new(Ensure::Present).param("command", "/bin/true"),
        );
        let err = cron.validate().unwrap_err();
        assert!(err.to_string().contains("'user'"));
    }

    #[test]
    fn test_mode_out_of_range() {
        let res = file("/x", Attributes::new(Ensure::File).content("").mode(0o17777));
        assert!(res.validate().is_err());
    }

    #[test]
    fn test_summary_hides_literal_content() {
        let res = file(
            "/home/confcollect/.ssh/id_rsa",
            Attributes::new(Ensure::File).content("secret").mode(0o600),
        );
        let summary = res.summary();
        assert!(summary.contains("mode=0600"));
        assert!(!summary.contains("secret"));
        assert!(summary.contains(&content_digest(b"secret")));
    }

    #[test]
    fn test_attribute_map_renders_mode_and_content() {
        let res = file(
            "/home/confcollect/.ssh/id_rsa",
            Attributes::new(Ensure::File)
                .content("foo")
                .mode(0o600)
                .owned_by("confcollect"),
        );
        let map = res.attribute_map();
        assert_eq!(map["mode"], "0600");
        assert_eq!(map["content"], "foo");
        assert_eq!(map["owner"], "confcollect");
        assert_eq!(map["ensure"], "file");
    }

    #[test]
    fn test_absent_desired_state() {
        let res = file("/x", Attributes::new(Ensure::Absent));
        assert_eq!(res.desired_state(), ResourceState::Absent);
    }
}
