//! Platform facts and per-family capabilities
//!
//! Facts are detected once per run (or supplied in the config file) and
//! never change afterwards. Everything that differs between OS families is
//! looked up here once, through [`Capabilities::for_family`], instead of
//! being branched on throughout composition.

use crate::error::ComposeError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// OS family of the target host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsFamily {
    Debian,
    RedHat,
    /// Anything else, keeping the name that was reported
    Unsupported(String),
}

impl OsFamily {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl From<String> for OsFamily {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "debian" => Self::Debian,
            "redhat" => Self::RedHat,
            _ => Self::Unsupported(name),
        }
    }
}

impl From<OsFamily> for String {
    fn from(family: OsFamily) -> Self {
        family.to_string()
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debian => f.write_str("Debian"),
            Self::RedHat => f.write_str("RedHat"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// Facts about the target host, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFacts {
    pub os_family: OsFamily,
    pub kernel: String,
    pub architecture: String,
    pub os_release: String,
    #[serde(default)]
    pub operating_system: Option<String>,
}

impl PlatformFacts {
    /// Detect facts for the machine we are running on
    pub fn detect() -> Result<Self> {
        let kernel = kernel_name(std::env::consts::OS);
        let architecture = std::env::consts::ARCH.to_string();

        if kernel != "Linux" || !Path::new(OS_RELEASE).exists() {
            log::debug!("No {OS_RELEASE}; treating {kernel} as its own family");
            return Ok(Self {
                os_family: OsFamily::Unsupported(kernel.clone()),
                kernel,
                architecture,
                os_release: String::new(),
                operating_system: None,
            });
        }

        let content = std::fs::read_to_string(OS_RELEASE)
            .with_context(|| format!("Could not read {OS_RELEASE}"))?;
        Ok(Self::from_os_release(&content, &kernel, &architecture))
    }

    /// Build facts from the contents of an os-release file
    pub fn from_os_release(content: &str, kernel: &str, architecture: &str) -> Self {
        let fields = parse_os_release(content);
        let id = fields.get("ID").cloned().unwrap_or_default();
        let id_like = fields.get("ID_LIKE").cloned().unwrap_or_default();

        Self {
            os_family: family_from_ids(&id, &id_like),
            kernel: kernel.to_string(),
            architecture: architecture.to_string(),
            os_release: fields.get("VERSION_ID").cloned().unwrap_or_default(),
            operating_system: fields.get("NAME").cloned(),
        }
    }
}

fn kernel_name(os: &str) -> String {
    match os {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        other => other.to_string(),
    }
}

/// Parse `KEY=value` lines, dropping comments and surrounding quotes
fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn family_from_ids(id: &str, id_like: &str) -> OsFamily {
    let ids: Vec<&str> = std::iter::once(id)
        .chain(id_like.split_whitespace())
        .collect();

    if ids.iter().any(|i| matches!(*i, "debian" | "ubuntu")) {
        OsFamily::Debian
    } else if ids
        .iter()
        .any(|i| matches!(*i, "rhel" | "centos" | "fedora" | "rocky" | "almalinux"))
    {
        OsFamily::RedHat
    } else if id.is_empty() {
        OsFamily::Unsupported("unknown".to_string())
    } else {
        OsFamily::Unsupported(id.to_string())
    }
}

/// Native package manager of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Yum,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Yum => "yum",
        }
    }
}

/// Everything composition and the host providers need to know about a family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub package_manager: PackageManager,
    /// Packages that make up the `git` class
    pub git_packages: Vec<&'static str>,
    /// Packages that make up the `python` class
    pub python_packages: Vec<&'static str>,
    /// Other tooling the role needs
    pub tool_packages: Vec<&'static str>,
    /// Interpreter used to create the virtualenv
    pub python: &'static str,
}

impl Capabilities {
    /// Capability set for a family, or `UnsupportedPlatform`
    pub fn for_family(family: &OsFamily) -> Result<Self, ComposeError> {
        match family {
            OsFamily::Debian => Ok(Self {
                package_manager: PackageManager::Apt,
                git_packages: vec!["git"],
                python_packages: vec!["python3", "python3-pip", "python3-venv"],
                tool_packages: vec!["wget", "cron", "logrotate"],
                python: "/usr/bin/python3",
            }),
            OsFamily::RedHat => Ok(Self {
                package_manager: PackageManager::Yum,
                git_packages: vec!["git"],
                python_packages: vec!["python3", "python3-pip"],
                tool_packages: vec!["wget", "cronie", "logrotate"],
                python: "/usr/bin/python3",
            }),
            OsFamily::Unsupported(name) => Err(ComposeError::UnsupportedPlatform {
                family: name.clone(),
            }),
        }
    }
}
