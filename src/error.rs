//! Errors raised while turning parameters and facts into a graph.

use thiserror::Error;

/// Configuration errors from composition
///
/// All of these surface before anything touches the target host.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The OS family has no capability set
    #[error("unsupported platform: os family '{family}' (supported: Debian, RedHat)")]
    UnsupportedPlatform { family: String },

    /// A parameter failed validation
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The getconfs settings mapping is malformed
    #[error("invalid getconfs settings: {0}")]
    InvalidSettings(String),

    /// The composed graph is inconsistent
    #[error(transparent)]
    Graph(#[from] declarative::Error),
}

impl ComposeError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
