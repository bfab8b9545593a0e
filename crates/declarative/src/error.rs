//! Configuration errors raised while building or validating a graph.
//!
//! Every variant here is detected before anything touches the target host.
//! Per-resource runtime failures are not errors in this sense; they are
//! recorded as [`ApplyResult`](crate::ApplyResult) values instead.

use crate::resource::Identity;
use thiserror::Error;

/// Errors raised by graph construction and validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The identity is already registered with different attributes
    #[error("duplicate resource {identity}: already declared with different attributes")]
    DuplicateIdentity {
        /// Identity that was declared twice
        identity: Identity,
    },

    /// Required attributes for the resource kind are missing or malformed
    #[error("invalid attributes for {identity}: {reason}")]
    InvalidAttributes {
        /// Offending resource
        identity: Identity,
        /// What is wrong with it
        reason: String,
    },

    /// An edge endpoint is not a registered resource
    #[error("unknown resource {identity}")]
    UnknownIdentity {
        /// Identity that was referenced but never declared
        identity: Identity,
    },

    /// The ordering constraints cannot be satisfied
    #[error("dependency cycle between {}", format_identities(.identities))]
    CycleDetected {
        /// Resources that sit on a cycle, in declaration order
        identities: Vec<Identity>,
    },
}

fn format_identities(identities: &[Identity]) -> String {
    identities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
