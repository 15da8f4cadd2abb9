//! Error types for the planner.
//!
//! Planning never recovers from an error internally: every variant here is
//! surfaced to the caller and, from the CLI, ends the process with a non-zero
//! exit code. Graph-level problems (duplicate or unbuildable targets) are
//! collected separately, see [`crate::workflow::validator`].

use thiserror::Error;

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Planner error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A date token that is not `YYYY`, `YYYYMM` or `YYYYMMDD`, or names an
    /// impossible calendar date.
    #[error("Invalid date token: '{0}'")]
    InvalidDate(String),

    /// Two date tokens of different precision used in one operation.
    #[error("Date tokens '{0}' and '{1}' have different lengths")]
    DateMismatch(String, String),

    /// A range that cannot be produced (reversed bounds, zero step, window
    /// longer than the available history, malformed `[a:b:c]` expression).
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// An attribute string rejected by the attribute grammar.
    #[error("Invalid attribute string: '{0}'")]
    InvalidAttribute(String),

    /// A command or step argument with the wrong shape.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A request that violates the contract of the path service or of a
    /// configuration (target without member, forecast without models, ...).
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Configuration variant not present in the registry.
    #[error("Unknown configuration '{0}'")]
    UnknownConfig(String),

    /// Configuration options that could not be applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template key not present in the substitution dictionary.
    #[error("Missing substitution key '{key}' in token '{token}'")]
    Template { key: String, token: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Contract`] violation.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Shorthand for an [`Error::InvalidArgument`].
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
