//! Error types for the authorization engine
//!
//! Only failures of the engine itself are Rust errors. Failures while
//! evaluating an expression are ordinary error values (see [`crate::value`]).

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Document could not be parsed or is structurally unusable
    #[error("Invalid document {name}: {reason}")]
    InvalidDocument { name: String, reason: String },

    /// Target uses a construct that is not allowed in targets
    #[error("Invalid target: {0}")]
    TargetValidation(String),

    /// The retrieval point no longer consumes updates
    #[error("Document update channel closed")]
    UpdateChannelClosed,
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
