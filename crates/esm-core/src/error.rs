//! Error types for energy system topologies
//!
//! [`EsmError`] covers everything that can go wrong while a topology is being
//! assembled or checked. The model crate wraps it in its own error type so
//! callers can tell configuration problems apart from unsupported features.

use thiserror::Error;

/// Unified error type for topology construction and validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EsmError {
    /// Malformed or contradictory component attributes
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Graph structure errors (unknown nodes, dangling references)
    #[error("Topology error: {0}")]
    Topology(String),
}

impl EsmError {
    /// Shorthand for a [`EsmError::Configuration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        EsmError::Configuration(message.into())
    }
}

/// Convenience type alias for Results using EsmError.
pub type EsmResult<T> = Result<T, EsmError>;
