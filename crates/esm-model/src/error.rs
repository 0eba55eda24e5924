//! Build-time error types.

use esm_core::EsmError;
use thiserror::Error;

/// Errors raised while a model is assembled.
///
/// Every variant is fatal: the build stops at the first error and no partial
/// model is returned. Solver outcomes are not errors, see
/// [`SolveStatus`](crate::SolveStatus).
#[derive(Debug, Error)]
pub enum ModelError {
    /// Malformed or contradictory attributes found while building
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Declared feature without a formulation
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Error raised by the topology layer
    #[error(transparent)]
    Topology(#[from] EsmError),

    /// Model configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Model configuration could not be parsed
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ModelError {
    pub fn config(message: impl Into<String>) -> Self {
        ModelError::Configuration(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        ModelError::Unsupported(message.into())
    }

    /// True for configuration errors, including those raised by the topology layer.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModelError::Configuration(_) | ModelError::Topology(EsmError::Configuration(_))
        )
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ModelError::Unsupported(_))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
