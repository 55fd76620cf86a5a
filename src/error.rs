//! # Error Types
//!
//! Crate-level error returned by every training entry point. Kernel and I/O
//! failures are wrapped so callers only match on one enum.

use crate::tensor::{TensorData, TensorError};
use crate::utils::serialization::SerializationError;

/// Result alias for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Errors that stop a training run (or reject its configuration).
#[derive(thiserror::Error, Debug)]
pub enum TrainingError {
    /// Invalid setting or collaborator that cannot be trained.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A norm crossed its error limit.
    #[error("Numerical divergence: {quantity} is {value:e}, error limit is {limit:e}")]
    Divergence {
        quantity: &'static str,
        value: TensorData,
        limit: TensorData,
    },

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl TrainingError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        TrainingError::Configuration(message.into())
    }
}
