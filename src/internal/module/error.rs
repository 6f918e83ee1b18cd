//! Error types for loading and invoking the execution unit.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to bring the execution unit up.
///
/// `Clone` because a single failed attempt is reported to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleError {
    /// The artifact could not be located.
    #[error("Execution unit artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    /// The artifact was located but could not be fetched.
    #[error("Failed to fetch execution unit: {0}")]
    Fetch(String),

    /// The activation step did not complete.
    #[error("Failed to activate execution unit: {0}")]
    Activation(String),
}

/// Result type for module lifecycle operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Rejection raised by the execution unit for one invocation.
///
/// The message is the unit's raw error value, which may itself be serialized
/// structured data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvocationError {
    pub message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
