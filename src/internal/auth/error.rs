//! Error types for credential acquisition.

use thiserror::Error;

/// Errors raised while acquiring an access token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No account is signed in, so no acquisition was attempted.
    #[error("No account available for token acquisition")]
    NoAccount,

    /// The non-interactive path failed. Recovered by the interactive fallback.
    #[error("Silent token acquisition failed: {0}")]
    Silent(String),

    /// The interactive path failed. Terminal for the current request.
    #[error("{0}")]
    Interactive(String),
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;
