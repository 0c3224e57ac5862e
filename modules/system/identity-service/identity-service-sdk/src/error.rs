//! Error types for the identity service.

use thiserror::Error;

/// Errors that can occur when calling the identity service.
#[derive(Debug, Error)]
pub enum IdentityServiceError {
    /// The token was explicitly refused (expired, revoked, foreign issuer).
    #[error("token rejected: {0}")]
    Rejected(String),

    /// The service has no identity for the requested principal.
    #[error("unknown principal '{0}'")]
    UnknownPrincipal(String),

    /// The service could not be reached or is not ready.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
