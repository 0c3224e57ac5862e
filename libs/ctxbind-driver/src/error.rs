//! Error types for the binding driver.
//!
//! Three failure classes reach callers:
//! - [`Error::Configuration`] at connection-open time (bad URL, unknown or
//!   incomplete token provider selection);
//! - [`Error::Bind`] at execution time, when the security context could not be
//!   established and the statement was therefore never sent;
//! - [`Error::Driver`] for everything the real driver reports, untouched.

use ctxbind_security::SecTokenEncodeError;
use identity_service_sdk::IdentityServiceError;
use thiserror::Error;

/// Boxed error produced by a real driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("driver error: {0}")]
    Driver(#[source] BoxError),
}

impl Error {
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    #[must_use]
    pub fn driver(err: impl Into<BoxError>) -> Self {
        Self::Driver(err.into())
    }

    /// Whether this error means the statement was withheld because the
    /// security context could not be bound.
    #[must_use]
    pub fn is_bind_failure(&self) -> bool {
        matches!(self, Self::Bind(_))
    }
}

/// Failure to establish the session security context before a statement.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("security context bind failed: {0}")]
    Token(#[from] TokenError),

    #[error("security context bind failed: cannot encode token: {0}")]
    Encode(#[from] SecTokenEncodeError),

    #[error("security context bind failed: {0}")]
    Statement(#[source] Box<Error>),
}

/// Failure of a token source to produce a token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("security token unavailable: {0}")]
    Unavailable(String),

    #[error("security token invalid: {0}")]
    Invalid(String),
}

impl From<IdentityServiceError> for TokenError {
    fn from(e: IdentityServiceError) -> Self {
        match e {
            IdentityServiceError::Rejected(reason) => Self::Invalid(reason),
            other @ (IdentityServiceError::UnknownPrincipal(_)
            | IdentityServiceError::Unavailable(_)
            | IdentityServiceError::Internal(_)) => Self::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn rejected_tokens_map_to_invalid() {
        let err = TokenError::from(IdentityServiceError::Rejected("expired".to_owned()));
        assert!(matches!(err, TokenError::Invalid(ref r) if r == "expired"));
    }

    #[test]
    fn service_failures_map_to_unavailable() {
        for e in [
            IdentityServiceError::Unavailable("down".to_owned()),
            IdentityServiceError::UnknownPrincipal("bob".to_owned()),
            IdentityServiceError::Internal("boom".to_owned()),
        ] {
            assert!(matches!(TokenError::from(e), TokenError::Unavailable(_)));
        }
    }

    #[test]
    fn bind_errors_are_flagged() {
        let err = Error::from(BindError::Token(TokenError::Unavailable("x".to_owned())));
        assert!(err.is_bind_failure());
        assert!(err.to_string().contains("security token unavailable"));
        assert!(!Error::config("bad").is_bind_failure());
    }
}
