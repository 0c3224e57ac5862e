//! Client trait for the identity service.

use async_trait::async_trait;
use ctxbind_security::SecurityToken;

use crate::error::IdentityServiceError;

/// Operations the driver needs from the identity service.
///
/// One handle is shared by every connection opened through a driver instance,
/// so implementations must be safe to call concurrently.
///
/// # Security
///
/// Implementations are the only place tokens are minted. The driver never
/// builds token content itself; it only transports what this service returns.
#[async_trait]
pub trait IdentityServiceClient: Send + Sync {
    /// Fetch a token for an end user the calling application acts on behalf of.
    ///
    /// # Arguments
    ///
    /// * `principal` - The caller's principal name as established upstream
    ///
    /// # Errors
    ///
    /// - `UnknownPrincipal` if the service does not know the principal
    /// - `Unavailable` if the service cannot be reached
    /// - `Internal` for unexpected errors
    async fn fetch_caller_token(
        &self,
        principal: &str,
    ) -> Result<SecurityToken, IdentityServiceError>;

    /// Fetch a token representing the connecting application itself.
    ///
    /// # Errors
    ///
    /// - `Unavailable` if the service cannot be reached
    /// - `Internal` for unexpected errors
    async fn fetch_app_token(&self) -> Result<SecurityToken, IdentityServiceError>;

    /// Validate a previously issued token and return it, refreshed if the
    /// service chooses to.
    ///
    /// # Errors
    ///
    /// - `Rejected` if the token is expired, revoked, or not issued by this service
    /// - `Unavailable` if the service cannot be reached
    async fn validate_token(
        &self,
        token: &SecurityToken,
    ) -> Result<SecurityToken, IdentityServiceError>;
}
