use std::sync::Arc;

use async_trait::async_trait;
use ctxbind_security::{SecurityToken, decode_transport};
use identity_service_sdk::IdentityServiceClient;

use super::{FIXED_TOKEN_SOURCE, TokenSource};
use crate::error::{Error, TokenError};

/// A single pre-issued token, revalidated against the identity service on
/// every resolve.
pub struct FixedTokenSource {
    token: SecurityToken,
    identity: Arc<dyn IdentityServiceClient>,
}

impl FixedTokenSource {
    #[must_use]
    pub fn new(token: SecurityToken, identity: Arc<dyn IdentityServiceClient>) -> Self {
        Self { token, identity }
    }

    /// Source for a transport-encoded token.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `encoded` is not a valid token.
    pub fn from_encoded(
        encoded: &str,
        identity: Arc<dyn IdentityServiceClient>,
    ) -> Result<Self, Error> {
        let token = decode_transport(encoded)
            .map_err(|e| Error::config(format!("malformed explicit token: {e}")))?;
        Ok(Self::new(token, identity))
    }

    #[must_use]
    pub fn token(&self) -> &SecurityToken {
        &self.token
    }
}

#[async_trait]
impl TokenSource for FixedTokenSource {
    fn name(&self) -> &str {
        FIXED_TOKEN_SOURCE
    }

    async fn resolve(&self) -> Result<SecurityToken, TokenError> {
        Ok(self.identity.validate_token(&self.token).await?)
    }
}
