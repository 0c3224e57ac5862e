//! Client implementation for the static identity service plugin.
//!
//! Implements `IdentityServiceClient` using the domain service.

use async_trait::async_trait;
use ctxbind_security::SecurityToken;
use identity_service_sdk::{IdentityServiceClient, IdentityServiceError};

use super::service::Service;

#[async_trait]
impl IdentityServiceClient for Service {
    async fn fetch_caller_token(
        &self,
        principal: &str,
    ) -> Result<SecurityToken, IdentityServiceError> {
        self.caller_token(principal)
    }

    async fn fetch_app_token(&self) -> Result<SecurityToken, IdentityServiceError> {
        Ok(self.app_token())
    }

    async fn validate_token(
        &self,
        token: &SecurityToken,
    ) -> Result<SecurityToken, IdentityServiceError> {
        self.validate(token)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::StaticIdentityPluginConfig;

    #[tokio::test]
    async fn client_trait_round_trips_app_token_through_validation() {
        let service = Service::from_config(&StaticIdentityPluginConfig::default());
        let client: &dyn IdentityServiceClient = &service;

        let token = client.fetch_app_token().await.unwrap();
        let validated = client.validate_token(&token).await.unwrap();
        assert_eq!(validated, token);
    }

    #[tokio::test]
    async fn client_trait_empty_principal_is_unknown() {
        let service = Service::from_config(&StaticIdentityPluginConfig::default());
        let client: &dyn IdentityServiceClient = &service;

        let result = client.fetch_caller_token("").await;
        match result.unwrap_err() {
            IdentityServiceError::UnknownPrincipal(_) => {}
            other => panic!("Expected UnknownPrincipal, got: {other:?}"),
        }
    }
}
