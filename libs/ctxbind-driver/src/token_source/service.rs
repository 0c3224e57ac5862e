use std::sync::Arc;

use async_trait::async_trait;
use ctxbind_security::SecurityToken;
use identity_service_sdk::IdentityServiceClient;

use super::{SERVICE_IDENTITY_SOURCE, TokenSource};
use crate::error::TokenError;

/// Token for the connecting application itself, with no end user.
pub struct ServiceIdentitySource {
    identity: Arc<dyn IdentityServiceClient>,
}

impl ServiceIdentitySource {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityServiceClient>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl TokenSource for ServiceIdentitySource {
    fn name(&self) -> &str {
        SERVICE_IDENTITY_SOURCE
    }

    async fn resolve(&self) -> Result<SecurityToken, TokenError> {
        Ok(self.identity.fetch_app_token().await?)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use ctxbind_security::SubjectType;
    use static_identity_plugin::{StaticIdentityPluginConfig, StaticIdentityService};

    use super::*;

    #[tokio::test]
    async fn mints_application_token() {
        let cfg = StaticIdentityPluginConfig {
            application_id: "billing".to_owned(),
            ..StaticIdentityPluginConfig::default()
        };
        let source = ServiceIdentitySource::new(Arc::new(StaticIdentityService::from_config(&cfg)));

        let token = source.resolve().await.unwrap();
        assert_eq!(token.subject_id(), "billing");
        assert_eq!(token.subject_type(), SubjectType::App);
    }
}
