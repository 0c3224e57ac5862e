//! Token attached to the current task by an upstream authentication layer.
//!
//! ```ignore
//! use ctxbind_driver::token_source::ambient::{self, AmbientCaller};
//!
//! ambient::scope(AmbientCaller::Principal("alice".into()), async {
//!     stmt.execute_query("SELECT * FROM reports").await
//! })
//! .await?;
//! ```

use std::future::Future;

use async_trait::async_trait;
use ctxbind_security::SecurityToken;

use super::{AMBIENT_CONTEXT_SOURCE, TokenSource};
use crate::error::TokenError;
use crate::identity::IdentityHandle;

/// Who the current task is acting for.
#[derive(Debug, Clone)]
pub enum AmbientCaller {
    /// Already authenticated; bound as is.
    Token(SecurityToken),
    /// Authenticated principal name; the identity service mints its token.
    Principal(String),
}

tokio::task_local! {
    static CALLER: AmbientCaller;
}

/// Run `f` with `caller` as the ambient caller.
pub async fn scope<F: Future>(caller: AmbientCaller, f: F) -> F::Output {
    CALLER.scope(caller, f).await
}

/// The ambient caller of the current task, if one is set.
#[must_use]
pub fn current() -> Option<AmbientCaller> {
    CALLER.try_with(Clone::clone).ok()
}

/// Reads the caller from the task-local scope on every resolve.
pub struct AmbientContextSource {
    identity: IdentityHandle,
}

impl AmbientContextSource {
    #[must_use]
    pub fn new(identity: IdentityHandle) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl TokenSource for AmbientContextSource {
    fn name(&self) -> &str {
        AMBIENT_CONTEXT_SOURCE
    }

    async fn resolve(&self) -> Result<SecurityToken, TokenError> {
        match current() {
            Some(AmbientCaller::Token(token)) => Ok(token),
            Some(AmbientCaller::Principal(principal)) => {
                let client = self
                    .identity
                    .client()
                    .map_err(|e| TokenError::Unavailable(e.to_string()))?;
                Ok(client.fetch_caller_token(&principal).await?)
            }
            None => Err(TokenError::Unavailable(
                "no caller in the ambient context".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use identity_service_sdk::IdentityServiceClient;
    use static_identity_plugin::{StaticIdentityPluginConfig, StaticIdentityService};

    use super::*;
    use crate::identity::IdentityServiceCell;
    use crate::properties::Properties;

    fn source_with_static_identity() -> AmbientContextSource {
        let svc = StaticIdentityService::from_config(&StaticIdentityPluginConfig::default());
        let cell = IdentityServiceCell::with_client(Arc::new(svc) as Arc<dyn IdentityServiceClient>);
        AmbientContextSource::new(IdentityHandle::new(Arc::new(cell), Properties::new()))
    }

    #[tokio::test]
    async fn empty_context_is_unavailable() {
        let source = source_with_static_identity();
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, TokenError::Unavailable(_)));
    }

    #[tokio::test]
    async fn token_in_context_is_returned_verbatim() {
        let source = source_with_static_identity();
        let token = SecurityToken::builder().subject_id("carol").build();

        let resolved = scope(AmbientCaller::Token(token.clone()), source.resolve())
            .await
            .unwrap();
        assert_eq!(resolved, token);
    }

    #[tokio::test]
    async fn principal_in_context_is_minted_by_identity_service() {
        let source = source_with_static_identity();

        let resolved = scope(
            AmbientCaller::Principal("dave".to_owned()),
            source.resolve(),
        )
        .await
        .unwrap();
        assert_eq!(resolved.subject_id(), "dave");
    }

    #[tokio::test]
    async fn identity_not_needed_for_token_callers() {
        let cell = Arc::new(IdentityServiceCell::unconfigured());
        let source = AmbientContextSource::new(IdentityHandle::new(cell.clone(), Properties::new()));
        let token = SecurityToken::builder().subject_id("erin").build();

        assert!(scope(AmbientCaller::Token(token), source.resolve()).await.is_ok());

        let err = scope(AmbientCaller::Principal("erin".to_owned()), source.resolve())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Unavailable(_)));
    }
}
