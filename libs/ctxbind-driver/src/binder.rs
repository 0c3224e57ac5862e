//! Pushes the caller's security token into the database session.

use std::sync::Arc;

use ctxbind_security::encode_transport;

use crate::backend::Connection;
use crate::error::{BindError, Error};
use crate::token_source::TokenSource;

/// Session variable read by the server-side row policies. Fixed contract with
/// the policy layer.
pub const SESSION_TOKEN_VARIABLE: &str = "ctxbind.token";

/// The `SET` command carrying `encoded`.
///
/// Transport encoding is standard base64, which never contains a quote.
#[must_use]
pub fn set_token_sql(encoded: &str) -> String {
    format!("SET {SESSION_TOKEN_VARIABLE} = '{encoded}'")
}

/// Binds the token of one [`TokenSource`] before each execution.
///
/// Holds no token state: each [`ContextBinder::bind`] resolves afresh.
pub struct ContextBinder {
    source: Arc<dyn TokenSource>,
}

impl ContextBinder {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn TokenSource> {
        &self.source
    }

    /// Resolve a token and `SET` it on `connection`.
    ///
    /// Uses a throwaway statement created on the real connection and closed
    /// right after, never an intercepted one.
    ///
    /// # Errors
    /// [`BindError`] if the token cannot be resolved or encoded, or the `SET`
    /// statement fails. Callers must not execute anything after an error.
    pub async fn bind(&self, connection: &dyn Connection) -> Result<(), BindError> {
        let result = self.bind_inner(connection).await;
        if let Err(e) = &result {
            tracing::error!(
                token_provider = self.source.name(),
                error = %e,
                "security context bind failed; statement not executed"
            );
        }
        result
    }

    async fn bind_inner(&self, connection: &dyn Connection) -> Result<(), BindError> {
        let token = self.source.resolve().await?;
        let encoded = encode_transport(&token)?;

        let mut stmt = connection
            .create_statement()
            .await
            .map_err(statement_error)?;
        let executed = stmt.execute(&set_token_sql(&encoded)).await;
        let closed = stmt.close();
        executed.map_err(statement_error)?;
        closed.map_err(statement_error)?;

        tracing::debug!(
            subject = token.subject_id(),
            variable = SESSION_TOKEN_VARIABLE,
            token_provider = self.source.name(),
            "security context bound"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ContextBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBinder")
            .field("token_provider", &self.source.name())
            .finish()
    }
}

fn statement_error(e: Error) -> BindError {
    BindError::Statement(Box::new(e))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use async_trait::async_trait;
    use ctxbind_security::{SecurityToken, SubjectType, decode_transport};

    use super::*;
    use crate::backend::Driver;
    use crate::error::TokenError;
    use crate::memory::MemoryDriver;
    use crate::properties::Properties;

    struct Stub(Option<SecurityToken>);

    #[async_trait]
    impl TokenSource for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        async fn resolve(&self) -> Result<SecurityToken, TokenError> {
            self.0
                .clone()
                .ok_or_else(|| TokenError::Unavailable("no caller".to_owned()))
        }
    }

    fn token(subject: &str) -> SecurityToken {
        SecurityToken::builder()
            .subject_id(subject)
            .subject_type(SubjectType::User)
            .authorizations(["U"])
            .issuer("test")
            .build()
    }

    async fn connect(driver: &MemoryDriver) -> Arc<dyn Connection> {
        driver
            .connect("memory://binder", &Properties::new())
            .await
            .unwrap()
    }

    #[test]
    fn set_sql_names_the_session_variable() {
        assert_eq!(set_token_sql("YWJj"), "SET ctxbind.token = 'YWJj'");
    }

    #[tokio::test]
    async fn bind_sets_the_encoded_token() {
        let driver = MemoryDriver::new();
        let conn = connect(&driver).await;
        let binder = ContextBinder::new(Arc::new(Stub(Some(token("alice")))));

        binder.bind(conn.as_ref()).await.unwrap();

        let value = driver.connections()[0]
            .session_variable(SESSION_TOKEN_VARIABLE)
            .unwrap();
        assert_eq!(decode_transport(&value).unwrap(), token("alice"));
        assert_eq!(driver.statements_opened(), 1);
        assert_eq!(driver.statements_closed(), 1);
    }

    #[tokio::test]
    async fn unresolved_token_issues_no_set() {
        let driver = MemoryDriver::new();
        let conn = connect(&driver).await;
        let binder = ContextBinder::new(Arc::new(Stub(None)));

        let err = binder.bind(conn.as_ref()).await.unwrap_err();

        assert!(matches!(err, BindError::Token(TokenError::Unavailable(_))));
        assert!(driver.journal().is_empty());
        assert_eq!(driver.statements_opened(), 0);
    }

    #[tokio::test]
    async fn failed_set_closes_the_throwaway_statement() {
        let driver = MemoryDriver::new();
        driver.fail_on_prefix("SET");
        let conn = connect(&driver).await;
        let binder = ContextBinder::new(Arc::new(Stub(Some(token("alice")))));

        let err = binder.bind(conn.as_ref()).await.unwrap_err();

        assert!(matches!(err, BindError::Statement(_)));
        assert_eq!(driver.statements_closed(), 1);
        assert!(
            driver.connections()[0]
                .session_variable(SESSION_TOKEN_VARIABLE)
                .is_none()
        );
    }
}
