use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{CallableStatement, Connection, PreparedStatement, Statement};
use crate::binder::ContextBinder;
use crate::diagnostics::warn_on_session_change;
use crate::error::Error;
use crate::statement::InterceptedStatement;
use crate::token_source::TokenSource;

/// A real connection paired with the token source chosen when it was opened.
///
/// Every statement it hands out is an [`InterceptedStatement`] sharing this
/// connection's binder. The real connection is never exposed.
pub struct BoundConnection {
    inner: Arc<dyn Connection>,
    binder: Arc<ContextBinder>,
}

impl BoundConnection {
    #[must_use]
    pub fn new(inner: Arc<dyn Connection>, binder: Arc<ContextBinder>) -> Self {
        Self { inner, binder }
    }

    #[must_use]
    pub fn token_source(&self) -> &Arc<dyn TokenSource> {
        self.binder.source()
    }
}

impl std::fmt::Debug for BoundConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundConnection")
            .field("binder", &self.binder)
            .field("closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for BoundConnection {
    async fn create_statement(&self) -> Result<Box<dyn Statement>, Error> {
        let stmt = self.inner.create_statement().await?;
        Ok(Box::new(InterceptedStatement::new(stmt, self.binder.clone())))
    }

    async fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, Error> {
        warn_on_session_change(sql);
        let stmt = self.inner.prepare_statement(sql).await?;
        Ok(Box::new(InterceptedStatement::new(stmt, self.binder.clone())))
    }

    async fn prepare_call(&self, sql: &str) -> Result<Box<dyn CallableStatement>, Error> {
        warn_on_session_change(sql);
        let stmt = self.inner.prepare_call(sql).await?;
        Ok(Box::new(InterceptedStatement::new(stmt, self.binder.clone())))
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), Error> {
        self.inner.set_auto_commit(auto_commit).await
    }

    fn auto_commit(&self) -> bool {
        self.inner.auto_commit()
    }

    async fn commit(&self) -> Result<(), Error> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<(), Error> {
        self.inner.rollback().await
    }

    async fn close(&self) -> Result<(), Error> {
        tracing::debug!("closing bound connection");
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
