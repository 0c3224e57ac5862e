//! Statement interceptors.
//!
//! [`InterceptedStatement`] wraps any statement shape. Executing calls bind
//! the security context on the statement's live connection and only then
//! forward; everything else is forwarded untouched. The bind path exists once,
//! in [`InterceptedStatement::bind_context`], and the prepared and callable
//! shapes reuse it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    CallableStatement, Connection, PreparedStatement, PreparedStatementOps, Statement,
    StatementOps,
};
use crate::binder::ContextBinder;
use crate::connection::BoundConnection;
use crate::diagnostics::warn_on_session_change;
use crate::error::Error;
use crate::types::{Column, GeneratedKeys, ResultSet, SqlType, Value};

/// Emit methods that pass straight through to `self.inner`.
macro_rules! forward {
    () => {};
    (fn $name:ident(&self $(, $arg:ident: $ty:ty)*) $(-> $ret:ty)?; $($rest:tt)*) => {
        fn $name(&self $(, $arg: $ty)*) $(-> $ret)? {
            self.inner.$name($($arg),*)
        }
        forward!($($rest)*);
    };
    (fn $name:ident(&mut self $(, $arg:ident: $ty:ty)*) $(-> $ret:ty)?; $($rest:tt)*) => {
        fn $name(&mut self $(, $arg: $ty)*) $(-> $ret)? {
            self.inner.$name($($arg),*)
        }
        forward!($($rest)*);
    };
}

/// A statement whose every execution is preceded by a context bind.
pub struct InterceptedStatement<S: ?Sized> {
    inner: Box<S>,
    binder: Arc<ContextBinder>,
}

impl<S: ?Sized> InterceptedStatement<S> {
    pub(crate) fn new(inner: Box<S>, binder: Arc<ContextBinder>) -> Self {
        Self { inner, binder }
    }
}

impl<S: ?Sized + Statement> InterceptedStatement<S> {
    /// Bind on the connection the wrapped statement reports right now.
    async fn bind_context(&mut self) -> Result<(), Error> {
        let connection = self.inner.connection();
        self.binder.bind(connection.as_ref()).await?;
        Ok(())
    }
}

impl<S: ?Sized + StatementOps> StatementOps for InterceptedStatement<S> {
    forward! {
        fn set_fetch_size(&mut self, rows: usize);
        fn fetch_size(&self) -> usize;
        fn set_max_rows(&mut self, rows: usize);
        fn max_rows(&self) -> usize;
        fn set_query_timeout(&mut self, timeout: Option<Duration>);
        fn query_timeout(&self) -> Option<Duration>;
        fn take_result_set(&mut self) -> Option<ResultSet>;
        fn update_count(&self) -> Option<u64>;
        fn generated_keys(&self) -> Option<ResultSet>;
        fn clear_batch(&mut self);
        fn warnings(&self) -> &[String];
        fn clear_warnings(&mut self);
        fn close(&mut self) -> Result<(), Error>;
        fn is_closed(&self) -> bool;
    }

    fn add_batch(&mut self, sql: &str) -> Result<(), Error> {
        warn_on_session_change(sql);
        self.inner.add_batch(sql)
    }
}

#[async_trait]
impl<S: ?Sized + Statement> Statement for InterceptedStatement<S> {
    /// The live connection, wrapped so statements created from it are
    /// intercepted too.
    fn connection(&self) -> Arc<dyn Connection> {
        Arc::new(BoundConnection::new(
            self.inner.connection(),
            self.binder.clone(),
        ))
    }

    async fn execute(&mut self, sql: &str) -> Result<bool, Error> {
        warn_on_session_change(sql);
        self.bind_context().await?;
        self.inner.execute(sql).await
    }

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet, Error> {
        warn_on_session_change(sql);
        self.bind_context().await?;
        self.inner.execute_query(sql).await
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64, Error> {
        warn_on_session_change(sql);
        self.bind_context().await?;
        self.inner.execute_update(sql).await
    }

    async fn execute_with_keys(
        &mut self,
        sql: &str,
        keys: &GeneratedKeys,
    ) -> Result<bool, Error> {
        warn_on_session_change(sql);
        self.bind_context().await?;
        self.inner.execute_with_keys(sql, keys).await
    }

    async fn execute_update_with_keys(
        &mut self,
        sql: &str,
        keys: &GeneratedKeys,
    ) -> Result<u64, Error> {
        warn_on_session_change(sql);
        self.bind_context().await?;
        self.inner.execute_update_with_keys(sql, keys).await
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, Error> {
        self.bind_context().await?;
        self.inner.execute_batch().await
    }
}

impl<S: ?Sized + PreparedStatementOps> PreparedStatementOps for InterceptedStatement<S> {
    forward! {
        fn set_param(&mut self, index: usize, value: Value) -> Result<(), Error>;
        fn clear_parameters(&mut self);
        fn add_param_batch(&mut self) -> Result<(), Error>;
        fn parameter_count(&self) -> usize;
        fn metadata(&self) -> Option<&[Column]>;
    }
}

#[async_trait]
impl<S: ?Sized + PreparedStatement> PreparedStatement for InterceptedStatement<S> {
    async fn execute_prepared(&mut self) -> Result<bool, Error> {
        self.bind_context().await?;
        self.inner.execute_prepared().await
    }

    async fn execute_prepared_query(&mut self) -> Result<ResultSet, Error> {
        self.bind_context().await?;
        self.inner.execute_prepared_query().await
    }

    async fn execute_prepared_update(&mut self) -> Result<u64, Error> {
        self.bind_context().await?;
        self.inner.execute_prepared_update().await
    }
}

impl<S: ?Sized + CallableStatement> CallableStatement for InterceptedStatement<S> {
    forward! {
        fn register_out_parameter(&mut self, index: usize, sql_type: SqlType) -> Result<(), Error>;
        fn set_named(&mut self, name: &str, value: Value) -> Result<(), Error>;
        fn out_value(&self, index: usize) -> Result<Value, Error>;
        fn out_named(&self, name: &str) -> Result<Value, Error>;
    }
}
