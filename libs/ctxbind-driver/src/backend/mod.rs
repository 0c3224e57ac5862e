//! Contract every real SQL driver implements.
//!
//! The statement surface is split in two. The `*Ops` traits hold calls that
//! never send SQL (options, parameters, metadata, closing); the other traits
//! add the calls that execute. The binding layer forwards the former verbatim
//! and intercepts only the latter.
//!
//! Shapes layer the way the driver contract requires:
//! `CallableStatement: PreparedStatement: Statement: StatementOps`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::properties::Properties;
use crate::types::{Column, GeneratedKeys, ResultSet, SqlType, Value};

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod session;

/// A real driver able to open connections for the URLs it accepts.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether this driver handles `url`. Must not fail.
    fn accepts_url(&self, url: &str) -> bool;

    /// Open a connection.
    ///
    /// # Errors
    /// Driver-specific connection failures.
    async fn connect(&self, url: &str, properties: &Properties)
    -> Result<Arc<dyn Connection>, Error>;
}

/// A live database session.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn create_statement(&self) -> Result<Box<dyn Statement>, Error>;

    async fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, Error>;

    async fn prepare_call(&self, sql: &str) -> Result<Box<dyn CallableStatement>, Error>;

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), Error>;

    fn auto_commit(&self) -> bool;

    async fn commit(&self) -> Result<(), Error>;

    async fn rollback(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;

    fn is_closed(&self) -> bool;
}

/// Non-executing statement calls.
pub trait StatementOps: Send {
    fn set_fetch_size(&mut self, rows: usize);

    fn fetch_size(&self) -> usize;

    /// Limit on returned rows; `0` means unlimited.
    fn set_max_rows(&mut self, rows: usize);

    fn max_rows(&self) -> usize;

    fn set_query_timeout(&mut self, timeout: Option<Duration>);

    fn query_timeout(&self) -> Option<Duration>;

    /// Result set of the last execution, if it produced one. Taking it
    /// leaves `None` behind.
    fn take_result_set(&mut self) -> Option<ResultSet>;

    /// Row count of the last execution, if it was an update.
    fn update_count(&self) -> Option<u64>;

    /// Keys generated by the last execution that requested them.
    fn generated_keys(&self) -> Option<ResultSet>;

    /// Queue SQL text for [`Statement::execute_batch`].
    ///
    /// # Errors
    /// Fails on a closed statement.
    fn add_batch(&mut self, sql: &str) -> Result<(), Error>;

    fn clear_batch(&mut self);

    fn warnings(&self) -> &[String];

    fn clear_warnings(&mut self);

    /// # Errors
    /// Driver-specific release failures.
    fn close(&mut self) -> Result<(), Error>;

    fn is_closed(&self) -> bool;
}

/// Executing calls of a plain statement.
#[async_trait]
pub trait Statement: StatementOps {
    /// The connection this statement runs on.
    fn connection(&self) -> Arc<dyn Connection>;

    /// Run `sql`; `true` if the first result is a result set.
    async fn execute(&mut self, sql: &str) -> Result<bool, Error>;

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet, Error>;

    async fn execute_update(&mut self, sql: &str) -> Result<u64, Error>;

    async fn execute_with_keys(&mut self, sql: &str, keys: &GeneratedKeys)
    -> Result<bool, Error>;

    async fn execute_update_with_keys(
        &mut self,
        sql: &str,
        keys: &GeneratedKeys,
    ) -> Result<u64, Error>;

    /// Run everything queued with `add_batch` (or `add_param_batch`), in order.
    async fn execute_batch(&mut self) -> Result<Vec<u64>, Error>;
}

/// Non-executing calls of a prepared statement.
pub trait PreparedStatementOps: StatementOps {
    /// Bind a positional parameter (1-based).
    ///
    /// # Errors
    /// Index out of range or closed statement.
    fn set_param(&mut self, index: usize, value: Value) -> Result<(), Error>;

    fn clear_parameters(&mut self);

    /// Queue the current parameter set for [`Statement::execute_batch`].
    ///
    /// # Errors
    /// Fails on a closed statement.
    fn add_param_batch(&mut self) -> Result<(), Error>;

    fn parameter_count(&self) -> usize;

    /// Result columns, when known before execution.
    fn metadata(&self) -> Option<&[Column]>;
}

/// Executing calls of a prepared statement.
#[async_trait]
pub trait PreparedStatement: Statement + PreparedStatementOps {
    async fn execute_prepared(&mut self) -> Result<bool, Error>;

    async fn execute_prepared_query(&mut self) -> Result<ResultSet, Error>;

    async fn execute_prepared_update(&mut self) -> Result<u64, Error>;
}

/// Stored-procedure call. Adds only parameter registration and accessors;
/// execution is inherited from [`PreparedStatement`].
pub trait CallableStatement: PreparedStatement {
    /// # Errors
    /// Index out of range or closed statement.
    fn register_out_parameter(&mut self, index: usize, sql_type: SqlType) -> Result<(), Error>;

    /// # Errors
    /// Unknown parameter name or closed statement.
    fn set_named(&mut self, name: &str, value: Value) -> Result<(), Error>;

    /// # Errors
    /// Parameter not registered or the call has not run yet.
    fn out_value(&self, index: usize) -> Result<Value, Error>;

    /// # Errors
    /// Unknown name or the call has not run yet.
    fn out_named(&self, name: &str) -> Result<Value, Error>;
}

/// Ordered set of real drivers, consulted first-match.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        tracing::debug!(driver = driver.name(), "registered driver");
        self.drivers.push(driver);
    }

    /// First driver accepting `url`.
    #[must_use]
    pub fn driver_for(&self, url: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.iter().find(|d| d.accepts_url(url)).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
