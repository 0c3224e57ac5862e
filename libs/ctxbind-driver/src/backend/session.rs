//! Statement state shared by the bundled backends.
//!
//! A backend implements [`Session::run`] for one SQL text; [`SessionStatement`]
//! layers options, parameters, batches, result bookkeeping and OUT parameters
//! on top and implements every statement shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    CallableStatement, Connection, PreparedStatement, PreparedStatementOps, Statement,
    StatementOps,
};
use crate::error::Error;
use crate::types::{Column, GeneratedKeys, ResultSet, SqlType, Value};

/// How a statement was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Query,
    Update,
    Batch,
    Prepared,
    Call,
}

/// One SQL text to run.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub kind: CallKind,
    pub sql: &'a str,
    pub params: &'a [Value],
    pub keys: &'a GeneratedKeys,
    /// 1-based marker positions registered as OUT parameters, ascending.
    pub outs: &'a [usize],
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Rows(ResultSet),
    Count(u64),
}

#[derive(Debug, Clone)]
pub struct Executed {
    pub outcome: Outcome,
    /// Keys generated by an insert, when requested.
    pub generated: Option<ResultSet>,
}

impl From<Outcome> for Executed {
    fn from(outcome: Outcome) -> Self {
        Self {
            outcome,
            generated: None,
        }
    }
}

/// Raw execution on a backend connection.
#[async_trait]
pub trait Session: Connection + 'static {
    async fn run(&self, call: Call<'_>) -> Result<Executed, Error>;

    /// Called once when a statement of this session is closed.
    fn statement_closed(&self) {}
}

enum BatchItem {
    Sql(String),
    Params(Vec<Value>),
}

/// Statement of every shape; plain statements have no prepared SQL.
pub struct SessionStatement<C> {
    conn: Arc<C>,
    sql: Option<String>,
    params: Vec<Value>,
    metadata: Option<Vec<Column>>,
    batch: Vec<BatchItem>,
    fetch_size: usize,
    max_rows: usize,
    query_timeout: Option<Duration>,
    result: Option<ResultSet>,
    update_count: Option<u64>,
    generated: Option<ResultSet>,
    warnings: Vec<String>,
    out_params: HashMap<usize, SqlType>,
    named: HashMap<String, Value>,
    out_row: Option<ResultSet>,
    closed: bool,
}

impl<C: Session> SessionStatement<C> {
    #[must_use]
    pub fn plain(conn: Arc<C>) -> Self {
        Self::new(conn, None)
    }

    #[must_use]
    pub fn prepared(conn: Arc<C>, sql: &str) -> Self {
        Self::new(conn, Some(sql))
    }

    fn new(conn: Arc<C>, sql: Option<&str>) -> Self {
        let count = sql.map_or(0, count_placeholders);
        Self {
            conn,
            sql: sql.map(str::to_owned),
            params: vec![Value::Null; count],
            metadata: None,
            batch: Vec::new(),
            fetch_size: 0,
            max_rows: 0,
            query_timeout: None,
            result: None,
            update_count: None,
            generated: None,
            warnings: Vec::new(),
            out_params: HashMap::new(),
            named: HashMap::new(),
            out_row: None,
            closed: false,
        }
    }

    /// Result columns known ahead of execution.
    #[must_use]
    pub fn with_metadata(mut self, columns: Vec<Column>) -> Self {
        self.metadata = Some(columns);
        self
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::driver("statement is closed"));
        }
        Ok(())
    }

    fn prepared_sql(&self) -> Result<String, Error> {
        self.sql
            .clone()
            .ok_or_else(|| Error::driver("statement was not prepared"))
    }

    async fn run(
        &mut self,
        kind: CallKind,
        sql: &str,
        params: &[Value],
        keys: &GeneratedKeys,
        outs: &[usize],
    ) -> Result<bool, Error> {
        self.ensure_open()?;
        self.result = None;
        self.update_count = None;
        self.generated = None;

        let call = Call {
            kind,
            sql,
            params,
            keys,
            outs,
        };
        let executed = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.conn.run(call))
                .await
                .map_err(|_| Error::driver(format!("query timed out after {limit:?}")))??,
            None => self.conn.run(call).await?,
        };

        self.generated = executed.generated;
        match executed.outcome {
            Outcome::Rows(rs) => {
                self.result = Some(self.limit_rows(rs));
                Ok(true)
            }
            Outcome::Count(n) => {
                self.update_count = Some(n);
                Ok(false)
            }
        }
    }

    fn limit_rows(&self, rs: ResultSet) -> ResultSet {
        if self.max_rows == 0 || rs.len() <= self.max_rows {
            return rs;
        }
        let columns = rs.columns().to_vec();
        let mut rows = rs.into_rows();
        rows.truncate(self.max_rows);
        ResultSet::new(columns, rows)
    }

    fn take_rows(&mut self, sql: &str) -> Result<ResultSet, Error> {
        self.result
            .take()
            .ok_or_else(|| Error::driver(format!("statement did not return rows: {sql}")))
    }

    fn take_count(&self, sql: &str) -> Result<u64, Error> {
        self.update_count
            .ok_or_else(|| Error::driver(format!("statement returned rows: {sql}")))
    }

    async fn run_prepared(&mut self, kind: CallKind) -> Result<(String, bool), Error> {
        let sql = self.prepared_sql()?;
        let params = self.params.clone();
        let outs = self.out_indexes();
        let has_rows = self
            .run(kind, &sql, &params, &GeneratedKeys::None, &outs)
            .await?;
        Ok((sql, has_rows))
    }

    fn out_indexes(&self) -> Vec<usize> {
        let mut outs: Vec<usize> = self.out_params.keys().copied().collect();
        outs.sort_unstable();
        outs
    }
}

impl<C: Session> StatementOps for SessionStatement<C> {
    fn set_fetch_size(&mut self, rows: usize) {
        self.fetch_size = rows;
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn set_max_rows(&mut self, rows: usize) {
        self.max_rows = rows;
    }

    fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.query_timeout = timeout;
    }

    fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    fn take_result_set(&mut self) -> Option<ResultSet> {
        self.result.take()
    }

    fn update_count(&self) -> Option<u64> {
        self.update_count
    }

    fn generated_keys(&self) -> Option<ResultSet> {
        self.generated.clone()
    }

    fn add_batch(&mut self, sql: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.batch.push(BatchItem::Sql(sql.to_owned()));
        Ok(())
    }

    fn clear_batch(&mut self) {
        self.batch.clear();
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    fn close(&mut self) -> Result<(), Error> {
        if !self.closed {
            self.closed = true;
            self.conn.statement_closed();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl<C: Session> Statement for SessionStatement<C> {
    fn connection(&self) -> Arc<dyn Connection> {
        self.conn.clone()
    }

    async fn execute(&mut self, sql: &str) -> Result<bool, Error> {
        self.run(CallKind::Execute, sql, &[], &GeneratedKeys::None, &[])
            .await
    }

    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet, Error> {
        self.run(CallKind::Query, sql, &[], &GeneratedKeys::None, &[])
            .await?;
        self.take_rows(sql)
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64, Error> {
        self.run(CallKind::Update, sql, &[], &GeneratedKeys::None, &[])
            .await?;
        self.take_count(sql)
    }

    async fn execute_with_keys(
        &mut self,
        sql: &str,
        keys: &GeneratedKeys,
    ) -> Result<bool, Error> {
        self.run(CallKind::Execute, sql, &[], keys, &[]).await
    }

    async fn execute_update_with_keys(
        &mut self,
        sql: &str,
        keys: &GeneratedKeys,
    ) -> Result<u64, Error> {
        self.run(CallKind::Update, sql, &[], keys, &[]).await?;
        self.take_count(sql)
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>, Error> {
        self.ensure_open()?;
        let batch = std::mem::take(&mut self.batch);
        let mut counts = Vec::with_capacity(batch.len());
        for item in batch {
            let (sql, params) = match item {
                BatchItem::Sql(sql) => (sql, Vec::new()),
                BatchItem::Params(params) => (self.prepared_sql()?, params),
            };
            self.run(CallKind::Batch, &sql, &params, &GeneratedKeys::None, &[])
                .await?;
            counts.push(self.update_count.unwrap_or(0));
        }
        Ok(counts)
    }
}

impl<C: Session> PreparedStatementOps for SessionStatement<C> {
    fn set_param(&mut self, index: usize, value: Value) -> Result<(), Error> {
        self.ensure_open()?;
        let slot = index
            .checked_sub(1)
            .and_then(|i| self.params.get_mut(i))
            .ok_or_else(|| Error::driver(format!("parameter index {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.fill(Value::Null);
    }

    fn add_param_batch(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.batch.push(BatchItem::Params(self.params.clone()));
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn metadata(&self) -> Option<&[Column]> {
        self.metadata.as_deref()
    }
}

#[async_trait]
impl<C: Session> PreparedStatement for SessionStatement<C> {
    async fn execute_prepared(&mut self) -> Result<bool, Error> {
        let kind = if self.out_params.is_empty() && self.named.is_empty() {
            CallKind::Prepared
        } else {
            CallKind::Call
        };
        let (_, has_rows) = self.run_prepared(kind).await?;
        if kind == CallKind::Call {
            self.out_row.clone_from(&self.result);
        }
        Ok(has_rows)
    }

    async fn execute_prepared_query(&mut self) -> Result<ResultSet, Error> {
        let (sql, _) = self.run_prepared(CallKind::Prepared).await?;
        self.take_rows(&sql)
    }

    async fn execute_prepared_update(&mut self) -> Result<u64, Error> {
        let (sql, _) = self.run_prepared(CallKind::Prepared).await?;
        self.take_count(&sql)
    }
}

impl<C: Session> CallableStatement for SessionStatement<C> {
    fn register_out_parameter(&mut self, index: usize, sql_type: SqlType) -> Result<(), Error> {
        self.ensure_open()?;
        if index == 0 || index > self.params.len() {
            return Err(Error::driver(format!("parameter index {index} out of range")));
        }
        self.out_params.insert(index, sql_type);
        Ok(())
    }

    fn set_named(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.ensure_open()?;
        self.named.insert(name.to_owned(), value);
        Ok(())
    }

    /// OUT values come from the first result row, in registration-index order,
    /// converted to the registered type.
    fn out_value(&self, index: usize) -> Result<Value, Error> {
        let sql_type = self.out_params.get(&index).copied().ok_or_else(|| {
            Error::driver(format!("parameter {index} is not an OUT parameter"))
        })?;
        let row = self
            .out_row
            .as_ref()
            .ok_or_else(|| Error::driver("call has not been executed"))?;
        let position = self
            .out_params
            .keys()
            .filter(|&&registered| registered < index)
            .count();
        let value = row
            .rows()
            .first()
            .and_then(|r| r.get(position))
            .cloned()
            .unwrap_or(Value::Null);
        value.convert(sql_type).ok_or_else(|| {
            Error::driver(format!(
                "OUT parameter {index} value '{value}' does not fit the registered type"
            ))
        })
    }

    fn out_named(&self, name: &str) -> Result<Value, Error> {
        let row = self
            .out_row
            .as_ref()
            .ok_or_else(|| Error::driver("call has not been executed"))?;
        row.get(0, name)
            .cloned()
            .ok_or_else(|| Error::driver(format!("no OUT parameter named '{name}'")))
    }
}

pub(crate) fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// `?` markers, or the highest `$n`, outside single quotes.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut in_quote = false;
    let mut marks = 0;
    let mut highest = 0usize;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_quote = !in_quote,
            '?' if !in_quote => marks += 1,
            '$' if !in_quote => {
                let mut n = 0usize;
                while let Some(d) = chars.peek().and_then(|d| d.to_digit(10)) {
                    n = n
                        .saturating_mul(10)
                        .saturating_add(usize::try_from(d).unwrap_or(0));
                    chars.next();
                }
                highest = highest.max(n);
            }
            _ => {}
        }
    }
    marks.max(highest)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_counted_outside_quotes() {
        assert_eq!(count_placeholders("select ?, ? where a = '?'"), 2);
        assert_eq!(count_placeholders("select $1, $3"), 3);
        assert_eq!(count_placeholders("{call p(?, ?, ?)}"), 3);
        assert_eq!(count_placeholders("select 1"), 0);
    }

    #[test]
    fn prefix_match_ignores_case() {
        assert!(starts_with_ignore_case("SELECT 1", "select"));
        assert!(!starts_with_ignore_case("SEL", "select"));
        assert!(!starts_with_ignore_case("é", "e"));
    }
}
