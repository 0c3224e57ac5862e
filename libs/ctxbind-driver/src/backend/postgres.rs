//! PostgreSQL backend on `sqlx`.
//!
//! Plain statements use the simple query protocol, so `SET` and
//! multi-statement text work; the rows of all result sets are concatenated.
//! Prepared statements accept `?` or `$n` markers. The server describes each
//! statement first and every [`Value`] is encoded for the parameter type it
//! declares; values with no native encoding are sent as text and cast.
//! `{call f(...)}` is run as `SELECT * FROM f(...)` with the OUT markers left
//! out, its first row supplying the OUT values.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgColumn, PgConnectOptions, PgConnection, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{
    Column as _, Connection as _, Either, Executor as _, Postgres, Row as _, Statement as _, Type,
    TypeInfo as _, ValueRef as _,
};
use tokio::sync::Mutex;

use super::session::{Call, CallKind, Executed, Outcome, Session, SessionStatement, starts_with_ignore_case};
use super::{CallableStatement, Connection, Driver, PreparedStatement, Statement};
use crate::error::Error;
use crate::properties::Properties;
use crate::types::{Column, GeneratedKeys, ResultSet, Value};

const SCHEMES: [&str; 2] = ["postgres://", "postgresql://"];

/// Statements whose result is a row set even when empty.
const ROW_RETURNING: [&str; 6] = ["select", "with", "values", "show", "table", "explain"];

#[derive(Debug, Default, Clone, Copy)]
pub struct PgDriver;

impl PgDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for PgDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn accepts_url(&self, url: &str) -> bool {
        SCHEMES.iter().any(|scheme| url.starts_with(scheme))
    }

    async fn connect(
        &self,
        url: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn Connection>, Error> {
        let mut options = PgConnectOptions::from_str(url).map_err(Error::driver)?;
        if let Some(user) = properties.get("user") {
            options = options.username(user);
        }
        if let Some(password) = properties.get("password") {
            options = options.password(password);
        }
        if let Some(name) = properties.get("application_name") {
            options = options.application_name(name);
        }

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(Error::driver)?;
        tracing::debug!("postgres connection opened");

        Ok(Arc::new_cyclic(|this| PgSession {
            conn: Mutex::new(Some(conn)),
            this: this.clone(),
            auto_commit: AtomicBool::new(true),
            in_transaction: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct PgSession {
    conn: Mutex<Option<PgConnection>>,
    this: Weak<PgSession>,
    auto_commit: AtomicBool,
    in_transaction: AtomicBool,
    closed: AtomicBool,
}

impl PgSession {
    fn handle(&self) -> Result<Arc<Self>, Error> {
        if self.is_closed() {
            return Err(Error::driver("connection is closed"));
        }
        self.this
            .upgrade()
            .ok_or_else(|| Error::driver("connection is gone"))
    }

    async fn simple(&self, sql: &str) -> Result<(), Error> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::driver("connection is closed"))?;
        conn.execute(sql).await.map_err(Error::driver)?;
        Ok(())
    }

    /// Result columns of `sql` as the server describes them.
    async fn describe(&self, sql: &str) -> Result<Vec<Column>, Error> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::driver("connection is closed"))?;
        let statement = sqlx::Executor::prepare(&mut *conn, sql)
            .await
            .map_err(Error::driver)?;
        Ok(statement.columns().iter().map(column).collect())
    }

    async fn end_transaction(&self, sql: &str) -> Result<(), Error> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.simple(sql).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn run(&self, call: Call<'_>) -> Result<Executed, Error> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::driver("connection is closed"))?;

        if !self.auto_commit.load(Ordering::SeqCst) {
            begin_once(&self.in_transaction, conn.execute("BEGIN")).await?;
        }

        let returning = returning_clause(call.sql, call.keys);
        let sql = match &returning {
            Some(clause) => format!("{} {clause}", call.sql.trim().trim_end_matches(';')),
            None => call.sql.to_owned(),
        };
        let prepared =
            matches!(call.kind, CallKind::Prepared | CallKind::Call) || !call.params.is_empty();

        let fetched = if prepared {
            let positional = to_positional(&sql, call.outs);
            let values: Vec<&Value> = call
                .params
                .iter()
                .enumerate()
                .filter(|(i, _)| !call.outs.contains(&(i + 1)))
                .map(|(_, v)| v)
                .collect();
            let (sql, params) = bind_plan(conn, &positional, &values).await?;
            fetch(conn, &sql, Some(params)).await?
        } else {
            fetch(conn, &sql, None).await?
        };

        if returning.is_some() {
            let count = fetched.rows.len() as u64;
            return Ok(Executed {
                outcome: Outcome::Count(count),
                generated: Some(select_keys(fetched.into_result_set(), call.keys)),
            });
        }
        if fetched.rows.is_empty() && !returns_rows(&sql) {
            return Ok(Outcome::Count(fetched.affected).into());
        }
        Ok(Outcome::Rows(fetched.into_result_set()).into())
    }
}

#[async_trait]
impl Connection for PgSession {
    async fn create_statement(&self) -> Result<Box<dyn Statement>, Error> {
        Ok(Box::new(SessionStatement::plain(self.handle()?)))
    }

    async fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, Error> {
        let stmt = SessionStatement::prepared(self.handle()?, sql);
        let columns = self.describe(&to_positional(sql, &[])).await?;
        if columns.is_empty() {
            return Ok(Box::new(stmt));
        }
        Ok(Box::new(stmt.with_metadata(columns)))
    }

    /// OUT markers are only known at execution, so calls are described then.
    async fn prepare_call(&self, sql: &str) -> Result<Box<dyn CallableStatement>, Error> {
        Ok(Box::new(SessionStatement::prepared(
            self.handle()?,
            &call_to_select(sql),
        )))
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), Error> {
        if auto_commit {
            self.end_transaction("COMMIT").await?;
        }
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn commit(&self) -> Result<(), Error> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), Error> {
        self.end_transaction("ROLLBACK").await
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await.map_err(Error::driver)?;
            tracing::debug!("postgres connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct Fetched {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    affected: u64,
}

impl Fetched {
    fn into_result_set(self) -> ResultSet {
        ResultSet::new(self.columns, self.rows)
    }
}

/// Raises `open` once `begin` succeeds; does nothing while it is raised.
async fn begin_once<T>(
    open: &AtomicBool,
    begin: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<(), Error> {
    if !open.load(Ordering::SeqCst) {
        begin.await.map_err(Error::driver)?;
        open.store(true, Ordering::SeqCst);
    }
    Ok(())
}

/// `None` params run `sql` over the simple protocol.
async fn fetch(
    conn: &mut PgConnection,
    sql: &str,
    params: Option<Vec<PgParam>>,
) -> Result<Fetched, Error> {
    let mut stream = match params {
        Some(params) => conn.fetch_many(bind_all(sqlx::query::<Postgres>(sql), params)),
        None => conn.fetch_many(sqlx::raw_sql(sql)),
    };

    let mut fetched = Fetched {
        columns: Vec::new(),
        rows: Vec::new(),
        affected: 0,
    };
    while let Some(item) = stream.try_next().await.map_err(Error::driver)? {
        match item {
            Either::Left(done) => fetched.affected += done.rows_affected(),
            Either::Right(row) => {
                if fetched.columns.is_empty() {
                    fetched.columns = row.columns().iter().map(column).collect();
                }
                fetched.rows.push(decode_row(&row)?);
            }
        }
    }
    Ok(fetched)
}

fn bind_all(
    mut query: Query<'_, Postgres, PgArguments>,
    params: Vec<PgParam>,
) -> Query<'_, Postgres, PgArguments> {
    for param in params {
        query = query.bind(param);
    }
    query
}

/// Encodes `values` for the parameter types the server declares for `sql`.
/// Returns the SQL to run, with casts added for values sent as text.
async fn bind_plan(
    conn: &mut PgConnection,
    sql: &str,
    values: &[&Value],
) -> Result<(String, Vec<PgParam>), Error> {
    let declared = {
        let statement = sqlx::Executor::prepare(&mut *conn, sql)
            .await
            .map_err(Error::driver)?;
        match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        }
    };

    let params = values
        .iter()
        .enumerate()
        .map(|(i, value)| PgParam::new(value, declared.get(i)))
        .collect::<Result<Vec<_>, _>>()?;
    let casts: Vec<(usize, &str)> = params
        .iter()
        .enumerate()
        .filter_map(|(i, p)| match p {
            PgParam::Cast { type_name, .. } => Some((i + 1, type_name.as_str())),
            _ => None,
        })
        .collect();
    Ok((cast_markers(sql, &casts), params))
}

/// A parameter value encoded for the type of its slot.
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    /// NULL typed as the slot, so the server accepts it in any column.
    Null(Option<PgTypeInfo>),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Text the server casts to `type_name`.
    Cast { text: String, type_name: String },
}

impl PgParam {
    fn new(value: &Value, declared: Option<&PgTypeInfo>) -> Result<Self, Error> {
        let Some(ty) = declared else {
            return Ok(Self::natural(value));
        };
        let param = match (value, ty.name()) {
            (Value::Null, _) => Self::Null(Some(ty.clone())),
            (Value::Bool(v), "BOOL") => Self::Bool(*v),
            (Value::Int(v), "INT2") => Self::Int2(i16::try_from(*v).map_err(Error::driver)?),
            (Value::Int(v), "INT4") => Self::Int4(i32::try_from(*v).map_err(Error::driver)?),
            (Value::Int(v), "INT8") => Self::Int8(*v),
            (Value::Float(v), "FLOAT8") => Self::Float8(*v),
            (Value::Bytes(v), _) => Self::Bytes(v.clone()),
            (value, "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME") => {
                Self::Text(value.to_string())
            }
            (value, type_name) => Self::Cast {
                text: value.to_string(),
                type_name: type_name.to_owned(),
            },
        };
        Ok(param)
    }

    /// Encoding for a slot of unknown type.
    fn natural(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null(None),
            Value::Bool(v) => Self::Bool(*v),
            Value::Int(v) => Self::Int8(*v),
            Value::Float(v) => Self::Float8(*v),
            Value::Text(v) => Self::Text(v.clone()),
            Value::Bytes(v) => Self::Bytes(v.clone()),
        }
    }
}

impl Type<Postgres> for PgParam {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for PgParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match self {
            Self::Null(_) => Ok(IsNull::Yes),
            Self::Bool(v) => <bool as Encode<'_, Postgres>>::encode_by_ref(v, buf),
            Self::Int2(v) => <i16 as Encode<'_, Postgres>>::encode_by_ref(v, buf),
            Self::Int4(v) => <i32 as Encode<'_, Postgres>>::encode_by_ref(v, buf),
            Self::Int8(v) => <i64 as Encode<'_, Postgres>>::encode_by_ref(v, buf),
            Self::Float8(v) => <f64 as Encode<'_, Postgres>>::encode_by_ref(v, buf),
            Self::Text(v) | Self::Cast { text: v, .. } => {
                <String as Encode<'_, Postgres>>::encode_by_ref(v, buf)
            }
            Self::Bytes(v) => <Vec<u8> as Encode<'_, Postgres>>::encode_by_ref(v, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            Self::Null(Some(ty)) => ty.clone(),
            Self::Null(None) | Self::Text(_) | Self::Cast { .. } => {
                <String as Type<Postgres>>::type_info()
            }
            Self::Bool(_) => <bool as Type<Postgres>>::type_info(),
            Self::Int2(_) => <i16 as Type<Postgres>>::type_info(),
            Self::Int4(_) => <i32 as Type<Postgres>>::type_info(),
            Self::Int8(_) => <i64 as Type<Postgres>>::type_info(),
            Self::Float8(_) => <f64 as Type<Postgres>>::type_info(),
            Self::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
        })
    }
}

fn column(c: &PgColumn) -> Column {
    Column::new(c.name(), c.type_info().name())
}

fn decode_row(row: &PgRow) -> Result<Vec<Value>, Error> {
    row.columns()
        .iter()
        .map(|c| decode_value(row, c.ordinal(), c.type_info().name()))
        .collect()
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value, Error> {
    if row.try_get_raw(index).map_err(Error::driver)?.is_null() {
        return Ok(Value::Null);
    }
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(index).map_err(Error::driver)?),
        "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(index).map_err(Error::driver)?)),
        "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(index).map_err(Error::driver)?)),
        "INT8" => Value::Int(row.try_get(index).map_err(Error::driver)?),
        "FLOAT4" => Value::Float(f64::from(
            row.try_get::<f32, _>(index).map_err(Error::driver)?,
        )),
        "FLOAT8" => Value::Float(row.try_get(index).map_err(Error::driver)?),
        "BYTEA" => Value::Bytes(row.try_get(index).map_err(Error::driver)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            Value::Text(row.try_get(index).map_err(Error::driver)?)
        }
        _ => Value::Text(
            row.try_get_unchecked::<String, _>(index)
                .map_err(Error::driver)?,
        ),
    };
    Ok(value)
}

fn returns_rows(sql: &str) -> bool {
    let first = sql.trim_start().trim_start_matches('(');
    ROW_RETURNING
        .iter()
        .any(|kw| starts_with_ignore_case(first, kw))
}

/// `RETURNING` clause for an insert that asked for generated keys.
fn returning_clause(sql: &str, keys: &GeneratedKeys) -> Option<String> {
    let text = sql.trim();
    if !starts_with_ignore_case(text, "insert") || text.to_ascii_lowercase().contains("returning") {
        return None;
    }
    match keys {
        GeneratedKeys::None => None,
        GeneratedKeys::All | GeneratedKeys::Indexes(_) => Some("RETURNING *".to_owned()),
        GeneratedKeys::Names(names) if names.is_empty() => Some("RETURNING *".to_owned()),
        GeneratedKeys::Names(names) => Some(format!("RETURNING {}", names.join(", "))),
    }
}

fn select_keys(rows: ResultSet, keys: &GeneratedKeys) -> ResultSet {
    let GeneratedKeys::Indexes(indexes) = keys else {
        return rows;
    };
    let picked: Vec<usize> = indexes
        .iter()
        .filter_map(|i| i.checked_sub(1))
        .filter(|&i| i < rows.columns().len())
        .collect();
    let columns = picked.iter().map(|&i| rows.columns()[i].clone()).collect();
    let data = rows
        .rows()
        .iter()
        .map(|r| picked.iter().map(|&i| r[i].clone()).collect())
        .collect();
    ResultSet::new(columns, data)
}

/// Rewrite `?` markers outside single quotes as `$1`, `$2`, ...
///
/// Markers whose 1-based position is in `skip` are dropped together with one
/// neighbouring comma, so `f(?, ?)` skipping 2 becomes `f($1)`.
fn to_positional(sql: &str, skip: &[usize]) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_quote = false;
    let mut marker = 0;
    let mut n = 0;
    let mut eat_comma = false;
    let mut eat_space = false;
    for c in sql.chars() {
        if eat_comma {
            if c.is_whitespace() {
                continue;
            }
            eat_comma = false;
            if c == ',' {
                eat_space = true;
                continue;
            }
        }
        if eat_space {
            if c.is_whitespace() {
                continue;
            }
            eat_space = false;
        }
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote => {
                marker += 1;
                if !skip.contains(&marker) {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                    continue;
                }
                let kept = out.trim_end().len();
                if out[..kept].ends_with(',') {
                    out.truncate(kept - 1);
                } else {
                    eat_comma = true;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Wrap each `$n` named in `casts` as `CAST($n AS <type>)`.
fn cast_markers(sql: &str, casts: &[(usize, &str)]) -> String {
    if casts.is_empty() {
        return sql.to_owned();
    }
    let mut out = String::with_capacity(sql.len() + casts.len() * 16);
    let mut in_quote = false;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
        }
        if c != '$' || in_quote {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        let target = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| casts.iter().find(|(i, _)| *i == n));
        match target {
            Some((_, type_name)) => {
                out.push_str("CAST($");
                out.push_str(&digits);
                out.push_str(" AS ");
                out.push_str(type_name);
                out.push(')');
            }
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

/// `{call f(args)}` to `SELECT * FROM f(args)`; anything else unchanged.
fn call_to_select(sql: &str) -> String {
    let text = sql.trim();
    let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) else {
        return sql.to_owned();
    };
    let inner = inner.trim();
    if !starts_with_ignore_case(inner, "call ") {
        return sql.to_owned();
    }
    format!("SELECT * FROM {}", inner[5..].trim())
}
