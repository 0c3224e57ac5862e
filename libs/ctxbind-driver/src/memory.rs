//! In-memory recording driver for `memory://` URLs.
//!
//! Keeps per-connection session variables so `SET name = 'v'` followed by
//! `SELECT current_setting('name')` behaves like a real server, and journals
//! every executed statement so tests can assert ordering. Anything it does not
//! understand succeeds with an empty result, unless a scripted response or an
//! injected failure matches first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::session::{
    Call, Executed, Outcome, Session, SessionStatement, starts_with_ignore_case,
};
use crate::backend::{CallableStatement, Connection, Driver, PreparedStatement, Statement};
use crate::error::Error;
use crate::properties::Properties;
use crate::types::{Column, GeneratedKeys, ResultSet, Value};

pub use crate::backend::session::CallKind;

pub const MEMORY_URL_SCHEME: &str = "memory:";

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub connection: u64,
    pub kind: CallKind,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<JournalEntry>>,
    scripted: Mutex<Vec<(String, Outcome)>>,
    failures: Mutex<Vec<String>>,
    connections: Mutex<Vec<Arc<MemoryConnection>>>,
    next_connection: AtomicU64,
    next_key: AtomicI64,
    statements_opened: AtomicUsize,
    statements_closed: AtomicUsize,
}

impl Shared {
    fn scripted_for(&self, sql: &str) -> Option<Outcome> {
        self.scripted
            .lock()
            .iter()
            .find(|(prefix, _)| starts_with_ignore_case(sql, prefix))
            .map(|(_, outcome)| outcome.clone())
    }

    fn fails(&self, sql: &str) -> bool {
        self.failures
            .lock()
            .iter()
            .any(|prefix| starts_with_ignore_case(sql.trim_start(), prefix))
    }
}

/// Driver handle. Clones share journal, scripts and connections.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements starting with `prefix` (case-insensitive) with `rows`.
    pub fn respond_rows(&self, prefix: &str, rows: ResultSet) {
        self.shared
            .scripted
            .lock()
            .push((prefix.to_owned(), Outcome::Rows(rows)));
    }

    /// Answer statements starting with `prefix` with an update count.
    pub fn respond_count(&self, prefix: &str, count: u64) {
        self.shared
            .scripted
            .lock()
            .push((prefix.to_owned(), Outcome::Count(count)));
    }

    /// Fail statements starting with `prefix`.
    pub fn fail_on_prefix(&self, prefix: &str) {
        self.shared.failures.lock().push(prefix.to_owned());
    }

    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.shared.journal.lock().clone()
    }

    /// SQL text of every journaled statement, in order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.shared
            .journal
            .lock()
            .iter()
            .map(|e| e.sql.clone())
            .collect()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    /// Every connection opened so far.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
        self.shared.connections.lock().clone()
    }

    #[must_use]
    pub fn statements_opened(&self) -> usize {
        self.shared.statements_opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn statements_closed(&self) -> usize {
        self.shared.statements_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(MEMORY_URL_SCHEME)
    }

    async fn connect(
        &self,
        url: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn Connection>, Error> {
        if !self.accepts_url(url) {
            return Err(Error::driver(format!("not a memory URL: {url}")));
        }
        let id = self.shared.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = Arc::new_cyclic(|this| MemoryConnection {
            id,
            url: url.to_owned(),
            properties: properties.clone(),
            shared: self.shared.clone(),
            this: this.clone(),
            session: Mutex::new(HashMap::new()),
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });
        self.shared.connections.lock().push(conn.clone());
        tracing::debug!(connection = id, "memory connection opened");
        Ok(conn)
    }
}

/// One in-memory session.
pub struct MemoryConnection {
    id: u64,
    url: String,
    properties: Properties,
    shared: Arc<Shared>,
    this: Weak<MemoryConnection>,
    session: Mutex<HashMap<String, String>>,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl MemoryConnection {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// URL the connection was opened with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Properties the connection was opened with.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Current value of a session variable.
    #[must_use]
    pub fn session_variable(&self, name: &str) -> Option<String> {
        self.session.lock().get(&name.to_ascii_lowercase()).cloned()
    }

    fn statement(&self, sql: Option<&str>) -> Result<SessionStatement<Self>, Error> {
        self.ensure_open()?;
        let conn = self
            .this
            .upgrade()
            .ok_or_else(|| Error::driver("connection is gone"))?;
        self.shared.statements_opened.fetch_add(1, Ordering::SeqCst);
        let Some(sql) = sql else {
            return Ok(SessionStatement::plain(conn));
        };
        let stmt = SessionStatement::prepared(conn, sql);
        // Scripted rows describe the result columns ahead of execution.
        Ok(match self.shared.scripted_for(sql.trim()) {
            Some(Outcome::Rows(rows)) => stmt.with_metadata(rows.columns().to_vec()),
            _ => stmt,
        })
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::driver("connection is closed"));
        }
        Ok(())
    }

    fn evaluate(&self, text: &str, params: &[Value]) -> Outcome {
        if let Some((name, value)) = parse_set(text) {
            self.session.lock().insert(name, value);
            return Outcome::Count(0);
        }
        if let Some(scripted) = self.shared.scripted_for(text) {
            return scripted;
        }
        if let Some(name) = parse_current_setting(text) {
            let value = self.session_variable(&name).map_or(Value::Null, Value::Text);
            return Outcome::Rows(ResultSet::new(
                vec![Column::new("current_setting", "TEXT")],
                vec![vec![value]],
            ));
        }
        if !starts_with_ignore_case(text, "select") {
            return Outcome::Count(0);
        }
        if let Ok(n) = text[6..].trim().parse::<i64>() {
            return Outcome::Rows(ResultSet::new(
                vec![Column::new("?column?", "INT8")],
                vec![vec![Value::Int(n)]],
            ));
        }
        if params.is_empty() {
            return Outcome::Rows(ResultSet::default());
        }
        let columns = (1..=params.len())
            .map(|i| Column::new(format!("?column{i}?"), "UNKNOWN"))
            .collect();
        Outcome::Rows(ResultSet::new(columns, vec![params.to_vec()]))
    }

    fn generated_keys(&self, text: &str, keys: &GeneratedKeys) -> Option<ResultSet> {
        if *keys == GeneratedKeys::None || !starts_with_ignore_case(text, "insert") {
            return None;
        }
        let key = self.shared.next_key.fetch_add(1, Ordering::SeqCst) + 1;
        let name = match keys {
            GeneratedKeys::Names(names) => names.first().map_or("id", String::as_str),
            _ => "id",
        };
        Some(ResultSet::new(
            vec![Column::new(name, "INT8")],
            vec![vec![Value::Int(key)]],
        ))
    }
}

#[async_trait]
impl Session for MemoryConnection {
    async fn run(&self, call: Call<'_>) -> Result<Executed, Error> {
        self.ensure_open()?;
        self.shared.journal.lock().push(JournalEntry {
            connection: self.id,
            kind: call.kind,
            sql: call.sql.to_owned(),
            params: call.params.to_vec(),
        });
        if self.shared.fails(call.sql) {
            return Err(Error::driver(format!("injected failure: {}", call.sql)));
        }

        let text = call.sql.trim().trim_end_matches(';').trim();
        Ok(Executed {
            outcome: self.evaluate(text, call.params),
            generated: self.generated_keys(text, call.keys),
        })
    }

    fn statement_closed(&self) {
        self.shared.statements_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_statement(&self) -> Result<Box<dyn Statement>, Error> {
        Ok(Box::new(self.statement(None)?))
    }

    async fn prepare_statement(&self, sql: &str) -> Result<Box<dyn PreparedStatement>, Error> {
        Ok(Box::new(self.statement(Some(sql))?))
    }

    async fn prepare_call(&self, sql: &str) -> Result<Box<dyn CallableStatement>, Error> {
        Ok(Box::new(self.statement(Some(sql))?))
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), Error> {
        self.ensure_open()?;
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn commit(&self) -> Result<(), Error> {
        self.ensure_open()
    }

    async fn rollback(&self) -> Result<(), Error> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), Error> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.session.lock().clear();
            tracing::debug!(connection = self.id, "memory connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// `SET [SESSION|LOCAL] name {=|TO} value`, name lowercased, quotes stripped.
fn parse_set(text: &str) -> Option<(String, String)> {
    if !starts_with_ignore_case(text, "set ") {
        return None;
    }
    let mut rest = text[4..].trim_start();
    for scope in ["session ", "local "] {
        if starts_with_ignore_case(rest, scope) {
            rest = rest[scope.len()..].trim_start();
        }
    }
    let (name, value) = match rest.split_once('=') {
        Some(pair) => pair,
        None => {
            let lower = rest.to_ascii_lowercase();
            let at = lower.find(" to ")?;
            (&rest[..at], &rest[at + 4..])
        }
    };
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    Some((name, value.to_owned()))
}

/// Name inside `SELECT current_setting('name' ...)`.
fn parse_current_setting(text: &str) -> Option<String> {
    let prefix = "select current_setting(";
    if !starts_with_ignore_case(text, prefix) {
        return None;
    }
    let rest = &text[prefix.len()..];
    let start = rest.find('\'')? + 1;
    let len = rest[start..].find('\'')?;
    Some(rest[start..start + len].to_ascii_lowercase())
}
