#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! SQL driver wrapper that binds the caller's security token into the
//! database session before every statement execution.
//!
//! Applications open `ctxbind:<real-url>` through a [`BindingDriver`]. The
//! driver picks a [`TokenSource`] from the `tokenProvider` property, opens the
//! real connection with a registered [`Driver`], and returns a
//! [`BoundConnection`]. Each statement obtained from it runs
//! `SET ctxbind.token = '<encoded>'` on the same session immediately before
//! executing, so server-side row policies always see the current caller.
//!
//! ```ignore
//! let driver = BindingDriver::builder()
//!     .driver(Arc::new(PgDriver::new()))
//!     .identity_client(identity)
//!     .build()?;
//! let conn = driver
//!     .open("ctxbind:postgres://db/reports?tokenProvider=ctxbind::ServiceIdentitySource",
//!           &Properties::new())
//!     .await?;
//! let rows = conn.create_statement().await?.execute_query("SELECT * FROM t").await?;
//! ```

pub mod backend;
pub mod binder;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod memory;
pub mod properties;
pub mod router;
mod statement;
pub mod token_source;
pub mod types;
pub mod url;

pub use backend::{
    CallableStatement, Connection, Driver, DriverRegistry, PreparedStatement,
    PreparedStatementOps, Statement, StatementOps,
};
#[cfg(feature = "postgres")]
pub use backend::postgres::PgDriver;
pub use binder::{ContextBinder, SESSION_TOKEN_VARIABLE, set_token_sql};
pub use config::DriverConfig;
pub use connection::BoundConnection;
pub use error::{BindError, Error, TokenError};
pub use identity::{IdentityHandle, IdentityServiceCell};
pub use memory::MemoryDriver;
pub use properties::{Properties, TOKEN_PROPERTY, TOKEN_PROVIDER_PROPERTY};
pub use router::{BindingDriver, BindingDriverBuilder};
pub use token_source::{
    AMBIENT_CONTEXT_SOURCE, AmbientCaller, FIXED_TOKEN_SOURCE, SERVICE_IDENTITY_SOURCE,
    TokenSource, TokenSourceRegistry,
};
pub use types::{Column, GeneratedKeys, ResultSet, SqlType, Value};
pub use url::URL_PREFIX;
