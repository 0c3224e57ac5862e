//! `ctxbind-shell`: run SQL statements through a bound connection.
//!
//! ```text
//! ctxbind-shell -c ctxbind.yaml --principal alice \
//!     -u 'ctxbind:postgres://localhost/app?tokenProvider=ctxbind::AmbientContextSource' \
//!     "SELECT * FROM reports"
//! ```

mod output;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ctxbind_driver::token_source::ambient;
use ctxbind_driver::{
    AmbientCaller, BindingDriver, BoundConnection, Connection, MemoryDriver, Properties, Statement,
    StatementOps,
};
use static_identity_plugin::StaticIdentityService;
use tracing_subscriber::EnvFilter;

use crate::output::Format;
use crate::settings::Settings;

/// Run SQL through a connection that binds the caller's security token
/// before every statement.
#[derive(Parser, Debug)]
#[command(name = "ctxbind-shell")]
#[command(about = "Run SQL through a security-context-bound connection", long_about = None)]
struct Cli {
    /// Bound URL, e.g. `ctxbind:postgres://localhost/app`
    #[arg(short = 'u', long = "url")]
    url: String,

    /// YAML file with `driver` and `identity` sections
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Principal the ambient token source acts for
    #[arg(long = "principal")]
    principal: Option<String>,

    /// Connection property as key=value; repeatable
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Row output format
    #[arg(long = "format", value_enum, default_value_t = Format::Tsv)]
    format: Format,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// SQL statements, executed in order
    #[arg(required = true)]
    sql: Vec<String>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_owned(), v.to_owned()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_driver(settings: Settings) -> Result<BindingDriver> {
    let identity = Arc::new(StaticIdentityService::from_config(&settings.identity));
    let builder = BindingDriver::builder()
        .config(settings.driver)
        .identity_client(identity)
        .driver(Arc::new(MemoryDriver::new()));
    #[cfg(feature = "postgres")]
    let builder = builder.driver(Arc::new(ctxbind_driver::PgDriver::new()));
    Ok(builder.build()?)
}

async fn run_all(conn: &BoundConnection, statements: &[String], format: Format) -> Result<()> {
    for sql in statements {
        tracing::debug!(statement = %sql, "executing");
        let mut stmt = conn.create_statement().await?;
        let has_rows = stmt
            .execute(sql)
            .await
            .with_context(|| format!("executing '{sql}'"))?;
        if has_rows {
            if let Some(rows) = stmt.take_result_set() {
                output::print_rows(&rows, format)?;
            }
        } else if let Some(count) = stmt.update_count() {
            output::print_count(count, format);
        }
        stmt.close()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let settings = Settings::load(cli.config.as_deref())?;
    let driver = build_driver(settings)?;
    let properties: Properties = cli.properties.into_iter().collect();
    let conn = driver
        .open(&cli.url, &properties)
        .await
        .context("opening bound connection")?;

    let work = run_all(&conn, &cli.sql, cli.format);
    let result = match cli.principal {
        Some(principal) => ambient::scope(AmbientCaller::Principal(principal), work).await,
        None => work.await,
    };
    conn.close().await?;
    result
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn properties_parse_as_key_value() {
        assert_eq!(
            parse_property("sslmode=disable").unwrap(),
            ("sslmode".to_owned(), "disable".to_owned())
        );
        assert_eq!(
            parse_property("token=YWJj==").unwrap(),
            ("token".to_owned(), "YWJj==".to_owned())
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }

    #[test]
    fn cli_accepts_repeated_properties() {
        let cli = Cli::try_parse_from([
            "ctxbind-shell",
            "-u",
            "ctxbind:memory://db",
            "-p",
            "a=1",
            "-p",
            "b=2",
            "SELECT 1",
        ])
        .unwrap();
        assert_eq!(cli.properties.len(), 2);
        assert_eq!(cli.sql, ["SELECT 1"]);
        assert_eq!(cli.format, Format::Tsv);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[tokio::test]
    async fn statements_run_against_the_memory_driver() {
        let driver = build_driver(Settings::default()).unwrap();
        let props = Properties::new().with(
            ctxbind_driver::TOKEN_PROVIDER_PROPERTY,
            ctxbind_driver::SERVICE_IDENTITY_SOURCE,
        );
        let conn = driver.open("ctxbind:memory://shell", &props).await.unwrap();

        run_all(&conn, &["SELECT 1".to_owned()], Format::Tsv)
            .await
            .unwrap();
    }
}
