#![allow(clippy::unwrap_used, clippy::expect_used)]
#![cfg(feature = "integration")]

//! Binding against a real PostgreSQL session.

mod common;

use std::sync::Arc;

use anyhow::Result;
use ctxbind_driver::{
    BindingDriver, BoundConnection, CallableStatement, Column, Connection, FIXED_TOKEN_SOURCE,
    GeneratedKeys, PgDriver, PreparedStatement, PreparedStatementOps, Properties,
    SERVICE_IDENTITY_SOURCE, SqlType, Statement, StatementOps, TOKEN_PROPERTY,
    TOKEN_PROVIDER_PROPERTY, Value,
};
use ctxbind_security::decode_transport;
use static_identity_plugin::{StaticIdentityPluginConfig, StaticIdentityService};

fn driver(identity: Arc<StaticIdentityService>) -> Result<BindingDriver> {
    Ok(BindingDriver::builder()
        .driver(Arc::new(PgDriver::new()))
        .identity_client(identity)
        .build()?)
}

async fn open_as_service(pg: &common::PgInstance) -> Result<BoundConnection> {
    let identity = Arc::new(StaticIdentityService::from_config(
        &StaticIdentityPluginConfig::default(),
    ));
    let props = Properties::new().with(TOKEN_PROVIDER_PROPERTY, SERVICE_IDENTITY_SOURCE);
    Ok(driver(identity)?
        .open(&format!("ctxbind:{}", pg.url), &props)
        .await?)
}

async fn run_ddl(conn: &BoundConnection, sql: &str) -> Result<()> {
    let mut stmt = conn.create_statement().await?;
    stmt.execute_update(sql).await?;
    stmt.close()?;
    Ok(())
}

#[tokio::test]
async fn session_sees_the_bound_token() -> Result<()> {
    let pg = common::bring_up_postgres().await?;
    let identity = Arc::new(StaticIdentityService::from_config(
        &StaticIdentityPluginConfig::default(),
    ));
    let driver = driver(identity)?;
    let props = Properties::new().with(TOKEN_PROVIDER_PROPERTY, SERVICE_IDENTITY_SOURCE);
    let conn = driver.open(&format!("ctxbind:{}", pg.url), &props).await?;

    let mut stmt = conn.create_statement().await?;
    let rows = stmt
        .execute_query("SELECT current_setting('ctxbind.token')")
        .await?;

    let Value::Text(encoded) = &rows.rows()[0][0] else {
        panic!("current_setting should return text");
    };
    let token = decode_transport(encoded)?;
    assert_eq!(token.subject_id(), "ctxbind");

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn prepared_statements_bind_and_run() -> Result<()> {
    let pg = common::bring_up_postgres().await?;
    let identity = Arc::new(StaticIdentityService::from_config(
        &StaticIdentityPluginConfig::default(),
    ));
    let token = identity.caller_token("alice")?;
    let encoded = ctxbind_security::encode_transport(&token)?;
    let driver = driver(identity)?;
    let props = Properties::new()
        .with(TOKEN_PROVIDER_PROPERTY, FIXED_TOKEN_SOURCE)
        .with(TOKEN_PROPERTY, encoded.clone());
    let conn = driver.open(&format!("ctxbind:{}", pg.url), &props).await?;

    let mut ddl = conn.create_statement().await?;
    ddl.execute_update(
        "CREATE TABLE docs (id BIGSERIAL PRIMARY KEY, title TEXT NOT NULL, \
         owner TEXT NOT NULL DEFAULT current_setting('ctxbind.token'))",
    )
    .await?;
    ddl.close()?;

    let mut insert = conn
        .prepare_statement("INSERT INTO docs (title) VALUES (?)")
        .await?;
    insert.set_param(1, Value::Text("q3 report".to_owned()))?;
    assert_eq!(insert.execute_prepared_update().await?, 1);

    let mut keyed = conn.create_statement().await?;
    keyed
        .execute_update_with_keys(
            "INSERT INTO docs (title) VALUES ('q4 report')",
            &GeneratedKeys::Names(vec!["id".to_owned()]),
        )
        .await?;
    let keys = keyed.generated_keys().unwrap();
    assert_eq!(keys.rows()[0], [Value::Int(2)]);

    let mut select = conn
        .prepare_statement("SELECT owner FROM docs WHERE id = $1")
        .await?;
    assert_eq!(
        select.metadata(),
        Some([Column::new("owner", "TEXT")].as_slice())
    );
    select.set_param(1, Value::Int(1))?;
    let rows = select.execute_prepared_query().await?;
    assert_eq!(rows.rows()[0], [Value::Text(encoded)]);

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn transactions_follow_auto_commit() -> Result<()> {
    let pg = common::bring_up_postgres().await?;
    let identity = Arc::new(StaticIdentityService::from_config(
        &StaticIdentityPluginConfig::default(),
    ));
    let driver = driver(identity)?;
    let props = Properties::new().with(TOKEN_PROVIDER_PROPERTY, SERVICE_IDENTITY_SOURCE);
    let url = format!("ctxbind:{}", pg.url);
    let conn = driver.open(&url, &props).await?;

    conn.create_statement()
        .await?
        .execute_update("CREATE TABLE t (a INT)")
        .await?;

    conn.set_auto_commit(false).await?;
    conn.create_statement()
        .await?
        .execute_update("INSERT INTO t VALUES (1)")
        .await?;
    conn.rollback().await?;
    conn.set_auto_commit(true).await?;

    let rows = conn
        .create_statement()
        .await?
        .execute_query("SELECT count(*) FROM t")
        .await?;
    assert_eq!(rows.rows()[0], [Value::Int(0)]);

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn callables_return_out_values() -> Result<()> {
    let pg = common::bring_up_postgres().await?;
    let conn = open_as_service(&pg).await?;
    run_ddl(
        &conn,
        "CREATE FUNCTION totals(y int, OUT total bigint, OUT label text) \
         AS $$ SELECT (y * 2)::bigint, 'ok' $$ LANGUAGE sql",
    )
    .await?;
    run_ddl(
        &conn,
        "CREATE FUNCTION dbl(x int) RETURNS int AS $$ SELECT x * 2 $$ LANGUAGE sql",
    )
    .await?;

    let mut call = conn.prepare_call("{call totals(?, ?, ?)}").await?;
    call.set_param(1, Value::Int(21))?;
    call.register_out_parameter(2, SqlType::BigInt)?;
    call.register_out_parameter(3, SqlType::Text)?;
    call.execute_prepared().await?;
    assert_eq!(call.out_value(2)?, Value::Int(42));
    assert_eq!(call.out_value(3)?, Value::from("ok"));
    assert_eq!(call.out_named("label")?, Value::from("ok"));

    let mut dbl = conn.prepare_call("{call dbl(?)}").await?;
    dbl.set_param(1, Value::Int(21))?;
    let rows = dbl.execute_prepared_query().await?;
    assert_eq!(rows.rows()[0], [Value::Int(42)]);

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn parameters_follow_the_column_types() -> Result<()> {
    let pg = common::bring_up_postgres().await?;
    let conn = open_as_service(&pg).await?;
    run_ddl(&conn, "CREATE TABLE n (a INT, b TEXT, d DATE)").await?;

    let mut insert = conn
        .prepare_statement("INSERT INTO n (a, b, d) VALUES (?, ?, ?)")
        .await?;
    insert.set_param(1, Value::Null)?;
    insert.set_param(2, Value::Int(5))?;
    insert.set_param(3, Value::from("2024-01-31"))?;
    assert_eq!(insert.execute_prepared_update().await?, 1);
    insert.set_param(1, Value::Int(7))?;
    insert.set_param(2, Value::Null)?;
    insert.set_param(3, Value::Null)?;
    assert_eq!(insert.execute_prepared_update().await?, 1);

    let rows = conn
        .create_statement()
        .await?
        .execute_query("SELECT a, b, d::text FROM n ORDER BY a NULLS FIRST")
        .await?;
    assert_eq!(
        rows.rows(),
        [
            vec![Value::Null, Value::from("5"), Value::from("2024-01-31")],
            vec![Value::Int(7), Value::Null, Value::Null],
        ]
    );

    conn.close().await?;
    Ok(())
}
