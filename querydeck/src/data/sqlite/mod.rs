//! SQLite backend
//!
//! Pool setup, parameter binding, and decoding rows into JSON records.
//! Values are decoded by their storage class; kind-aware fix-ups (booleans,
//! JSON text) happen in the repository where field kinds are known.

use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tracing::log::LevelFilter;

use crate::core::config::DatabaseConfig;
use crate::data::sql::SqlValue;

use super::Record;

/// Open a pool for the configured SQLite URL
///
/// In-memory databases live as long as their connection, so idle and
/// lifetime limits are disabled for them.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.pool.busy_timeout_secs))
        .log_statements(LevelFilter::Trace);

    let in_memory = is_memory_url(&config.url);
    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.pool.max_connections)
        .min_connections(config.pool.min_connections)
        .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs));
    pool_options = if in_memory {
        pool_options.idle_timeout(None).max_lifetime(None)
    } else {
        pool_options
            .idle_timeout(Duration::from_secs(config.pool.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.pool.max_lifetime_secs))
    };

    let pool = pool_options.connect_with(options).await?;

    tracing::debug!(
        url = %config.url,
        in_memory,
        max_connections = config.pool.max_connections,
        "SQLite pool connected"
    );
    Ok(pool)
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

/// Decode a row by the storage class of each value
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let mut record = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let index = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => Value::from(row.try_get_unchecked::<i64, _>(index)?),
            Some("REAL") => Value::from(row.try_get_unchecked::<f64, _>(index)?),
            Some("BLOB") => {
                Value::String(BASE64.encode(row.try_get_unchecked::<Vec<u8>, _>(index)?))
            }
            Some(_) => Value::String(row.try_get_unchecked::<String, _>(index)?),
        };
        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

pub(crate) async fn fetch_records<'e, E>(
    executor: E,
    sql: &'e str,
    params: Vec<SqlValue>,
) -> Result<Vec<Record>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = bind_all(sqlx::query(sql), params).fetch_all(executor).await?;
    rows.iter().map(decode_row).collect()
}

/// Row cursor; rows are pulled from the database as the stream is polled
pub(crate) fn stream_records<'e, E>(
    executor: E,
    sql: &'e str,
    params: Vec<SqlValue>,
) -> BoxStream<'e, Result<Record, sqlx::Error>>
where
    E: Executor<'e, Database = Sqlite> + 'e,
{
    bind_all(sqlx::query(sql), params)
        .fetch(executor)
        .map(|row| row.and_then(|r| decode_row(&r)))
        .boxed()
}
