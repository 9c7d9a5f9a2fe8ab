//! PostgreSQL backend
//!
//! Pool setup, parameter binding, and decoding rows into JSON records by
//! column type.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, ConnectOptions, Executor, PgPool, Postgres, Row, TypeInfo, ValueRef};
use tracing::log::LevelFilter;

use crate::core::config::DatabaseConfig;
use crate::data::sql::SqlValue;
use crate::utils::time::to_iso;

use super::Record;

/// Open a pool with the configured sizing and timeouts
///
/// - Min connections kept warm for low latency
/// - Idle timeout to release unused connections
/// - Max lifetime to cycle connections and prevent stale state
/// - Statement timeout to prevent runaway queries
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool_config = &config.pool;
    let mut options: PgConnectOptions = config.url.parse()?;
    options = options.log_statements(LevelFilter::Trace);

    // Set statement timeout at connection level for query protection
    if pool_config.statement_timeout_secs > 0 {
        options = options.options([(
            "statement_timeout",
            format!("{}s", pool_config.statement_timeout_secs),
        )]);
    }

    let pool = PgPoolOptions::new()
        .max_connections(pool_config.max_connections)
        .min_connections(pool_config.min_connections)
        .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(pool_config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(pool_config.max_lifetime_secs))
        .connect_with(options)
        .await?;

    tracing::debug!(
        max_connections = pool_config.max_connections,
        min_connections = pool_config.min_connections,
        acquire_timeout_secs = pool_config.acquire_timeout_secs,
        idle_timeout_secs = pool_config.idle_timeout_secs,
        max_lifetime_secs = pool_config.max_lifetime_secs,
        statement_timeout_secs = pool_config.statement_timeout_secs,
        "PostgreSQL pool connected"
    );
    Ok(pool)
}

pub(crate) fn bind_all(
    mut query: Query<'_, Postgres, PgArguments>,
    params: Vec<SqlValue>,
) -> Query<'_, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Bool(b) => query.bind(b),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Float(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Json(v) => query.bind(Json(v)),
        };
    }
    query
}

/// Decode a row by declared column type
pub(crate) fn decode_row(row: &PgRow) -> Result<Record, sqlx::Error> {
    let mut record = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let index = column.ordinal();
        if row.try_get_raw(index)?.is_null() {
            record.insert(column.name().to_string(), Value::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => Value::Bool(row.try_get::<bool, _>(index)?),
            "INT2" => Value::from(row.try_get::<i16, _>(index)?),
            "INT4" => Value::from(row.try_get::<i32, _>(index)?),
            "INT8" => Value::from(row.try_get::<i64, _>(index)?),
            "FLOAT4" => Value::from(row.try_get::<f32, _>(index)?),
            "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
                Value::String(row.try_get::<String, _>(index)?)
            }
            "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
            "TIMESTAMPTZ" => Value::String(to_iso(&row.try_get::<DateTime<Utc>, _>(index)?)),
            "TIMESTAMP" => Value::String(
                row.try_get::<NaiveDateTime, _>(index)?
                    .format("%Y-%m-%dT%H:%M:%S%.6f")
                    .to_string(),
            ),
            "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.format("%Y-%m-%d").to_string()),
            "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
            "BYTEA" => Value::String(BASE64.encode(row.try_get::<Vec<u8>, _>(index)?)),
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: column.name().to_string(),
                    source: format!("unsupported column type {}", other).into(),
                });
            }
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
    E: Executor<'e, Database = Postgres>,
{
    let rows = bind_all(sqlx::query(sql), params).fetch_all(executor).await?;
    rows.iter().map(decode_row).collect()
}

/// Row cursor; rows are pulled from the server as the stream is polled
pub(crate) fn stream_records<'e, E>(
    executor: E,
    sql: &'e str,
    params: Vec<SqlValue>,
) -> BoxStream<'e, Result<Record, sqlx::Error>>
where
    E: Executor<'e, Database = Postgres> + 'e,
{
    bind_all(sqlx::query(sql), params)
        .fetch(executor)
        .map(|row| row.and_then(|r| decode_row(&r)))
        .boxed()
}
