//! Error translator
//!
//! The single place where driver errors become [`RepositoryError`]s.
//! PostgreSQL failures are classified by SQLSTATE, SQLite failures by
//! result code and message, sqlx transport errors by variant.

use std::sync::OnceLock;

use regex::Regex;

use crate::data::error::RepositoryError;
use crate::data::sql::Backend;

/// A failure raised while executing a statement
#[derive(Debug)]
pub enum QueryFailure {
    Driver(sqlx::Error),
    /// Already classified; passes through unchanged
    Classified(RepositoryError),
}

impl From<sqlx::Error> for QueryFailure {
    fn from(e: sqlx::Error) -> Self {
        QueryFailure::Driver(e)
    }
}

impl From<RepositoryError> for QueryFailure {
    fn from(e: RepositoryError) -> Self {
        QueryFailure::Classified(e)
    }
}

/// Classify a failure and attach the executed query text
pub fn translate(failure: QueryFailure, query: &str, backend: Backend) -> RepositoryError {
    let error = match failure {
        QueryFailure::Classified(e) => return e.with_query(query),
        QueryFailure::Driver(e) => e,
    };

    let classified = classify(error, query, backend);
    tracing::warn!(
        backend = %backend,
        kind = ?classified.kind(),
        sql = query,
        error = %classified,
        "Database error"
    );
    classified
}

fn classify(error: sqlx::Error, query: &str, backend: Backend) -> RepositoryError {
    let query = Some(query.to_string());

    match &error {
        sqlx::Error::PoolClosed => RepositoryError::NotConnected {
            message: "connection pool is closed".to_string(),
            query,
        },
        sqlx::Error::PoolTimedOut
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => RepositoryError::Connection {
            message: error.to_string(),
            query,
            source: Some(Box::new(error)),
        },
        sqlx::Error::RowNotFound => RepositoryError::NoResult {
            message: RepositoryError::DEFAULT_NO_RESULT_MESSAGE.to_string(),
            query,
        },
        sqlx::Error::ColumnNotFound(column) => RepositoryError::ColumnNotFound {
            column: column.clone(),
            query,
            source: Some(Box::new(error)),
        },
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. } => RepositoryError::Decode {
            message: error.to_string(),
            query,
            source: Some(Box::new(error)),
        },
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let code = db.code().map(|c| c.into_owned());
            match backend {
                Backend::Postgres => classify_postgres(code.as_deref(), message, query, error),
                Backend::Sqlite => classify_sqlite(code.as_deref(), message, query, error),
            }
        }
        _ => RepositoryError::Query {
            message: error.to_string(),
            query,
            source: Some(Box::new(error)),
        },
    }
}

fn classify_postgres(
    code: Option<&str>,
    message: String,
    query: Option<String>,
    error: sqlx::Error,
) -> RepositoryError {
    let source = Some(Box::new(error) as _);
    match code {
        Some("42P01") => RepositoryError::TableNotFound {
            table: quoted_name(&message).unwrap_or_default(),
            query,
            source,
        },
        Some("42703") => RepositoryError::ColumnNotFound {
            column: postgres_column(&message).unwrap_or_default(),
            query,
            source,
        },
        Some("428C9") => RepositoryError::IdentityColumnViolation {
            message,
            query,
            source,
        },
        Some(c) if c.starts_with("08") || matches!(c, "57P01" | "57P02" | "57P03" | "53300") => {
            RepositoryError::Connection {
                message,
                query,
                source,
            }
        }
        _ => RepositoryError::Query {
            message,
            query,
            source,
        },
    }
}

// SQLITE_CANTOPEN, SQLITE_NOTADB
const SQLITE_CONNECTION_CODES: &[i32] = &[14, 26];

fn classify_sqlite(
    code: Option<&str>,
    message: String,
    query: Option<String>,
    error: sqlx::Error,
) -> RepositoryError {
    let source = Some(Box::new(error) as _);

    if let Some(caps) = sqlite_missing_re().captures(&message) {
        let name = caps[2].trim_matches('"').to_string();
        return if &caps[1] == "table" {
            RepositoryError::TableNotFound {
                table: name,
                query,
                source,
            }
        } else {
            RepositoryError::ColumnNotFound {
                column: name,
                query,
                source,
            }
        };
    }

    if message.contains("generated column") {
        return RepositoryError::IdentityColumnViolation {
            message,
            query,
            source,
        };
    }

    // extended result codes carry the primary code in the low byte
    let primary = code.and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff);
    if primary.is_some_and(|c| SQLITE_CONNECTION_CODES.contains(&c)) {
        return RepositoryError::Connection {
            message,
            query,
            source,
        };
    }

    RepositoryError::Query {
        message,
        query,
        source,
    }
}

fn sqlite_missing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"no such (table|column): ("[^"]+"|\S+)"#).expect("Invalid regex"))
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).expect("Invalid regex"))
}

fn quoted_name(message: &str) -> Option<String> {
    quoted_re()
        .captures(message)
        .map(|caps| caps[1].to_string())
}

/// `column "x" does not exist` or `column t.x does not exist`
fn postgres_column(message: &str) -> Option<String> {
    quoted_name(message).or_else(|| {
        message
            .strip_prefix("column ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(|name| name.rsplit('.').next().unwrap_or(name).to_string())
    })
}
