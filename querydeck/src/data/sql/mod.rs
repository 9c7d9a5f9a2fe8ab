//! SQL abstraction layer for multi-database support
//!
//! This module provides the statement builder the filter compiler and the
//! repository render into, and the dialect trait that keeps the generated
//! SQL portable across backends (SQLite, PostgreSQL).

mod dialect;
mod postgres_dialect;
mod sqlite_dialect;
mod statement;

pub use dialect::SqlDialect;
pub use postgres_dialect::PostgresDialect;
pub use sqlite_dialect::SqliteDialect;
pub use statement::{
    FieldSelection, OrderBy, SortDirection, SqlParams, SqlValue, Statement, StatementKind,
};

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Database backend identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Postgres,
}

impl Backend {
    /// Get the SQL dialect for this backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Backend::Sqlite => &SqliteDialect,
            Backend::Postgres => &PostgresDialect,
        }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}
