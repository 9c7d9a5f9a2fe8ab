//! Repository error taxonomy
//!
//! Every failure leaving a repository is one of these variants. Driver
//! errors are classified by the translator and keep the executed query
//! text and the original error as the source.

use serde::Serialize;
use thiserror::Error;

use crate::data::filters::FilterError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable error kind, independent of the database driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    NotConnected,
    TableNotFound,
    ColumnNotFound,
    IdentityColumnViolation,
    NoResult,
    Query,
    Filter,
    UnscopedMutation,
    InvalidData,
    Decode,
}

/// Classified repository error
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Not connected: {message}")]
    NotConnected {
        message: String,
        query: Option<String>,
    },

    #[error("Table '{table}' not found")]
    TableNotFound {
        table: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Column '{column}' not found")]
    ColumnNotFound {
        column: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Identity column violation: {message}")]
    IdentityColumnViolation {
        message: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{message}")]
    NoResult {
        message: String,
        query: Option<String>,
    },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Refusing to {operation} every row of '{table}' without filters")]
    UnscopedMutation {
        operation: &'static str,
        table: String,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Decode error: {message}")]
    Decode {
        message: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },
}

impl RepositoryError {
    pub const DEFAULT_NO_RESULT_MESSAGE: &'static str = "No result found";

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
            query: None,
        }
    }

    pub fn no_result(message: Option<&str>, query: impl Into<String>) -> Self {
        Self::NoResult {
            message: message.unwrap_or(Self::DEFAULT_NO_RESULT_MESSAGE).to_string(),
            query: Some(query.into()),
        }
    }

    pub fn decode(message: impl Into<String>, query: Option<String>, source: Option<BoxError>) -> Self {
        Self::Decode {
            message: message.into(),
            query,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotConnected { .. } => ErrorKind::NotConnected,
            Self::TableNotFound { .. } => ErrorKind::TableNotFound,
            Self::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Self::IdentityColumnViolation { .. } => ErrorKind::IdentityColumnViolation,
            Self::NoResult { .. } => ErrorKind::NoResult,
            Self::Query { .. } => ErrorKind::Query,
            Self::Filter(_) => ErrorKind::Filter,
            Self::UnscopedMutation { .. } => ErrorKind::UnscopedMutation,
            Self::InvalidData(_) => ErrorKind::InvalidData,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// SQL text of the statement that failed, when one was executed
    pub fn query_text(&self) -> Option<&str> {
        match self {
            Self::Connection { query, .. }
            | Self::NotConnected { query, .. }
            | Self::TableNotFound { query, .. }
            | Self::ColumnNotFound { query, .. }
            | Self::IdentityColumnViolation { query, .. }
            | Self::NoResult { query, .. }
            | Self::Query { query, .. }
            | Self::Decode { query, .. } => query.as_deref(),
            Self::Filter(_) | Self::UnscopedMutation { .. } | Self::InvalidData(_) => None,
        }
    }

    /// Attach the query text if none is recorded yet
    pub(crate) fn with_query(mut self, sql: &str) -> Self {
        match &mut self {
            Self::Connection { query, .. }
            | Self::NotConnected { query, .. }
            | Self::TableNotFound { query, .. }
            | Self::ColumnNotFound { query, .. }
            | Self::IdentityColumnViolation { query, .. }
            | Self::NoResult { query, .. }
            | Self::Query { query, .. }
            | Self::Decode { query, .. } => {
                if query.is_none() {
                    *query = Some(sql.to_string());
                }
            }
            Self::Filter(_) | Self::UnscopedMutation { .. } | Self::InvalidData(_) => {}
        }
        self
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { source, .. } => !matches!(
                source.as_deref().and_then(|e| e.downcast_ref::<sqlx::Error>()),
                Some(sqlx::Error::Configuration(_) | sqlx::Error::Tls(_))
            ),
            _ => false,
        }
    }

    /// Structured form for error-reporting collaborators
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            query_text: self.query_text().map(str::to_string),
            cause: std::error::Error::source(self).map(|e| e.to_string()),
        }
    }
}

/// Serializable error report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub query_text: Option<String>,
    pub cause: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            RepositoryError::not_connected("closed").kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            RepositoryError::no_result(None, "SELECT 1").kind(),
            ErrorKind::NoResult
        );
        assert_eq!(
            RepositoryError::from(FilterError::InvalidSearch("x".into())).kind(),
            ErrorKind::Filter
        );
    }

    #[test]
    fn test_no_result_message() {
        let err = RepositoryError::no_result(None, "SELECT 1");
        assert_eq!(err.to_string(), "No result found");
        let err = RepositoryError::no_result(Some("user missing"), "SELECT 1");
        assert_eq!(err.to_string(), "user missing");
        assert_eq!(err.query_text(), Some("SELECT 1"));
    }

    #[test]
    fn test_with_query_keeps_existing() {
        let err = RepositoryError::no_result(None, "SELECT 1").with_query("SELECT 2");
        assert_eq!(err.query_text(), Some("SELECT 1"));
        let err = RepositoryError::not_connected("closed").with_query("SELECT 2");
        assert_eq!(err.query_text(), Some("SELECT 2"));
    }

    #[test]
    fn test_is_transient() {
        let err = RepositoryError::Connection {
            message: "timed out".into(),
            query: None,
            source: Some(Box::new(sqlx::Error::PoolTimedOut)),
        };
        assert!(err.is_transient());

        let err = RepositoryError::Connection {
            message: "bad url".into(),
            query: None,
            source: Some(Box::new(sqlx::Error::Configuration("bad".into()))),
        };
        assert!(!err.is_transient());
        assert!(!RepositoryError::InvalidData("x".into()).is_transient());
    }

    #[test]
    fn test_report_serialization() {
        let err = RepositoryError::ColumnNotFound {
            column: "nope".into(),
            query: Some(r#"SELECT "nope" FROM "t""#.into()),
            source: Some(Box::new(sqlx::Error::ColumnNotFound("nope".into()))),
        };
        let report = serde_json::to_value(err.report()).unwrap();
        assert_eq!(report["kind"], json!("column_not_found"));
        assert_eq!(report["message"], json!("Column 'nope' not found"));
        assert_eq!(report["queryText"], json!(r#"SELECT "nope" FROM "t""#));
        assert!(report["cause"].as_str().unwrap().contains("nope"));
    }
}
