//! querydeck
//!
//! Declarative JSON filters compiled to parameterized SQL, and a table
//! repository on top of sqlx for SQLite and PostgreSQL.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use querydeck::{Database, DatabaseConfig, Field, FindOptions, Repository, TableMetadata};
//! use querydeck::filters::FilterExpression;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect(&DatabaseConfig::load(None)?).await?;
//! let table = Arc::new(TableMetadata::new(
//!     "reps",
//!     vec![Field::number("id"), Field::string("name")],
//!     vec!["id".to_string()],
//! )?);
//!
//! let repo: Repository = Repository::new(table, db);
//! let filters = FilterExpression::from_json(&json!({"name": {"$like": "Rep"}}))?;
//! let rows = repo.find(FindOptions::new().filters(filters)).await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod data;
pub mod utils;

pub use crate::core::config::DatabaseConfig;
pub use data::filters;
pub use data::{
    Backend, CountOptions, Database, DbTransaction, DeleteOptions, ErrorKind, ErrorReport, Field,
    FieldKind, FindOneOptions, FindOptions, FindRequest, InsertOptions, NoResultPolicy, Record,
    RecordStream, Repository, RepositoryError, StreamObserver, StreamOptions, TableMetadata,
    UpdateOptions,
};
