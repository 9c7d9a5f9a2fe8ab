//! Data access layer
//!
//! - `table` - Table metadata and declared field kinds
//! - `filters` - Filter expressions, operator registry, compiler and schema
//! - `sql` - Statement builder and per-backend dialects
//! - `database` - Pool and transaction handles
//! - `sqlite` / `postgres` - Connection setup, binding and row decoding
//! - `repository` - Find/count/insert/update/delete/stream per table
//! - `translate` - Driver error classification
//! - `error` - Repository error taxonomy

pub mod database;
pub mod error;
mod executor;
pub mod filters;
pub mod postgres;
pub mod repository;
pub mod sql;
pub mod sqlite;
pub mod table;
pub mod translate;

/// One row as column name to JSON value, in select order
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use database::{Database, DbTransaction};
pub use error::{ErrorKind, ErrorReport, RepositoryError};
pub use repository::{
    CountOptions, DeleteOptions, FindOneOptions, FindOptions, FindRequest, InsertOptions,
    NoResultPolicy, RecordStream, Repository, StreamObserver, StreamOptions, UpdateOptions,
};
pub use sql::Backend;
pub use table::{Field, FieldKind, TableMetadata, TableError};
pub use translate::{QueryFailure, translate};
