//! Query filter system
//!
//! Filters are JSON-shaped expressions: a clause maps fields to literals or
//! operator objects, and an array of clauses is an OR of those clauses.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use querydeck::data::filters::{apply_filters, parse_filters};
//! use querydeck::data::sql::{Backend, Statement};
//! use querydeck::data::table::{Field, TableMetadata};
//!
//! let table = TableMetadata::new("users", vec![Field::number("id")], vec!["id".into()]).unwrap();
//! let filters = parse_filters(r#"{"id": {"$gte": 5}}"#).unwrap();
//! let mut stmt = Statement::select(Arc::new(table));
//! apply_filters(&mut stmt, &filters).unwrap();
//! let (sql, params) = stmt.build(Backend::Sqlite.dialect());
//! ```

mod compiler;
mod operators;
mod parser;
mod predicate;
mod schema;
mod types;

pub use compiler::{apply_filters, compile};
pub use operators::{OperandShape, Operator};
pub use parser::parse_filters;
pub use predicate::{ColumnCast, Comparison, Predicate};
pub use schema::{
    FilterValidator, SchemaCompilationError, ValidationError, Violation, WhereSchema,
    operators_for,
};
pub use types::{
    ClauseEntry, FieldCondition, FilterClause, FilterError, FilterExpression, Operand,
    OperatorClause, SEARCH_KEY, Scalar, SearchTerm,
};
