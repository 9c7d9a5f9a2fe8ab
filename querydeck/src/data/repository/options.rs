//! Per-operation query options

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::data::Record;
use crate::data::database::DbTransaction;
use crate::data::error::RepositoryError;
use crate::data::filters::FilterExpression;
use crate::data::sql::{FieldSelection, OrderBy};

/// What to do when a statement returns no rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NoResultPolicy {
    #[default]
    Ignore,
    Raise,
    /// Raise with a caller-supplied message
    RaiseWith(String),
}

impl NoResultPolicy {
    pub(crate) fn check(&self, rows: usize, query: &str) -> Result<(), RepositoryError> {
        if rows > 0 {
            return Ok(());
        }
        match self {
            NoResultPolicy::Ignore => Ok(()),
            NoResultPolicy::Raise => Err(RepositoryError::no_result(None, query)),
            NoResultPolicy::RaiseWith(message) => {
                Err(RepositoryError::no_result(Some(message), query))
            }
        }
    }
}

impl From<bool> for NoResultPolicy {
    fn from(raise: bool) -> Self {
        if raise {
            NoResultPolicy::Raise
        } else {
            NoResultPolicy::Ignore
        }
    }
}

impl From<&str> for NoResultPolicy {
    fn from(message: &str) -> Self {
        NoResultPolicy::RaiseWith(message.to_string())
    }
}

impl From<String> for NoResultPolicy {
    fn from(message: String) -> Self {
        NoResultPolicy::RaiseWith(message)
    }
}

/// Per-row hook applied by [`find_stream`](super::Repository::find_stream)
pub type RowTransform = Arc<dyn Fn(Record) -> Record + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub selected_fields: FieldSelection,
    pub filters: Option<FilterExpression>,
    /// Defaults to the first primary key column, ascending
    pub order_by: Option<Vec<OrderBy>>,
    /// Defaults to the database's configured limit
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub throw_if_no_result: NoResultPolicy,
    pub transaction: Option<DbTransaction>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: impl Into<FilterExpression>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn select(mut self, fields: FieldSelection) -> Self {
        self.selected_fields = fields;
        self
    }

    pub fn order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn throw_if_no_result(mut self, policy: impl Into<NoResultPolicy>) -> Self {
        self.throw_if_no_result = policy.into();
        self
    }

    pub fn transaction(mut self, tx: &DbTransaction) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

/// Options for a point read; filters are required
#[derive(Debug, Clone)]
pub struct FindOneOptions {
    pub filters: FilterExpression,
    pub selected_fields: FieldSelection,
    pub order_by: Option<Vec<OrderBy>>,
    pub throw_if_no_result: NoResultPolicy,
    pub transaction: Option<DbTransaction>,
}

impl FindOneOptions {
    pub fn new(filters: impl Into<FilterExpression>) -> Self {
        Self {
            filters: filters.into(),
            selected_fields: FieldSelection::All,
            order_by: None,
            throw_if_no_result: NoResultPolicy::Ignore,
            transaction: None,
        }
    }

    pub fn throw_if_no_result(mut self, policy: impl Into<NoResultPolicy>) -> Self {
        self.throw_if_no_result = policy.into();
        self
    }

    pub fn transaction(mut self, tx: &DbTransaction) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub filters: Option<FilterExpression>,
    pub transaction: Option<DbTransaction>,
}

impl CountOptions {
    pub fn filters(filters: impl Into<FilterExpression>) -> Self {
        Self {
            filters: Some(filters.into()),
            transaction: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Columns returned for each inserted row
    pub selected_fields: FieldSelection,
    pub transaction: Option<DbTransaction>,
}

/// Options for an update; filters are required
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub filters: FilterExpression,
    pub selected_fields: FieldSelection,
    pub throw_if_no_result: NoResultPolicy,
    pub transaction: Option<DbTransaction>,
}

impl UpdateOptions {
    pub fn new(filters: impl Into<FilterExpression>) -> Self {
        Self {
            filters: filters.into(),
            selected_fields: FieldSelection::All,
            throw_if_no_result: NoResultPolicy::Ignore,
            transaction: None,
        }
    }

    pub fn throw_if_no_result(mut self, policy: impl Into<NoResultPolicy>) -> Self {
        self.throw_if_no_result = policy.into();
        self
    }

    pub fn transaction(mut self, tx: &DbTransaction) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

/// Options for a delete; filters are required
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    pub filters: FilterExpression,
    pub selected_fields: FieldSelection,
    pub throw_if_no_result: NoResultPolicy,
    pub transaction: Option<DbTransaction>,
}

impl DeleteOptions {
    pub fn new(filters: impl Into<FilterExpression>) -> Self {
        Self {
            filters: filters.into(),
            selected_fields: FieldSelection::All,
            throw_if_no_result: NoResultPolicy::Ignore,
            transaction: None,
        }
    }

    pub fn throw_if_no_result(mut self, policy: impl Into<NoResultPolicy>) -> Self {
        self.throw_if_no_result = policy.into();
        self
    }

    pub fn transaction(mut self, tx: &DbTransaction) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

/// Options for a cursor read; no pagination
#[derive(Clone, Default)]
pub struct StreamOptions {
    pub selected_fields: FieldSelection,
    pub filters: Option<FilterExpression>,
    pub order_by: Option<Vec<OrderBy>>,
    pub transform: Option<RowTransform>,
    pub transaction: Option<DbTransaction>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: impl Into<FilterExpression>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn transaction(mut self, tx: &DbTransaction) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("selected_fields", &self.selected_fields)
            .field("filters", &self.filters)
            .field("order_by", &self.order_by)
            .field("transform", &self.transform.is_some())
            .field("transaction", &self.transaction)
            .finish()
    }
}

/// Find request as it arrives from a request-handling layer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindRequest {
    #[serde(default)]
    pub selected_fields: Option<FieldSelection>,
    #[serde(default)]
    pub filters: Option<FilterExpression>,
    #[serde(default)]
    pub order_by: Option<Vec<OrderBy>>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl From<FindRequest> for FindOptions {
    fn from(request: FindRequest) -> Self {
        Self {
            selected_fields: request.selected_fields.unwrap_or_default(),
            filters: request.filters,
            order_by: request.order_by,
            limit: request.limit,
            offset: request.offset,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_no_result_policy_conversions() {
        assert_eq!(NoResultPolicy::from(false), NoResultPolicy::Ignore);
        assert_eq!(NoResultPolicy::from(true), NoResultPolicy::Raise);
        assert_eq!(
            NoResultPolicy::from("gone"),
            NoResultPolicy::RaiseWith("gone".into())
        );
    }

    #[test]
    fn test_no_result_policy_check() {
        assert!(NoResultPolicy::Raise.check(1, "q").is_ok());
        assert!(NoResultPolicy::Ignore.check(0, "q").is_ok());
        let err = NoResultPolicy::RaiseWith("gone".into())
            .check(0, "q")
            .unwrap_err();
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn test_find_request_into_options() {
        let request: FindRequest = serde_json::from_value(json!({
            "selectedFields": "*",
            "filters": [{"id": 1}, {"id": 2}],
            "orderBy": [{"column": "id", "direction": "desc"}],
            "limit": 5,
        }))
        .unwrap();
        let options = FindOptions::from(request);
        assert_eq!(options.selected_fields, FieldSelection::All);
        assert_eq!(options.order_by, Some(vec![OrderBy::desc("id")]));
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.offset, None);
        assert!(matches!(options.filters, Some(FilterExpression::AnyOf(ref c)) if c.len() == 2));
    }

    #[test]
    fn test_find_request_rejects_unknown_keys() {
        assert!(serde_json::from_value::<FindRequest>(json!({"page": 1})).is_err());
    }
}
