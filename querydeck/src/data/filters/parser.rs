//! Filter parsing
//!
//! Parses a JSON filter payload (e.g. from a query param) into a typed
//! expression, with size and clause-count caps applied first.

use serde_json::Value;

use crate::core::constants::{MAX_FILTER_CLAUSES, MAX_FILTER_JSON_SIZE};

use super::types::{FilterError, FilterExpression};

/// Parse filters from a JSON string
pub fn parse_filters(json_str: &str) -> Result<FilterExpression, FilterError> {
    if json_str.len() > MAX_FILTER_JSON_SIZE {
        return Err(FilterError::TooLarge(MAX_FILTER_JSON_SIZE));
    }

    let raw: Value = serde_json::from_str(json_str).map_err(|e| FilterError::Json(e.to_string()))?;

    if let Value::Array(clauses) = &raw
        && clauses.len() > MAX_FILTER_CLAUSES
    {
        return Err(FilterError::TooManyClauses(MAX_FILTER_CLAUSES));
    }

    FilterExpression::from_json(&raw)
}
