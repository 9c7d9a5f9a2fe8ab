//! Adaptive where-clause schema
//!
//! Derives, from a table's declared field kinds, the operators each field
//! accepts and renders them as a JSON Schema. Payloads are validated
//! against it before they become a typed [`FilterExpression`].

use std::collections::BTreeSet;
use std::sync::Arc;

use jsonschema::validator_for;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::constants::MAX_FILTER_CLAUSES;
use crate::data::repository::FindRequest;
use crate::data::table::{FieldKind, TableMetadata};

use super::operators::{OperandShape, Operator};
use super::types::{FilterError, FilterExpression, SEARCH_KEY};

/// Operators valid for a field kind
pub fn operators_for(kind: FieldKind) -> BTreeSet<Operator> {
    Operator::ALL
        .into_iter()
        .filter(|op| op.applies_to(kind))
        .collect()
}

/// JSON Schema builders for one table
pub struct WhereSchema;

impl WhereSchema {
    /// Schema of a filter expression: one clause or an array of clauses
    pub fn for_table(table: &TableMetadata) -> Value {
        let clause = clause_schema(table);
        json!({
            "anyOf": [
                clause,
                {
                    "type": "array",
                    "items": clause,
                    "maxItems": MAX_FILTER_CLAUSES,
                },
            ]
        })
    }

    /// Schema of a whole find request
    pub fn find_request(table: &TableMetadata) -> Value {
        let columns: Vec<&str> = table.field_names().collect();
        let direction = json!({"enum": ["asc", "desc", "ASC", "DESC"]});
        json!({
            "type": "object",
            "properties": {
                "selectedFields": selection_schema(table),
                "filters": Self::for_table(table),
                "orderBy": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "column": {"enum": columns},
                            "direction": direction,
                            "order": direction,
                        },
                        "required": ["column"],
                        "additionalProperties": false,
                    },
                },
                "limit": {"type": "integer", "minimum": 0},
                "offset": {"type": "integer", "minimum": 0},
            },
            "additionalProperties": false,
        })
    }
}

fn value_schema(kind: FieldKind) -> Value {
    match kind {
        FieldKind::String | FieldKind::Date => json!({"type": "string"}),
        FieldKind::Number => json!({"type": "number"}),
        FieldKind::Boolean => json!({"type": "boolean"}),
        FieldKind::Json => json!({"type": ["string", "number", "boolean"]}),
    }
}

fn operand_schema(op: Operator, kind: FieldKind) -> Value {
    let value = value_schema(kind);
    match op.shape() {
        OperandShape::Scalar => value,
        OperandShape::Pattern => json!({"type": ["string", "number"]}),
        OperandShape::Flag => json!({"type": "boolean"}),
        OperandShape::List => json!({
            "type": "array",
            "items": value,
            "minItems": 1,
            "uniqueItems": true,
        }),
        OperandShape::Range => json!({
            "type": "array",
            "items": value,
            "minItems": 2,
            "maxItems": 2,
        }),
    }
}

fn field_schema(kind: FieldKind) -> Value {
    let operators: Map<String, Value> = operators_for(kind)
        .into_iter()
        .map(|op| {
            (
                op.symbol().to_string(),
                json!({"anyOf": [operand_schema(op, kind), {"type": "null"}]}),
            )
        })
        .collect();

    json!({
        "anyOf": [
            value_schema(kind),
            {"type": "null"},
            {
                "type": "object",
                "properties": operators,
                "additionalProperties": false,
            },
        ]
    })
}

fn selection_schema(table: &TableMetadata) -> Value {
    let mut names: Vec<&str> = table.field_names().collect();
    names.push("*");
    json!({
        "anyOf": [
            {"const": "*"},
            {"type": "array", "items": {"enum": names}, "minItems": 1},
        ]
    })
}

fn clause_schema(table: &TableMetadata) -> Value {
    let mut properties: Map<String, Value> = table
        .fields()
        .iter()
        .map(|f| (f.name.clone(), field_schema(f.kind)))
        .collect();
    properties.insert(
        SEARCH_KEY.to_string(),
        json!({
            "anyOf": [
                {"type": ["string", "number", "boolean", "null"]},
                {
                    "type": "object",
                    "properties": {
                        "selectedFields": selection_schema(table),
                        "value": {"type": ["string", "number"]},
                    },
                    "required": ["selectedFields", "value"],
                    "additionalProperties": false,
                },
            ]
        }),
    );

    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false,
    })
}

/// Schema compilation error
#[derive(Debug, Error)]
pub enum SchemaCompilationError {
    #[error("Invalid JSON Schema: {0}")]
    InvalidSchema(String),
}

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub instance_path: String,
    pub message: String,
}

/// Payload rejected before reaching the compiler
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Filter validation failed with {} violation(s)", .0.len())]
    Violations(Vec<Violation>),

    #[error(transparent)]
    Malformed(#[from] FilterError),
}

/// Compiled validators for one table
pub struct FilterValidator {
    table: Arc<TableMetadata>,
    schema: Value,
    filters: jsonschema::Validator,
    request: jsonschema::Validator,
}

impl FilterValidator {
    pub fn new(table: Arc<TableMetadata>) -> Result<Self, SchemaCompilationError> {
        let schema = WhereSchema::for_table(&table);
        let filters = validator_for(&schema)
            .map_err(|e| SchemaCompilationError::InvalidSchema(e.to_string()))?;
        let request = validator_for(&WhereSchema::find_request(&table))
            .map_err(|e| SchemaCompilationError::InvalidSchema(e.to_string()))?;

        Ok(Self {
            table,
            schema,
            filters,
            request,
        })
    }

    pub fn table(&self) -> &TableMetadata {
        &self.table
    }

    /// Where-clause schema
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a filter payload and parse it into a typed expression
    pub fn validate(&self, payload: &Value) -> Result<FilterExpression, ValidationError> {
        check(&self.filters, payload, self.table.name())?;
        Ok(FilterExpression::from_json(payload)?)
    }

    /// Validate a whole find request
    pub fn validate_request(&self, payload: &Value) -> Result<FindRequest, ValidationError> {
        check(&self.request, payload, self.table.name())?;
        serde_json::from_value(payload.clone())
            .map_err(|e| ValidationError::Malformed(FilterError::Json(e.to_string())))
    }
}

fn check(validator: &jsonschema::Validator, payload: &Value, table: &str) -> Result<(), ValidationError> {
    let violations: Vec<Violation> = validator
        .iter_errors(payload)
        .map(|e| Violation {
            instance_path: e.instance_path().to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        tracing::debug!(table, violations = violations.len(), "Filter payload rejected");
        Err(ValidationError::Violations(violations))
    }
}
