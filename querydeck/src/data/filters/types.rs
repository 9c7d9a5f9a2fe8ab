//! Filter expression types
//!
//! The value space of a filter payload is decided once, when the JSON is
//! parsed, into tagged variants. The compiler never re-inspects JSON shapes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::sql::{FieldSelection, SqlValue};

use super::operators::{OperandShape, Operator};

/// Reserved clause key for fan-out pattern search
pub const SEARCH_KEY: &str = "$q";

/// Errors raised while parsing or compiling a filter expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Filter clause must be a JSON object, got {0}")]
    InvalidClause(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid operand for {operator} on field '{field}': {reason}")]
    InvalidOperand {
        field: String,
        operator: &'static str,
        reason: String,
    },

    #[error("Invalid $q search: {0}")]
    InvalidSearch(String),

    #[error("Filter JSON exceeds maximum size of {0} bytes")]
    TooLarge(usize),

    #[error("Maximum {0} filter clauses allowed")]
    TooManyClauses(usize),

    #[error("Invalid filter JSON: {0}")]
    Json(String),
}

/// A single literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parse a JSON scalar; arrays and objects are rejected
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(*f),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }

    /// Bindable SQL value (`None` for NULL)
    pub fn to_sql_value(&self) -> Option<SqlValue> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(SqlValue::Bool(*b)),
            Scalar::Int(i) => Some(SqlValue::Int(*i)),
            Scalar::Float(f) => Some(SqlValue::Float(*f)),
            Scalar::Text(s) => Some(SqlValue::Text(s.clone())),
        }
    }

    /// JavaScript-style truthiness, used to skip empty `$q` searches
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0 && !f.is_nan(),
            Scalar::Text(s) => !s.is_empty(),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    /// Text form used when the value becomes part of a LIKE pattern
    pub fn as_pattern_text(&self) -> Option<String> {
        match self {
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Bool(_) | Scalar::Null => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Payload of one operator inside an operator clause
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Range(Scalar, Scalar),
    Flag(bool),
}

impl Operand {
    fn to_json(&self) -> Value {
        match self {
            Operand::Scalar(s) => s.to_json(),
            Operand::List(items) => Value::Array(items.iter().map(Scalar::to_json).collect()),
            Operand::Range(low, high) => Value::Array(vec![low.to_json(), high.to_json()]),
            Operand::Flag(b) => Value::Bool(*b),
        }
    }
}

/// Ordered operator/operand pairs for one field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorClause {
    pub entries: Vec<(Operator, Operand)>,
}

impl OperatorClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, operator: Operator, operand: Operand) -> Self {
        self.entries.push((operator, operand));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse an object that has at least one known operator key
    ///
    /// Unknown keys are dropped; null operands are treated as absent.
    fn from_json(field: &str, map: &Map<String, Value>) -> Result<Self, FilterError> {
        let mut clause = Self::new();
        for (key, raw) in map {
            let Some(operator) = Operator::from_symbol(key) else {
                tracing::trace!(field, operator = %key, "Ignoring unsupported operator");
                continue;
            };
            if raw.is_null() {
                continue;
            }
            let operand = parse_operand(field, operator, raw)?;
            clause.entries.push((operator, operand));
        }
        Ok(clause)
    }
}

fn parse_operand(field: &str, operator: Operator, raw: &Value) -> Result<Operand, FilterError> {
    let invalid = |reason: &str| FilterError::InvalidOperand {
        field: field.to_string(),
        operator: operator.symbol(),
        reason: reason.to_string(),
    };

    match operator.shape() {
        OperandShape::Scalar => Scalar::from_json(raw)
            .map(Operand::Scalar)
            .ok_or_else(|| invalid("expected a scalar value")),
        OperandShape::Pattern => match raw {
            Value::String(_) | Value::Number(_) => {
                Ok(Operand::Scalar(Scalar::from_json(raw).unwrap_or(Scalar::Null)))
            }
            _ => Err(invalid("expected a string or number pattern")),
        },
        OperandShape::Flag => raw
            .as_bool()
            .map(Operand::Flag)
            .ok_or_else(|| invalid("expected a boolean")),
        OperandShape::List => {
            let items = raw.as_array().ok_or_else(|| invalid("expected an array"))?;
            items
                .iter()
                .map(|item| Scalar::from_json(item).ok_or_else(|| invalid("expected scalar items")))
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::List)
        }
        OperandShape::Range => match raw.as_array().map(Vec::as_slice) {
            Some([low, high]) => match (Scalar::from_json(low), Scalar::from_json(high)) {
                (Some(low), Some(high)) => Ok(Operand::Range(low, high)),
                _ => Err(invalid("range bounds must be scalars")),
            },
            _ => Err(invalid("expected a [low, high] pair")),
        },
    }
}

/// Condition attached to one field of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Literal equality; `Null` means IS NULL
    Equals(Scalar),
    Operators(OperatorClause),
    /// Empty object or an object without any known operator
    Unconstrained,
}

impl FieldCondition {
    fn from_json(field: &str, raw: &Value) -> Result<Self, FilterError> {
        match raw {
            Value::Object(map) if map.is_empty() => Ok(FieldCondition::Unconstrained),
            Value::Object(map) => {
                if map.keys().any(|k| Operator::from_symbol(k).is_some()) {
                    OperatorClause::from_json(field, map).map(FieldCondition::Operators)
                } else {
                    Ok(FieldCondition::Unconstrained)
                }
            }
            Value::Array(_) => Err(FilterError::InvalidValue {
                field: field.to_string(),
                reason: "arrays are only valid as operator operands".to_string(),
            }),
            scalar => Ok(FieldCondition::Equals(
                Scalar::from_json(scalar).unwrap_or(Scalar::Null),
            )),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldCondition::Equals(s) => s.to_json(),
            FieldCondition::Operators(clause) => Value::Object(
                clause
                    .entries
                    .iter()
                    .map(|(op, operand)| (op.symbol().to_string(), operand.to_json()))
                    .collect(),
            ),
            FieldCondition::Unconstrained => Value::Object(Map::new()),
        }
    }
}

/// `$q` fan-out search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// Pattern-match the value against every table field
    AllFields(Scalar),
    /// Match only the selected fields; numbers match exactly
    Fields {
        fields: FieldSelection,
        value: Scalar,
    },
}

impl SearchTerm {
    fn from_json(raw: &Value) -> Result<Self, FilterError> {
        match raw {
            Value::Object(map) => {
                let fields = map
                    .get("selectedFields")
                    .ok_or_else(|| FilterError::InvalidSearch("missing selectedFields".into()))?;
                let fields = FieldSelection::deserialize(fields)
                    .map_err(|e| FilterError::InvalidSearch(e.to_string()))?;
                let value = match map.get("value") {
                    Some(v @ (Value::String(_) | Value::Number(_))) => {
                        Scalar::from_json(v).unwrap_or(Scalar::Null)
                    }
                    _ => {
                        return Err(FilterError::InvalidSearch(
                            "value must be a string or number".into(),
                        ));
                    }
                };
                Ok(SearchTerm::Fields { fields, value })
            }
            Value::Array(_) => Err(FilterError::InvalidSearch(
                "expected a scalar or {selectedFields, value}".into(),
            )),
            scalar => Ok(SearchTerm::AllFields(
                Scalar::from_json(scalar).unwrap_or(Scalar::Null),
            )),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            SearchTerm::AllFields(value) => value.to_json(),
            SearchTerm::Fields { fields, value } => serde_json::json!({
                "selectedFields": fields.to_json(),
                "value": value.to_json(),
            }),
        }
    }
}

/// One key of a filter clause
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseEntry {
    Field {
        name: String,
        condition: FieldCondition,
    },
    Search(SearchTerm),
}

/// Entries ANDed together, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterClause {
    pub entries: Vec<ClauseEntry>,
}

impl FilterClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal equality (`{field: value}`)
    pub fn eq(self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.field(field, FieldCondition::Equals(value.into()))
    }

    /// Single operator condition (`{field: {$op: operand}}`)
    pub fn op(self, field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        self.field(
            field,
            FieldCondition::Operators(OperatorClause::new().with(operator, operand)),
        )
    }

    pub fn field(mut self, field: impl Into<String>, condition: FieldCondition) -> Self {
        self.entries.push(ClauseEntry::Field {
            name: field.into(),
            condition,
        });
        self
    }

    pub fn search(mut self, term: SearchTerm) -> Self {
        self.entries.push(ClauseEntry::Search(term));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn from_json(raw: &Value) -> Result<Self, FilterError> {
        let map = raw
            .as_object()
            .ok_or_else(|| FilterError::InvalidClause(json_type_name(raw).to_string()))?;

        let mut clause = Self::new();
        for (key, value) in map {
            if key == SEARCH_KEY {
                clause = clause.search(SearchTerm::from_json(value)?);
            } else {
                clause = clause.field(key.clone(), FieldCondition::from_json(key, value)?);
            }
        }
        Ok(clause)
    }

    fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|entry| match entry {
                    ClauseEntry::Field { name, condition } => (name.clone(), condition.to_json()),
                    ClauseEntry::Search(term) => (SEARCH_KEY.to_string(), term.to_json()),
                })
                .collect(),
        )
    }
}

/// A single clause, or clauses ORed together
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Clause(FilterClause),
    AnyOf(Vec<FilterClause>),
}

impl FilterExpression {
    /// Decide the shape of a JSON filter payload
    pub fn from_json(raw: &Value) -> Result<Self, FilterError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .map(FilterClause::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(FilterExpression::AnyOf),
            other => FilterClause::from_json(other).map(FilterExpression::Clause),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterExpression::Clause(clause) => clause.to_json(),
            FilterExpression::AnyOf(clauses) => {
                Value::Array(clauses.iter().map(FilterClause::to_json).collect())
            }
        }
    }
}

impl From<FilterClause> for FilterExpression {
    fn from(clause: FilterClause) -> Self {
        FilterExpression::Clause(clause)
    }
}

impl Serialize for FilterExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        FilterExpression::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
