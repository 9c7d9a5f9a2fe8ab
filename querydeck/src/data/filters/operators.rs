//! Operator registry
//!
//! The closed set of filter operators and how each one lowers to a
//! predicate for a column of a given kind.

use std::fmt;

use crate::data::sql::SqlValue;
use crate::data::table::FieldKind;
use crate::utils::sql::contains_pattern;
use crate::utils::time::canonical_date_text;

use super::predicate::{ColumnCast, Comparison, Predicate};
use super::types::{FilterError, Operand, Scalar};

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Between,
    NotBetween,
    Like,
    NotLike,
    IsNull,
}

/// Payload shape an operator expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Scalar,
    /// String, or a number that is stringified
    Pattern,
    List,
    /// `[low, high]`
    Range,
    Flag,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::In,
        Operator::Nin,
        Operator::Between,
        Operator::NotBetween,
        Operator::Like,
        Operator::NotLike,
        Operator::IsNull,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Neq => "$neq",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Between => "$between",
            Operator::NotBetween => "$nbetween",
            Operator::Like => "$like",
            Operator::NotLike => "$nlike",
            Operator::IsNull => "$isNull",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn shape(&self) -> OperandShape {
        match self {
            Operator::Eq
            | Operator::Neq
            | Operator::Lt
            | Operator::Lte
            | Operator::Gt
            | Operator::Gte => OperandShape::Scalar,
            Operator::In | Operator::Nin => OperandShape::List,
            Operator::Between | Operator::NotBetween => OperandShape::Range,
            Operator::Like | Operator::NotLike => OperandShape::Pattern,
            Operator::IsNull => OperandShape::Flag,
        }
    }

    /// Field kinds the operator is meaningful for
    pub fn applies_to(&self, kind: FieldKind) -> bool {
        let listable = matches!(kind, FieldKind::String | FieldKind::Number | FieldKind::Date);
        let orderable = matches!(kind, FieldKind::Number | FieldKind::Date);
        match self {
            Operator::Eq | Operator::Neq | Operator::IsNull => true,
            Operator::In | Operator::Nin | Operator::Like | Operator::NotLike => listable,
            Operator::Lt
            | Operator::Lte
            | Operator::Gt
            | Operator::Gte
            | Operator::Between
            | Operator::NotBetween => orderable,
        }
    }

    /// Lower one operator on `column` into a predicate
    ///
    /// `kind` is the declared kind of the column, `None` for columns the
    /// table metadata does not describe. `Ok(None)` means no condition.
    pub fn apply(
        &self,
        column: &str,
        operand: &Operand,
        kind: Option<FieldKind>,
    ) -> Result<Option<Predicate>, FilterError> {
        let column = column.to_string();

        match (self, operand) {
            (Operator::Eq | Operator::Neq, Operand::Scalar(Scalar::Null)) => {
                Ok(Some(Predicate::IsNull {
                    column,
                    negated: *self == Operator::Neq,
                }))
            }
            (
                Operator::Eq
                | Operator::Neq
                | Operator::Lt
                | Operator::Lte
                | Operator::Gt
                | Operator::Gte,
                Operand::Scalar(value),
            ) => Ok(Some(compare(column, self.comparison(), value, kind))),
            (Operator::In | Operator::Nin, Operand::List(items)) => {
                let values: Vec<SqlValue> = items.iter().filter_map(Scalar::to_sql_value).collect();
                if values.is_empty() {
                    // nothing listed: $in matches no row, $nin excludes none
                    return Ok((*self == Operator::In).then_some(Predicate::Never));
                }
                let temporal = items.iter().any(|v| is_temporal(v, kind));
                Ok(Some(Predicate::In {
                    column,
                    values,
                    negated: *self == Operator::Nin,
                    temporal,
                }))
            }
            (Operator::Between | Operator::NotBetween, Operand::Range(low, high)) => {
                let temporal = is_temporal(low, kind) || is_temporal(high, kind);
                match (low.to_sql_value(), high.to_sql_value()) {
                    (Some(low), Some(high)) => Ok(Some(Predicate::Between {
                        column,
                        low,
                        high,
                        negated: *self == Operator::NotBetween,
                        temporal,
                    })),
                    // comparing against NULL never holds
                    _ => Ok(Some(Predicate::Never)),
                }
            }
            (Operator::Like | Operator::NotLike, Operand::Scalar(value)) => {
                let text = value.as_pattern_text().ok_or_else(|| FilterError::InvalidOperand {
                    field: column.clone(),
                    operator: self.symbol(),
                    reason: "expected a string or number pattern".to_string(),
                })?;
                Ok(Some(like(column, &text, *self == Operator::NotLike, kind)))
            }
            (Operator::IsNull, Operand::Flag(is_null)) => Ok(Some(Predicate::IsNull {
                column,
                negated: !is_null,
            })),
            (op, _) => Err(FilterError::InvalidOperand {
                field: column,
                operator: op.symbol(),
                reason: format!("operand does not match the {:?} shape", op.shape()),
            }),
        }
    }

    fn comparison(&self) -> Comparison {
        match self {
            Operator::Neq => Comparison::Ne,
            Operator::Lt => Comparison::Lt,
            Operator::Lte => Comparison::Lte,
            Operator::Gt => Comparison::Gt,
            Operator::Gte => Comparison::Gte,
            _ => Comparison::Eq,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Text values bound against a date column, or date-looking text on a
/// column of unknown kind
fn is_temporal(value: &Scalar, kind: Option<FieldKind>) -> bool {
    match (value, kind) {
        (Scalar::Text(_), Some(FieldKind::Date)) => true,
        (Scalar::Text(s), None) => canonical_date_text(s).is_some(),
        _ => false,
    }
}

fn compare(column: String, op: Comparison, value: &Scalar, kind: Option<FieldKind>) -> Predicate {
    match value.to_sql_value() {
        Some(sql_value) => Predicate::Compare {
            column,
            op,
            value: sql_value,
            temporal: is_temporal(value, kind),
        },
        None => Predicate::Never,
    }
}

/// `%value%` pattern match
///
/// Date columns, and undeclared columns searched with date-looking text,
/// match against the canonical text form of the column. Declared kinds win
/// over sniffing the value.
pub(crate) fn like(column: String, text: &str, negated: bool, kind: Option<FieldKind>) -> Predicate {
    let date_text = canonical_date_text(text);
    let cast = match kind {
        Some(FieldKind::Date) => ColumnCast::DateText,
        Some(FieldKind::String) => ColumnCast::None,
        Some(_) => ColumnCast::Text,
        None if date_text.is_some() => ColumnCast::DateText,
        None => ColumnCast::None,
    };
    let needle = match (cast, date_text.as_deref()) {
        (ColumnCast::DateText, Some(canonical)) => canonical,
        _ => text,
    };

    Predicate::Like {
        column,
        pattern: contains_pattern(needle),
        negated,
        cast,
    }
}
