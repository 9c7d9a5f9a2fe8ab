//! Filter compiler
//!
//! Lowers a filter expression into a predicate tree: clauses are ORed,
//! entries within a clause are ANDed in insertion order.

use crate::data::sql::Statement;
use crate::data::table::TableMetadata;

use super::operators::{Operator, like};
use super::predicate::{Comparison, Predicate};
use super::types::{
    ClauseEntry, FieldCondition, FilterClause, FilterError, FilterExpression, Operand, Scalar,
    SearchTerm,
};

/// Compile an expression against a table
pub fn compile(expression: &FilterExpression, table: &TableMetadata) -> Result<Predicate, FilterError> {
    match expression {
        FilterExpression::Clause(clause) => compile_clause(clause, table),
        FilterExpression::AnyOf(clauses) => {
            let branches = clauses
                .iter()
                .map(|clause| compile_clause(clause, table))
                .collect::<Result<Vec<_>, _>>()?;
            // a branch without conditions does not widen the union
            Ok(Predicate::Or(
                branches.into_iter().filter(|b| !b.is_empty()).collect(),
            ))
        }
    }
}

/// Compile an expression and AND it into the statement's WHERE clause
pub fn apply_filters(statement: &mut Statement, expression: &FilterExpression) -> Result<(), FilterError> {
    let predicate = compile(expression, statement.table())?;
    if !predicate.is_empty() {
        statement.push_filter(predicate);
    }
    Ok(())
}

fn compile_clause(clause: &FilterClause, table: &TableMetadata) -> Result<Predicate, FilterError> {
    let mut predicates = Vec::with_capacity(clause.entries.len());

    for entry in &clause.entries {
        match entry {
            ClauseEntry::Field { name, condition } => {
                let kind = table.field_kind(name);
                match condition {
                    FieldCondition::Equals(value) => {
                        let operand = Operand::Scalar(value.clone());
                        predicates.extend(Operator::Eq.apply(name, &operand, kind)?);
                    }
                    FieldCondition::Operators(ops) => {
                        for (operator, operand) in &ops.entries {
                            predicates.extend(operator.apply(name, operand, kind)?);
                        }
                    }
                    FieldCondition::Unconstrained => {}
                }
            }
            ClauseEntry::Search(term) => predicates.extend(compile_search(term, table)?),
        }
    }

    tracing::trace!(table = table.name(), predicates = predicates.len(), "Compiled filter clause");
    Ok(Predicate::And(predicates))
}

fn compile_search(term: &SearchTerm, table: &TableMetadata) -> Result<Option<Predicate>, FilterError> {
    match term {
        SearchTerm::AllFields(value) => {
            if !value.is_truthy() {
                return Ok(None);
            }
            let text = match value {
                Scalar::Bool(b) => b.to_string(),
                other => other.as_pattern_text().unwrap_or_default(),
            };
            let branches = table
                .fields()
                .iter()
                .map(|f| like(f.name.clone(), &text, false, Some(f.kind)))
                .collect();
            Ok(Some(Predicate::Or(branches)))
        }
        SearchTerm::Fields { fields, value } => {
            let text = match value {
                Scalar::Text(s) if s.is_empty() => return Ok(None),
                Scalar::Text(s) => Some(s.as_str()),
                Scalar::Int(_) | Scalar::Float(_) => None,
                Scalar::Null | Scalar::Bool(_) => {
                    return Err(FilterError::InvalidSearch(
                        "value must be a string or number".to_string(),
                    ));
                }
            };
            let mut branches = Vec::new();
            for field in fields.resolve(table) {
                let kind = table.field_kind(field);
                let predicate = match text {
                    Some(text) => like(field.to_string(), text, false, kind),
                    None => match value.to_sql_value() {
                        Some(v) => Predicate::Compare {
                            column: field.to_string(),
                            op: Comparison::Eq,
                            value: v,
                            temporal: false,
                        },
                        None => Predicate::Never,
                    },
                };
                branches.push(predicate);
            }
            Ok(Some(Predicate::Or(branches)))
        }
    }
}
