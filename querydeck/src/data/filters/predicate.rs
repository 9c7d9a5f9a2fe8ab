//! Predicate tree rendered into WHERE clauses
//!
//! Predicates are backend-neutral. Rendering takes a dialect and appends
//! bound values to the statement parameters in placeholder order.

use crate::data::sql::{SqlDialect, SqlParams, SqlValue};
use crate::utils::sql::like_clause;

/// Binary comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// How the column is presented to a LIKE pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColumnCast {
    #[default]
    None,
    /// Non-text columns are cast to text first
    Text,
    /// Date columns are formatted as `YYYY-MM-DD HH:MM:SS`
    DateText,
}

/// A WHERE predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        column: String,
        op: Comparison,
        value: SqlValue,
        temporal: bool,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<SqlValue>,
        negated: bool,
        temporal: bool,
    },
    Between {
        column: String,
        low: SqlValue,
        high: SqlValue,
        negated: bool,
        temporal: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
        cast: ColumnCast,
    },
    /// Matches no row
    Never,
}

impl Predicate {
    /// True when the predicate places no constraint on rows
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::And(items) | Predicate::Or(items) => items.iter().all(Predicate::is_empty),
            // NOT IN () renders to nothing
            Predicate::In {
                values, negated, ..
            } => *negated && values.is_empty(),
            _ => false,
        }
    }

    /// AND two predicates, flattening nested conjunctions
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (a, b) if b.is_empty() => a,
            (a, b) if a.is_empty() => b,
            (Predicate::And(mut items), Predicate::And(more)) => {
                items.extend(more);
                Predicate::And(items)
            }
            (Predicate::And(mut items), b) => {
                items.push(b);
                Predicate::And(items)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Render to SQL; `None` when nothing constrains the rows
    pub fn to_sql(&self, dialect: &dyn SqlDialect, params: &mut SqlParams) -> Option<String> {
        match self {
            Predicate::And(items) => render_group(items, " AND ", dialect, params),
            Predicate::Or(items) => render_group(items, " OR ", dialect, params),
            Predicate::Compare {
                column,
                op,
                value,
                temporal,
            } => {
                let placeholder = params.bind(dialect, value.clone(), *temporal);
                Some(format!(
                    "{} {} {}",
                    dialect.quote_ident(column),
                    op.as_sql(),
                    placeholder
                ))
            }
            Predicate::IsNull { column, negated } => Some(format!(
                "{} IS {}NULL",
                dialect.quote_ident(column),
                if *negated { "NOT " } else { "" }
            )),
            Predicate::In {
                column,
                values,
                negated,
                temporal,
            } => {
                if values.is_empty() {
                    // NOT IN () holds for every row
                    return if *negated { None } else { Some("1 = 0".to_string()) };
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| params.bind(dialect, v.clone(), *temporal))
                    .collect();
                Some(format!(
                    "{} {}IN ({})",
                    dialect.quote_ident(column),
                    if *negated { "NOT " } else { "" },
                    placeholders.join(", ")
                ))
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
                temporal,
            } => {
                let low = params.bind(dialect, low.clone(), *temporal);
                let high = params.bind(dialect, high.clone(), *temporal);
                Some(format!(
                    "{} {}BETWEEN {} AND {}",
                    dialect.quote_ident(column),
                    if *negated { "NOT " } else { "" },
                    low,
                    high
                ))
            }
            Predicate::Like {
                column,
                pattern,
                negated,
                cast,
            } => {
                let quoted = dialect.quote_ident(column);
                let target = match cast {
                    ColumnCast::None => quoted,
                    ColumnCast::Text => dialect.cast_to_string(&quoted),
                    ColumnCast::DateText => dialect.date_to_string(&quoted),
                };
                let placeholder = params.bind(dialect, SqlValue::Text(pattern.clone()), false);
                Some(like_clause(&target, &placeholder, *negated))
            }
            Predicate::Never => Some("1 = 0".to_string()),
        }
    }
}

fn render_group(
    items: &[Predicate],
    joiner: &str,
    dialect: &dyn SqlDialect,
    params: &mut SqlParams,
) -> Option<String> {
    let parts: Vec<String> = items
        .iter()
        .filter_map(|p| p.to_sql(dialect, params))
        .collect();

    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(joiner))),
    }
}
