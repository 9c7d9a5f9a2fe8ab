//! Statement builder
//!
//! Collects the pieces of one SQL statement and renders them for a dialect.
//! Identifiers are always quoted and every value is bound as a parameter,
//! except SQL NULL in insert/update values which is written inline.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::data::filters::Predicate;
use crate::data::table::{FieldKind, TableMetadata};

use super::SqlDialect;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl SqlValue {
    /// Convert a JSON value; `None` for JSON null
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(SqlValue::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(SqlValue::Json(value.clone())),
        }
    }
}

/// Collects SQL parameters during query building (maintains insertion order)
#[derive(Debug, Default)]
pub struct SqlParams {
    pub values: Vec<SqlValue>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its placeholder
    ///
    /// Text bound against a date-valued column gets the dialect's typed
    /// date placeholder.
    pub fn bind(&mut self, dialect: &dyn SqlDialect, value: SqlValue, temporal: bool) -> String {
        let typed = temporal && matches!(value, SqlValue::Text(_));
        self.values.push(value);
        let index = self.values.len();
        if typed {
            dialect.date_placeholder(index)
        } else {
            dialect.placeholder(index)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Columns to select or return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    Fields(Vec<String>),
}

impl FieldSelection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Column names this selection covers for a table
    pub fn resolve<'a>(&'a self, table: &'a TableMetadata) -> Vec<&'a str> {
        match self {
            FieldSelection::All => table.field_names().collect(),
            FieldSelection::Fields(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldSelection::All => Value::String("*".to_string()),
            FieldSelection::Fields(fields) => {
                Value::Array(fields.iter().cloned().map(Value::String).collect())
            }
        }
    }

    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            FieldSelection::All => "*".to_string(),
            FieldSelection::Fields(fields) if fields.is_empty() => "*".to_string(),
            FieldSelection::Fields(fields) => fields
                .iter()
                .map(|f| dialect.quote_ident(f))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl Serialize for FieldSelection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::One(s) if s == "*" => Ok(FieldSelection::All),
            Raw::One(s) => Ok(FieldSelection::Fields(vec![s])),
            Raw::Many(fields) if fields.iter().any(|f| f == "*") => Ok(FieldSelection::All),
            Raw::Many(fields) => Ok(FieldSelection::Fields(fields)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default, alias = "order")]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// One statement against one table
#[derive(Debug, Clone)]
pub struct Statement {
    table: Arc<TableMetadata>,
    kind: StatementKind,
    /// Select list, or the RETURNING list for mutations
    selection: FieldSelection,
    filter: Predicate,
    order_by: Vec<OrderBy>,
    pagination: Option<(u32, u32)>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    assignments: Vec<(String, Value)>,
}

impl Statement {
    fn new(table: Arc<TableMetadata>, kind: StatementKind) -> Self {
        Self {
            table,
            kind,
            selection: FieldSelection::All,
            filter: Predicate::And(Vec::new()),
            order_by: Vec::new(),
            pagination: None,
            columns: Vec::new(),
            rows: Vec::new(),
            assignments: Vec::new(),
        }
    }

    pub fn select(table: Arc<TableMetadata>) -> Self {
        Self::new(table, StatementKind::Select)
    }

    pub fn count(table: Arc<TableMetadata>) -> Self {
        Self::new(table, StatementKind::Count)
    }

    /// Multi-row insert; every row holds one value per column, in order
    pub fn insert(table: Arc<TableMetadata>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut stmt = Self::new(table, StatementKind::Insert);
        stmt.columns = columns;
        stmt.rows = rows;
        stmt
    }

    pub fn update(table: Arc<TableMetadata>, assignments: Vec<(String, Value)>) -> Self {
        let mut stmt = Self::new(table, StatementKind::Update);
        stmt.assignments = assignments;
        stmt
    }

    pub fn delete(table: Arc<TableMetadata>) -> Self {
        Self::new(table, StatementKind::Delete)
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table(&self) -> &TableMetadata {
        &self.table
    }

    /// Select list for queries, RETURNING list for mutations
    pub fn fields(mut self, selection: FieldSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.pagination = Some((limit, offset));
        self
    }

    /// AND a predicate into the WHERE clause
    pub fn push_filter(&mut self, predicate: Predicate) {
        let current = std::mem::replace(&mut self.filter, Predicate::And(Vec::new()));
        self.filter = current.and(predicate);
    }

    pub fn has_filter(&self) -> bool {
        !self.filter.is_empty()
    }

    pub fn filter(&self) -> &Predicate {
        &self.filter
    }

    fn is_temporal(&self, column: &str, value: &Value) -> bool {
        value.is_string() && self.table.field_kind(column) == Some(FieldKind::Date)
    }

    fn bind_value(
        &self,
        dialect: &dyn SqlDialect,
        params: &mut SqlParams,
        column: &str,
        value: &Value,
    ) -> String {
        match SqlValue::from_json(value) {
            Some(v) => params.bind(dialect, v, self.is_temporal(column, value)),
            None => "NULL".to_string(),
        }
    }

    /// Render SQL text and its parameters
    pub fn build(&self, dialect: &dyn SqlDialect) -> (String, Vec<SqlValue>) {
        let mut params = SqlParams::new();
        let table = dialect.quote_ident(self.table.name());

        let mut sql = match self.kind {
            StatementKind::Select => {
                format!("SELECT {} FROM {}", self.selection.to_sql(dialect), table)
            }
            StatementKind::Count => format!(
                "SELECT COUNT(*) AS {} FROM {}",
                dialect.quote_ident("count"),
                table
            ),
            StatementKind::Insert if self.columns.is_empty() => {
                format!("INSERT INTO {} DEFAULT VALUES", table)
            }
            StatementKind::Insert => {
                let columns: Vec<String> =
                    self.columns.iter().map(|c| dialect.quote_ident(c)).collect();
                let rows: Vec<String> = self
                    .rows
                    .iter()
                    .map(|row| {
                        let values: Vec<String> = self
                            .columns
                            .iter()
                            .zip(row)
                            .map(|(column, value)| self.bind_value(dialect, &mut params, column, value))
                            .collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    table,
                    columns.join(", "),
                    rows.join(", ")
                )
            }
            StatementKind::Update => {
                let sets: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|(column, value)| {
                        format!(
                            "{} = {}",
                            dialect.quote_ident(column),
                            self.bind_value(dialect, &mut params, column, value)
                        )
                    })
                    .collect();
                format!("UPDATE {} SET {}", table, sets.join(", "))
            }
            StatementKind::Delete => format!("DELETE FROM {}", table),
        };

        if self.kind != StatementKind::Insert
            && let Some(clause) = self.filter.to_sql(dialect, &mut params)
        {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        match self.kind {
            StatementKind::Select => {
                if !self.order_by.is_empty() {
                    let order: Vec<String> = self
                        .order_by
                        .iter()
                        .map(|o| format!("{} {}", dialect.quote_ident(&o.column), o.direction.as_sql()))
                        .collect();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&order.join(", "));
                }
                if let Some((limit, offset)) = self.pagination {
                    sql.push(' ');
                    sql.push_str(&dialect.limit_offset(limit, offset));
                }
            }
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                sql.push_str(" RETURNING ");
                sql.push_str(&self.selection.to_sql(dialect));
            }
            StatementKind::Count => {}
        }

        (sql, params.values)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::filters::{Comparison, Predicate};
    use crate::data::sql::{PostgresDialect, SqliteDialect};
    use crate::data::table::Field;

    fn events() -> Arc<TableMetadata> {
        Arc::new(
            TableMetadata::new(
                "events",
                vec![
                    Field::number("id"),
                    Field::string("name"),
                    Field::date("created_at"),
                    Field::json("payload"),
                ],
                vec!["id".into()],
            )
            .unwrap(),
        )
    }

    fn id_gt(value: i64) -> Predicate {
        Predicate::Compare {
            column: "id".into(),
            op: Comparison::Gt,
            value: SqlValue::Int(value),
            temporal: false,
        }
    }

    #[test]
    fn test_select_with_everything() {
        let mut stmt = Statement::select(events())
            .fields(FieldSelection::fields(["id", "name"]))
            .order_by(vec![OrderBy::desc("created_at"), OrderBy::asc("id")])
            .paginate(10, 20);
        stmt.push_filter(id_gt(3));

        let (sql, params) = stmt.build(&SqliteDialect);
        assert_eq!(
            sql,
            "SELECT `id`, `name` FROM `events` WHERE `id` > ? ORDER BY `created_at` DESC, `id` ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_count_without_filter() {
        let (sql, params) = Statement::count(events()).build(&PostgresDialect);
        assert_eq!(sql, r#"SELECT COUNT(*) AS "count" FROM "events""#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_insert_multi_row_with_typed_dates() {
        let stmt = Statement::insert(
            events(),
            vec!["name".into(), "created_at".into(), "payload".into()],
            vec![
                vec![json!("a"), json!("2024-01-01 00:00:00"), json!({"k": 1})],
                vec![json!("b"), Value::Null, json!([1, 2])],
            ],
        );
        let (sql, params) = stmt.build(&PostgresDialect);
        assert_eq!(
            sql,
            r#"INSERT INTO "events" ("name", "created_at", "payload") VALUES ($1, $2::TIMESTAMPTZ, $3), ($4, NULL, $5) RETURNING *"#
        );
        assert_eq!(params.len(), 5);
        assert_eq!(params[2], SqlValue::Json(json!({"k": 1})));
    }

    #[test]
    fn test_insert_default_values() {
        let stmt = Statement::insert(events(), vec![], vec![vec![]])
            .fields(FieldSelection::fields(["id"]));
        let (sql, _) = stmt.build(&SqliteDialect);
        assert_eq!(sql, "INSERT INTO `events` DEFAULT VALUES RETURNING `id`");
    }

    #[test]
    fn test_update_binds_set_before_where() {
        let mut stmt = Statement::update(events(), vec![("name".into(), json!("x"))]);
        stmt.push_filter(id_gt(4));
        let (sql, params) = stmt.build(&PostgresDialect);
        assert_eq!(
            sql,
            r#"UPDATE "events" SET "name" = $1 WHERE "id" > $2 RETURNING *"#
        );
        assert_eq!(params, vec![SqlValue::Text("x".into()), SqlValue::Int(4)]);
    }

    #[test]
    fn test_delete_returning() {
        let mut stmt = Statement::delete(events());
        assert!(!stmt.has_filter());
        stmt.push_filter(id_gt(1));
        assert!(stmt.has_filter());
        let (sql, _) = stmt.build(&SqliteDialect);
        assert_eq!(sql, "DELETE FROM `events` WHERE `id` > ? RETURNING *");
    }

    #[test]
    fn test_field_selection_serde() {
        let all: FieldSelection = serde_json::from_value(json!("*")).unwrap();
        assert_eq!(all, FieldSelection::All);
        let all: FieldSelection = serde_json::from_value(json!(["id", "*"])).unwrap();
        assert_eq!(all, FieldSelection::All);
        let some: FieldSelection = serde_json::from_value(json!(["id"])).unwrap();
        assert_eq!(some, FieldSelection::fields(["id"]));
        assert_eq!(serde_json::to_value(&some).unwrap(), json!(["id"]));
    }

    #[test]
    fn test_order_by_serde() {
        let order: OrderBy = serde_json::from_value(json!({"column": "id", "order": "DESC"})).unwrap();
        assert_eq!(order, OrderBy::desc("id"));
        let order: OrderBy = serde_json::from_value(json!({"column": "id"})).unwrap();
        assert_eq!(order, OrderBy::asc("id"));
    }

    #[test]
    fn test_quoted_identifiers_cannot_escape() {
        let stmt = Statement::select(events()).fields(FieldSelection::fields([r#"id" FROM x; --"#]));
        let (sql, _) = stmt.build(&PostgresDialect);
        assert_eq!(sql, r#"SELECT "id"" FROM x; --" FROM "events""#);

        let stmt = Statement::select(events()).fields(FieldSelection::fields(["id` FROM x; --"]));
        let (sql, _) = stmt.build(&SqliteDialect);
        assert_eq!(sql, "SELECT `id`` FROM x; --` FROM `events`");
    }
}
