//! Table repository
//!
//! [`Repository`] executes find, count, insert, update, delete and cursor
//! reads against one table. Filters go through the compiler, statements
//! through the backend dialect, and every driver failure through the error
//! translator. Rows come back as [`Record`]s, or as any `DeserializeOwned`
//! model.

mod options;
mod stream;

pub use options::{
    CountOptions, DeleteOptions, FindOneOptions, FindOptions, FindRequest, InsertOptions,
    NoResultPolicy, RowTransform, StreamOptions, UpdateOptions,
};
pub use stream::{RecordStream, StreamObserver};

use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::constants::DEFAULT_FIND_OFFSET;
use crate::data::Record;
use crate::data::database::{Database, DbTransaction};
use crate::data::error::RepositoryError;
use crate::data::executor;
use crate::data::filters::{FilterExpression, apply_filters};
use crate::data::sql::{Backend, OrderBy, Statement};
use crate::data::table::{FieldKind, TableMetadata};
use crate::data::translate::translate;

/// Repository over a single table
pub struct Repository<M = Record> {
    table: Arc<TableMetadata>,
    db: Database,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            db: self.db.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table.name())
            .field("backend", &self.db.backend())
            .finish()
    }
}

impl<M> Repository<M>
where
    M: DeserializeOwned + Send + 'static,
{
    pub fn new(table: Arc<TableMetadata>, db: Database) -> Self {
        Self {
            table,
            db,
            _model: PhantomData,
        }
    }

    pub fn table(&self) -> &Arc<TableMetadata> {
        &self.table
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Rows matching the filters, paginated
    pub async fn find(&self, options: FindOptions) -> Result<Vec<M>, RepositoryError> {
        let settings = self.db.settings();
        let mut stmt = Statement::select(Arc::clone(&self.table))
            .fields(options.selected_fields)
            .order_by(self.ordering(options.order_by))
            .paginate(
                options.limit.unwrap_or(settings.default_limit),
                options.offset.unwrap_or(DEFAULT_FIND_OFFSET),
            );
        self.filter(&mut stmt, options.filters.as_ref())?;

        let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
        options.throw_if_no_result.check(rows.len(), &sql)?;
        self.decode_all(rows, &sql)
    }

    /// First row matching the filters
    pub async fn find_one(&self, options: FindOneOptions) -> Result<Option<M>, RepositoryError> {
        let mut stmt = Statement::select(Arc::clone(&self.table))
            .fields(options.selected_fields)
            .order_by(self.ordering(options.order_by))
            .paginate(1, DEFAULT_FIND_OFFSET);
        self.filter(&mut stmt, Some(&options.filters))?;

        let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
        options.throw_if_no_result.check(rows.len(), &sql)?;
        rows.into_iter()
            .next()
            .map(|row| self.decode(row, &sql))
            .transpose()
    }

    pub async fn count(&self, options: CountOptions) -> Result<i64, RepositoryError> {
        let mut stmt = Statement::count(Arc::clone(&self.table));
        self.filter(&mut stmt, options.filters.as_ref())?;

        let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .ok_or_else(|| RepositoryError::decode("count row missing", Some(sql), None))
    }

    /// Insert one object or an array of objects
    ///
    /// Consecutive rows with the same set of keys share one statement.
    /// Returns the inserted rows, projected to `selected_fields`.
    pub async fn insert<D>(&self, data: &D, options: InsertOptions) -> Result<Vec<M>, RepositoryError>
    where
        D: Serialize + ?Sized,
    {
        let rows = match to_json(data)? {
            Value::Object(row) => vec![row],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(RepositoryError::InvalidData(format!(
                        "insert expects objects, got {}",
                        json_type(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(RepositoryError::InvalidData(format!(
                    "insert expects an object or an array of objects, got {}",
                    json_type(&other)
                )));
            }
        };

        let max_params = self.db.backend().dialect().max_bind_params();
        let mut inserted = Vec::with_capacity(rows.len());
        for (columns, values) in group_rows(rows, max_params) {
            let stmt = Statement::insert(Arc::clone(&self.table), columns, values)
                .fields(options.selected_fields.clone());
            let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
            inserted.extend(self.decode_all(rows, &sql)?);
        }
        Ok(inserted)
    }

    /// Apply `data` to every row matching the filters
    pub async fn update<D>(&self, data: &D, options: UpdateOptions) -> Result<Vec<M>, RepositoryError>
    where
        D: Serialize + ?Sized,
    {
        let assignments: Vec<(String, Value)> = match to_json(data)? {
            Value::Object(map) if !map.is_empty() => map.into_iter().collect(),
            Value::Object(_) => {
                return Err(RepositoryError::InvalidData(
                    "update data has no columns".to_string(),
                ));
            }
            other => {
                return Err(RepositoryError::InvalidData(format!(
                    "update expects an object, got {}",
                    json_type(&other)
                )));
            }
        };

        let mut stmt =
            Statement::update(Arc::clone(&self.table), assignments).fields(options.selected_fields);
        self.scoped_filter(&mut stmt, &options.filters, "update")?;

        let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
        options.throw_if_no_result.check(rows.len(), &sql)?;
        self.decode_all(rows, &sql)
    }

    /// Delete every row matching the filters, returning them
    pub async fn delete(&self, options: DeleteOptions) -> Result<Vec<M>, RepositoryError> {
        let mut stmt =
            Statement::delete(Arc::clone(&self.table)).fields(options.selected_fields);
        self.scoped_filter(&mut stmt, &options.filters, "delete")?;

        let (rows, sql) = self.run(&stmt, options.transaction.as_ref()).await?;
        options.throw_if_no_result.check(rows.len(), &sql)?;
        self.decode_all(rows, &sql)
    }

    /// Cursor read with backpressure
    ///
    /// Same filters and ordering as [`find`](Self::find), without pagination.
    /// Nothing runs until the stream is first polled. A transaction stays
    /// locked for as long as the stream is alive.
    pub fn find_stream(&self, options: StreamOptions) -> RecordStream<M> {
        let mut stmt = Statement::select(Arc::clone(&self.table))
            .fields(options.selected_fields)
            .order_by(self.ordering(options.order_by));
        if let Err(e) = self.filter(&mut stmt, options.filters.as_ref()) {
            return RecordStream::failed(e);
        }

        let backend = self.db.backend();
        let (sql, params) = stmt.build(backend.dialect());
        tracing::debug!(table = %self.table.name(), sql = %sql, "Streaming statement");

        let query = sql.clone();
        let rows = executor::stream_rows(self.db.clone(), options.transaction, sql, params)
            .map(move |row| row.map_err(|f| translate(f, &query, backend)));

        let table = Arc::clone(&self.table);
        let transform = options.transform;
        RecordStream::spawn(rows, self.db.settings().stream_buffer, move |record| {
            let record = normalize(&table, backend, record);
            let record = match &transform {
                Some(transform) => transform(record),
                None => record,
            };
            from_record(record, None)
        })
    }

    fn ordering(&self, order_by: Option<Vec<OrderBy>>) -> Vec<OrderBy> {
        match order_by {
            Some(order) if !order.is_empty() => order,
            _ => vec![OrderBy::asc(self.table.identity_column())],
        }
    }

    fn filter(
        &self,
        stmt: &mut Statement,
        filters: Option<&FilterExpression>,
    ) -> Result<(), RepositoryError> {
        if let Some(filters) = filters {
            apply_filters(stmt, filters)?;
        }
        Ok(())
    }

    /// Mutations must be narrowed by at least one condition
    fn scoped_filter(
        &self,
        stmt: &mut Statement,
        filters: &FilterExpression,
        operation: &'static str,
    ) -> Result<(), RepositoryError> {
        apply_filters(stmt, filters)?;
        if !stmt.has_filter() {
            tracing::warn!(table = %self.table.name(), operation, "Rejected unscoped mutation");
            return Err(RepositoryError::UnscopedMutation {
                operation,
                table: self.table.name().to_string(),
            });
        }
        Ok(())
    }

    async fn run(
        &self,
        stmt: &Statement,
        tx: Option<&DbTransaction>,
    ) -> Result<(Vec<Record>, String), RepositoryError> {
        let backend = self.db.backend();
        let (sql, params) = stmt.build(backend.dialect());
        tracing::debug!(
            table = %self.table.name(),
            sql = %sql,
            params = params.len(),
            "Executing statement"
        );

        let rows = executor::fetch_all(&self.db, tx, &sql, params)
            .await
            .map_err(|f| translate(f, &sql, backend))?;
        tracing::trace!(table = %self.table.name(), rows = rows.len(), "Statement completed");
        Ok((rows, sql))
    }

    fn decode(&self, row: Record, sql: &str) -> Result<M, RepositoryError> {
        let row = normalize(&self.table, self.db.backend(), row);
        from_record(row, Some(sql))
    }

    fn decode_all(&self, rows: Vec<Record>, sql: &str) -> Result<Vec<M>, RepositoryError> {
        rows.into_iter().map(|row| self.decode(row, sql)).collect()
    }
}

fn to_json<D: Serialize + ?Sized>(data: &D) -> Result<Value, RepositoryError> {
    serde_json::to_value(data).map_err(|e| RepositoryError::InvalidData(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn from_record<M: DeserializeOwned>(row: Record, sql: Option<&str>) -> Result<M, RepositoryError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| {
        RepositoryError::decode(
            format!("row does not match the model: {}", e),
            sql.map(str::to_string),
            Some(Box::new(e)),
        )
    })
}

/// Restore declared kinds SQLite has no storage class for
///
/// Booleans come back as 0/1 and JSON as text.
fn normalize(table: &TableMetadata, backend: Backend, mut row: Record) -> Record {
    if backend != Backend::Sqlite {
        return row;
    }
    for (column, value) in row.iter_mut() {
        match (table.field_kind(column), &*value) {
            (Some(FieldKind::Boolean), Value::Number(n)) => {
                if let Some(n) = n.as_i64() {
                    *value = Value::Bool(n != 0);
                }
            }
            (Some(FieldKind::Json), Value::String(text)) => {
                if let Ok(parsed) = serde_json::from_str(text) {
                    *value = parsed;
                }
            }
            _ => {}
        }
    }
    row
}

/// Split rows into runs sharing the same key set
///
/// Values are laid out in the column order of the run's first row. A run
/// is cut once another row would push it past `max_params` bound values.
fn group_rows(rows: Vec<Record>, max_params: usize) -> Vec<(Vec<String>, Vec<Vec<Value>>)> {
    let mut groups: Vec<(Vec<String>, Vec<Vec<Value>>)> = Vec::new();
    for mut row in rows {
        // DEFAULT VALUES inserts a single row, so empty rows never share a run
        let same_keys = !row.is_empty()
            && groups.last().is_some_and(|(columns, values)| {
                columns.len() == row.len()
                    && columns.iter().all(|c| row.contains_key(c))
                    && (values.len() + 1) * columns.len() <= max_params
            });
        if same_keys && let Some((columns, values)) = groups.last_mut() {
            let ordered = columns
                .iter()
                .map(|c| row.remove(c).unwrap_or(Value::Null))
                .collect();
            values.push(ordered);
            continue;
        }
        let columns: Vec<String> = row.keys().cloned().collect();
        let values: Vec<Value> = row.into_iter().map(|(_, v)| v).collect();
        groups.push((columns, vec![values]));
    }
    groups
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::core::config::DatabaseConfig;
    use crate::data::error::ErrorKind;
    use crate::data::filters::{FilterClause, Operand, Operator, Scalar};
    use crate::data::sql::FieldSelection;
    use crate::data::table::Field;

    const REPS_DDL: &str = "CREATE TABLE reps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        status TEXT,
        score REAL,
        created_at TEXT,
        active INTEGER,
        meta TEXT
    )";

    fn reps_table() -> Arc<TableMetadata> {
        Arc::new(
            TableMetadata::new(
                "reps",
                vec![
                    Field::number("id"),
                    Field::string("name"),
                    Field::string("status"),
                    Field::number("score"),
                    Field::date("created_at"),
                    Field::boolean("active"),
                    Field::json("meta"),
                ],
                vec!["id".to_string()],
            )
            .unwrap(),
        )
    }

    fn seed_rows(n: i64) -> Vec<Value> {
        (0..n)
            .map(|i| {
                let status = match i % 4 {
                    0 => Value::Null,
                    2 => json!("closed"),
                    _ => json!("open"),
                };
                json!({
                    "id": i,
                    "name": format!("Rep::{}", i),
                    "status": status,
                    "score": i as f64 * 1.5,
                    "created_at": format!("2024-01-{:02} 10:00:00", i + 1),
                    "active": i % 2 == 0,
                    "meta": {"rank": i},
                })
            })
            .collect()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn empty_repo() -> Repository {
        init_tracing();
        let db = Database::connect(&DatabaseConfig::sqlite_memory())
            .await
            .unwrap();
        executor::fetch_all(&db, None, REPS_DDL, vec![])
            .await
            .unwrap();
        Repository::new(reps_table(), db)
    }

    async fn seeded_repo(n: i64) -> Repository {
        let repo = empty_repo().await;
        let inserted = repo
            .insert(&seed_rows(n), InsertOptions::default())
            .await
            .unwrap();
        assert_eq!(inserted.len() as i64, n);
        repo
    }

    fn filters(raw: Value) -> FilterExpression {
        FilterExpression::from_json(&raw).unwrap()
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    async fn find_ids(repo: &Repository, raw: Value) -> Vec<i64> {
        let rows = repo
            .find(FindOptions::new().filters(filters(raw)))
            .await
            .unwrap();
        ids(&rows)
    }

    #[tokio::test]
    async fn test_no_op_filters_match_everything() {
        let repo = seeded_repo(20).await;
        let all = ids(&repo.find(FindOptions::new()).await.unwrap());

        assert_eq!(find_ids(&repo, json!({})).await, all);
        assert_eq!(find_ids(&repo, json!({"name": {}})).await, all);
        assert_eq!(
            find_ids(&repo, json!({"name": {"$like": null, "$bogus": 1}})).await,
            all
        );
        assert_eq!(find_ids(&repo, json!([{}, {"id": {}}])).await, all);
    }

    #[tokio::test]
    async fn test_any_of_is_union() {
        let repo = seeded_repo(20).await;
        let found = find_ids(&repo, json!([{"id": {"$eq": 2}}, {"id": {"$eq": 5}}])).await;
        assert_eq!(found, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_clause_entries_are_anded() {
        let repo = seeded_repo(20).await;
        let found = find_ids(&repo, json!({"status": "open", "id": {"$lt": 8}})).await;
        assert_eq!(found, vec![1, 3, 5, 7]);
    }

    #[tokio::test]
    async fn test_between_is_inclusive() {
        let repo = seeded_repo(20).await;
        assert_eq!(
            find_ids(&repo, json!({"id": {"$between": [2, 5]}})).await,
            vec![2, 3, 4, 5]
        );

        let outside = find_ids(&repo, json!({"id": {"$nbetween": [3, 5]}})).await;
        assert_eq!(outside.len(), 17);
        assert!(outside.iter().all(|id| !(3..=5).contains(id)));
    }

    #[tokio::test]
    async fn test_null_literal_matches_null_rows() {
        let repo = seeded_repo(20).await;
        let found = find_ids(&repo, json!({"status": null})).await;
        assert_eq!(found, vec![0, 4, 8, 12, 16]);

        let not_null = find_ids(&repo, json!({"status": {"$isNull": false}})).await;
        assert_eq!(not_null.len(), 15);
    }

    #[tokio::test]
    async fn test_search_fans_out_over_fields() {
        let repo = seeded_repo(20).await;
        repo.update(
            &json!({"status": "Rep::fake"}),
            UpdateOptions::new(filters(json!({"id": 3}))),
        )
        .await
        .unwrap();

        // name "Rep::1x" on 1 and 10..19, status on 3
        let everywhere = find_ids(&repo, json!({"$q": "Rep::1"})).await;
        assert_eq!(
            everywhere,
            vec![1, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19]
        );

        let fake = find_ids(&repo, json!({"$q": "fake"})).await;
        assert_eq!(fake, vec![3]);

        let name_only = find_ids(
            &repo,
            json!({"$q": {"selectedFields": ["name"], "value": "fake"}}),
        )
        .await;
        assert!(name_only.is_empty());

        let by_number = find_ids(
            &repo,
            json!({"$q": {"selectedFields": ["id"], "value": 7}}),
        )
        .await;
        assert_eq!(by_number, vec![7]);
    }

    #[tokio::test]
    async fn test_falsy_search_adds_nothing() {
        let repo = seeded_repo(5).await;
        assert_eq!(find_ids(&repo, json!({"$q": ""})).await.len(), 5);
        assert_eq!(find_ids(&repo, json!({"$q": 0})).await.len(), 5);
    }

    #[tokio::test]
    async fn test_like_on_date_column() {
        let repo = seeded_repo(20).await;
        let found = find_ids(&repo, json!({"created_at": {"$like": "2024-01-05"}})).await;
        assert_eq!(found, vec![4]);
    }

    #[tokio::test]
    async fn test_like_matches_metacharacters_literally() {
        let repo = empty_repo().await;
        let rows = json!([
            {"id": 1, "name": "100% cotton"},
            {"id": 2, "name": "1000 cotton"},
            {"id": 3, "name": "snake_case"},
            {"id": 4, "name": "snakeXcase"},
            {"id": 5, "name": "C:\\tmp"},
        ]);
        repo.insert(&rows, InsertOptions::default()).await.unwrap();

        assert_eq!(find_ids(&repo, json!({"name": {"$like": "100%"}})).await, vec![1]);
        assert_eq!(find_ids(&repo, json!({"name": {"$like": "e_c"}})).await, vec![3]);
        assert_eq!(find_ids(&repo, json!({"name": {"$like": ":\\"}})).await, vec![5]);
        assert_eq!(
            find_ids(&repo, json!({"name": {"$nlike": "100%"}})).await,
            vec![2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_date_comparison() {
        let repo = seeded_repo(20).await;
        let found = find_ids(
            &repo,
            json!({"created_at": {"$gte": "2024-01-18 00:00:00"}}),
        )
        .await;
        assert_eq!(found, vec![17, 18, 19]);
    }

    #[tokio::test]
    async fn test_pagination_defaults() {
        let repo = seeded_repo(120).await;
        let rows = repo.find(FindOptions::new()).await.unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(ids(&rows), (0..100).collect::<Vec<_>>());

        let page = repo
            .find(FindOptions::new().limit(5).offset(110))
            .await
            .unwrap();
        assert_eq!(ids(&page), (110..115).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_explicit_order() {
        let repo = seeded_repo(10).await;
        let rows = repo
            .find(FindOptions::new().order_by(vec![OrderBy::desc("id")]).limit(3))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn test_throw_if_no_result() {
        let repo = seeded_repo(20).await;

        let err = repo
            .find(
                FindOptions::new()
                    .filters(filters(json!({"id": -1})))
                    .throw_if_no_result(true),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResult);
        assert_eq!(err.to_string(), RepositoryError::DEFAULT_NO_RESULT_MESSAGE);
        assert!(err.query_text().unwrap().contains("reps"));

        let rows = repo
            .find(FindOptions::new().filters(filters(json!({"id": -1}))))
            .await
            .unwrap();
        assert!(rows.is_empty());

        let err = repo
            .find_one(FindOneOptions::new(filters(json!({"id": -1}))).throw_if_no_result("no rep"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no rep");
    }

    #[tokio::test]
    async fn test_gte_scenario() {
        let repo = seeded_repo(20).await;
        let found = find_ids(&repo, json!({"id": {"$gte": 5}})).await;
        assert_eq!(found.len(), 15);
        assert!(found.iter().all(|id| *id >= 5));
    }

    #[tokio::test]
    async fn test_count_like_scenario() {
        let repo = seeded_repo(20).await;
        let count = repo
            .count(CountOptions::filters(filters(json!({"name": {"$like": "Rep"}}))))
            .await
            .unwrap();
        assert_eq!(count, 20);
        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_insert_generates_keys() {
        let repo = empty_repo().await;
        let rows = repo
            .insert(
                &json!([{"name": "a"}, {"name": "b"}]),
                InsertOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["id"].as_i64().is_some()));
        assert_ne!(rows[0]["id"], rows[1]["id"]);
    }

    #[tokio::test]
    async fn test_insert_mixed_shapes_and_projection() {
        let repo = empty_repo().await;
        let options = InsertOptions {
            selected_fields: FieldSelection::fields(["name", "status"]),
            ..InsertOptions::default()
        };
        let rows = repo
            .insert(
                &json!([{"name": "a"}, {"status": "x", "name": "b"}, {"name": "c", "status": "y"}]),
                options,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["status"], json!("y"));
        assert!(rows.iter().all(|r| !r.contains_key("id")));

        let err = repo
            .insert(&json!(["a"]), InsertOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let none = repo
            .insert(&Vec::<Record>::new(), InsertOptions::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_scenario() {
        let repo = seeded_repo(20).await;
        let before = repo
            .find_one(FindOneOptions::new(filters(json!({"id": 4}))))
            .await
            .unwrap()
            .unwrap();

        let rows = repo
            .update(&json!({"status": "x"}), UpdateOptions::new(filters(json!({"id": 4}))))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], json!("x"));
        for (column, value) in &before {
            if column != "status" {
                assert_eq!(&rows[0][column], value, "column {} changed", column);
            }
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_require_scope() {
        let repo = seeded_repo(3).await;

        let err = repo
            .update(&json!({"status": "x"}), UpdateOptions::new(FilterClause::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnscopedMutation);

        let err = repo
            .delete(DeleteOptions::new(filters(json!({"name": {}}))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnscopedMutation);

        // null items are dropped, leaving nothing to exclude
        let err = repo
            .delete(DeleteOptions::new(filters(json!({"id": {"$nin": [null]}}))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnscopedMutation);

        let err = repo
            .update(
                &json!({"status": "x"}),
                UpdateOptions::new(FilterClause::new().op("id", Operator::Nin, Operand::List(vec![]))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnscopedMutation);

        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), 3);
        let untouched = repo
            .count(CountOptions::filters(filters(json!({"status": "x"}))))
            .await
            .unwrap();
        assert_eq!(untouched, 0);
    }

    #[tokio::test]
    async fn test_in_with_only_nulls_matches_nothing() {
        let repo = seeded_repo(5).await;
        assert!(find_ids(&repo, json!({"id": {"$in": [null]}})).await.is_empty());
        assert_eq!(find_ids(&repo, json!({"id": {"$nin": [null]}})).await.len(), 5);
    }

    #[tokio::test]
    async fn test_delete_returns_rows() {
        let repo = seeded_repo(5).await;
        let deleted = repo
            .delete(DeleteOptions::new(
                FilterClause::new().op("id", Operator::In, Operand::List(vec![Scalar::Int(1), Scalar::Int(3)])),
            ))
            .await
            .unwrap();
        assert_eq!(ids(&deleted), vec![1, 3]);
        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), 3);

        let err = repo
            .delete(DeleteOptions::new(FilterClause::new().eq("id", 1i64)).throw_if_no_result(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResult);
    }

    #[tokio::test]
    async fn test_sqlite_rows_are_normalized() {
        let repo = seeded_repo(2).await;
        let row = repo
            .find_one(FindOneOptions::new(FilterClause::new().eq("id", 1i64)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["active"], json!(false));
        assert_eq!(row["meta"], json!({"rank": 1}));
        assert_eq!(row["score"], json!(1.5));
    }

    #[derive(Debug, Deserialize)]
    struct Rep {
        id: i64,
        name: String,
        status: Option<String>,
        active: bool,
    }

    #[tokio::test]
    async fn test_typed_models() {
        let repo = seeded_repo(4).await;
        let typed: Repository<Rep> = Repository::new(Arc::clone(repo.table()), repo.database().clone());

        let reps = typed.find(FindOptions::new()).await.unwrap();
        assert_eq!(reps.len(), 4);
        assert_eq!(reps[2].name, "Rep::2");
        assert_eq!(reps[2].status.as_deref(), Some("closed"));
        assert!(reps[2].active);
        assert!(reps[0].status.is_none());
        assert_eq!(reps[3].id, 3);

        let err = typed
            .find(FindOptions::new().select(FieldSelection::fields(["id"])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_invalid_operand_is_filter_error() {
        let repo = seeded_repo(2).await;
        let err = repo
            .find(FindOptions::new().filters(FilterClause::new().op(
                "id",
                Operator::Between,
                Operand::Scalar(Scalar::Int(1)),
            )))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filter);
    }

    #[tokio::test]
    async fn test_unknown_column_is_translated() {
        let repo = seeded_repo(2).await;
        let err = repo
            .find(FindOptions::new().filters(filters(json!({"nope": 1}))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert!(err.query_text().unwrap().contains("`nope`"));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let repo = empty_repo().await;
        let tx = repo.database().begin().await.unwrap();

        repo.insert(
            &json!({"name": "tx"}),
            InsertOptions {
                transaction: Some(tx.clone()),
                ..InsertOptions::default()
            },
        )
        .await
        .unwrap();
        let inside = repo
            .count(CountOptions {
                transaction: Some(tx.clone()),
                ..CountOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(inside, 1);

        tx.rollback().await.unwrap();
        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), 0);

        let err = repo
            .find(FindOptions::new().transaction(&tx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_find_stream_with_transform() {
        let repo = seeded_repo(30).await;
        let rows = repo
            .find_stream(
                StreamOptions::new()
                    .filters(filters(json!({"id": {"$gte": 10}})))
                    .transform(|mut row| {
                        row.insert("seen".to_string(), json!(true));
                        row
                    }),
            )
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&rows), (10..30).collect::<Vec<_>>());
        assert!(rows.iter().all(|r| r["seen"] == json!(true)));
        assert_eq!(rows[0]["meta"], json!({"rank": 10}));
    }

    #[tokio::test]
    async fn test_find_stream_reports_errors() {
        let repo = seeded_repo(2).await;
        let mut stream = repo.find_stream(StreamOptions::new().filters(filters(json!({"nope": 1}))));
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert!(stream.next().await.is_none());

        let mut stream = repo.find_stream(StreamOptions::new().filters(FilterClause::new().op(
            "id",
            Operator::In,
            Operand::Scalar(Scalar::Int(1)),
        )));
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filter);
    }

    #[tokio::test]
    async fn test_find_stream_early_drop_releases_connection() {
        let repo = seeded_repo(200).await;
        let mut stream = repo.find_stream(StreamOptions::new());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["id"], json!(0));
        drop(stream);

        // single-connection pool: this only succeeds once the cursor is gone
        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), 200);
    }

    #[test]
    fn test_group_rows_keeps_runs() {
        let rows: Vec<Record> = [
            json!({"a": 1, "b": 2}),
            json!({"b": 3, "a": 4}),
            json!({"a": 5}),
            json!({}),
            json!({}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        })
        .collect();

        let groups = group_rows(rows, usize::MAX);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].0, vec!["a", "b"]);
        assert_eq!(groups[0].1, vec![vec![json!(1), json!(2)], vec![json!(4), json!(3)]]);
        assert_eq!(groups[1].0, vec!["a"]);
        assert!(groups[2].0.is_empty());
        assert_eq!(groups[3].1, vec![Vec::<Value>::new()]);
    }

    #[test]
    fn test_group_rows_respects_param_cap() {
        let rows: Vec<Record> = (0..5)
            .map(|i| match json!({"a": i, "b": i}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            })
            .collect();

        // two columns, at most five values: two rows per statement
        let sizes: Vec<usize> = group_rows(rows, 5).iter().map(|(_, v)| v.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_insert_past_bind_param_cap() {
        let repo = empty_repo().await;
        let cap = Backend::Sqlite.dialect().max_bind_params();
        let n = (cap / 2 + 10) as i64;
        let rows: Vec<Value> = (0..n)
            .map(|i| json!({"id": i, "name": format!("Rep::{}", i)}))
            .collect();

        let inserted = repo
            .insert(
                &Value::Array(rows),
                InsertOptions {
                    selected_fields: FieldSelection::fields(["id"]),
                    ..InsertOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(inserted.len() as i64, n);
        assert_eq!(repo.count(CountOptions::default()).await.unwrap(), n);
    }
}
