//! Statement execution
//!
//! Runs rendered SQL on the pool or inside a caller's transaction and
//! decodes rows into records. Failures are returned untranslated; the
//! repository translates them with the query text.

use futures::StreamExt;
use futures::stream::BoxStream;

use crate::data::Record;
use crate::data::database::{Database, DbTransaction, Pool, TxConn};
use crate::data::error::RepositoryError;
use crate::data::sql::SqlValue;
use crate::data::translate::QueryFailure;
use crate::data::{postgres, sqlite};

fn finished() -> QueryFailure {
    RepositoryError::not_connected("transaction already finished").into()
}

fn check_backend(db: &Database, tx: &DbTransaction) -> Result<(), QueryFailure> {
    if db.backend() != tx.backend() {
        return Err(RepositoryError::InvalidData(format!(
            "{} transaction used with a {} database",
            tx.backend(),
            db.backend()
        ))
        .into());
    }
    Ok(())
}

/// Execute and collect every row
pub(crate) async fn fetch_all(
    db: &Database,
    tx: Option<&DbTransaction>,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<Record>, QueryFailure> {
    let Some(tx) = tx else {
        let records = match db.pool() {
            Pool::Sqlite(pool) => sqlite::fetch_records(pool, sql, params).await?,
            Pool::Postgres(pool) => postgres::fetch_records(pool, sql, params).await?,
        };
        return Ok(records);
    };

    check_backend(db, tx)?;
    let mut guard = tx.lock().await;
    let records = match guard.as_mut() {
        Some(TxConn::Sqlite(conn)) => sqlite::fetch_records(&mut **conn, sql, params).await?,
        Some(TxConn::Postgres(conn)) => postgres::fetch_records(&mut **conn, sql, params).await?,
        None => return Err(finished()),
    };
    Ok(records)
}

/// Execute as a cursor
///
/// Nothing runs until the stream is first polled. The transaction, if any,
/// stays locked until the stream is dropped.
pub(crate) fn stream_rows(
    db: Database,
    tx: Option<DbTransaction>,
    sql: String,
    params: Vec<SqlValue>,
) -> BoxStream<'static, Result<Record, QueryFailure>> {
    Box::pin(async_stream::stream! {
        match tx {
            Some(tx) => {
                if let Err(e) = check_backend(&db, &tx) {
                    yield Err(e);
                    return;
                }
                let mut guard = tx.lock_owned().await;
                match guard.as_mut() {
                    Some(TxConn::Sqlite(conn)) => {
                        let mut rows = sqlite::stream_records(&mut **conn, &sql, params);
                        while let Some(row) = rows.next().await {
                            yield row.map_err(QueryFailure::from);
                        }
                    }
                    Some(TxConn::Postgres(conn)) => {
                        let mut rows = postgres::stream_records(&mut **conn, &sql, params);
                        while let Some(row) = rows.next().await {
                            yield row.map_err(QueryFailure::from);
                        }
                    }
                    None => {
                        yield Err(finished());
                    }
                }
            }
            None => match db.pool() {
                Pool::Sqlite(pool) => {
                    let mut rows = sqlite::stream_records(pool, &sql, params);
                    while let Some(row) = rows.next().await {
                        yield row.map_err(QueryFailure::from);
                    }
                }
                Pool::Postgres(pool) => {
                    let mut rows = postgres::stream_records(pool, &sql, params);
                    while let Some(row) = rows.next().await {
                        yield row.map_err(QueryFailure::from);
                    }
                }
            },
        }
    })
}
