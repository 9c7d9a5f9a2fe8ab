//! Database handle
//!
//! One pool for the configured backend plus the query settings shared by
//! every repository built on it. Transactions are opened here and owned by
//! the caller; repositories only run statements inside them.

use std::fmt;
use std::sync::Arc;

use sqlx::{PgPool, Postgres, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::core::config::{DatabaseConfig, QuerySettings};
use crate::data::error::RepositoryError;
use crate::data::sql::Backend;
use crate::data::translate::translate;
use crate::data::{postgres, sqlite};

#[derive(Debug, Clone)]
pub(crate) enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// Connected database
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool,
    settings: QuerySettings,
}

impl Database {
    /// Connect a pool for the configured backend
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let connect_error = |e: sqlx::Error| RepositoryError::Connection {
            message: format!("failed to connect to {}: {}", config.backend, e),
            query: None,
            source: Some(Box::new(e)),
        };

        let pool = match config.backend {
            Backend::Sqlite => Pool::Sqlite(sqlite::connect(config).await.map_err(connect_error)?),
            Backend::Postgres => {
                Pool::Postgres(postgres::connect(config).await.map_err(connect_error)?)
            }
        };

        Ok(Self {
            pool,
            settings: config.query,
        })
    }

    /// Wrap an existing SQLite pool
    pub fn from_sqlite_pool(pool: SqlitePool, settings: QuerySettings) -> Self {
        Self {
            pool: Pool::Sqlite(pool),
            settings,
        }
    }

    /// Wrap an existing PostgreSQL pool
    pub fn from_postgres_pool(pool: PgPool, settings: QuerySettings) -> Self {
        Self {
            pool: Pool::Postgres(pool),
            settings,
        }
    }

    pub fn backend(&self) -> Backend {
        match self.pool {
            Pool::Sqlite(_) => Backend::Sqlite,
            Pool::Postgres(_) => Backend::Postgres,
        }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        match &self.pool {
            Pool::Sqlite(pool) => pool.is_closed(),
            Pool::Postgres(pool) => pool.is_closed(),
        }
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        match &self.pool {
            Pool::Sqlite(pool) => pool.close().await,
            Pool::Postgres(pool) => pool.close().await,
        }
        tracing::debug!(backend = %self.backend(), "Database pool closed");
    }

    /// Begin a transaction owned by the caller
    pub async fn begin(&self) -> Result<DbTransaction, RepositoryError> {
        let backend = self.backend();
        let conn = match &self.pool {
            Pool::Sqlite(pool) => pool.begin().await.map(TxConn::Sqlite),
            Pool::Postgres(pool) => pool.begin().await.map(TxConn::Postgres),
        }
        .map_err(|e| translate(e.into(), "BEGIN", backend))?;

        tracing::trace!(%backend, "Transaction started");
        Ok(DbTransaction {
            inner: Arc::new(Mutex::new(Some(conn))),
            backend,
        })
    }
}

pub(crate) enum TxConn {
    Sqlite(Transaction<'static, Sqlite>),
    Postgres(Transaction<'static, Postgres>),
}

/// Caller-owned transaction handle
///
/// Clones share the same connection. Repository calls lock it for their
/// duration (streams for their whole life). Dropping the last clone
/// without committing rolls back.
#[derive(Clone)]
pub struct DbTransaction {
    inner: Arc<Mutex<Option<TxConn>>>,
    backend: Backend,
}

impl DbTransaction {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub async fn is_finished(&self) -> bool {
        self.inner.lock().await.is_none()
    }

    pub async fn commit(&self) -> Result<(), RepositoryError> {
        let result = match self.take().await? {
            TxConn::Sqlite(tx) => tx.commit().await,
            TxConn::Postgres(tx) => tx.commit().await,
        };
        result.map_err(|e| translate(e.into(), "COMMIT", self.backend))?;
        tracing::trace!(backend = %self.backend, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), RepositoryError> {
        let result = match self.take().await? {
            TxConn::Sqlite(tx) => tx.rollback().await,
            TxConn::Postgres(tx) => tx.rollback().await,
        };
        result.map_err(|e| translate(e.into(), "ROLLBACK", self.backend))?;
        tracing::trace!(backend = %self.backend, "Transaction rolled back");
        Ok(())
    }

    async fn take(&self) -> Result<TxConn, RepositoryError> {
        self.inner
            .lock()
            .await
            .take()
            .ok_or_else(|| RepositoryError::not_connected("transaction already finished"))
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<TxConn>> {
        self.inner.lock().await
    }

    pub(crate) async fn lock_owned(&self) -> OwnedMutexGuard<Option<TxConn>> {
        Arc::clone(&self.inner).lock_owned().await
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
