//! Streaming adapter
//!
//! A producer task pulls rows from the database cursor and pushes them into
//! a bounded channel; the consumer pulls from [`RecordStream`]. A full
//! channel suspends the producer, and dropping the stream stops it.

use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::data::Record;
use crate::data::error::RepositoryError;

/// Pull-based stream of rows
///
/// Errors arrive as an item; no rows follow an error.
pub struct RecordStream<M> {
    inner: ReceiverStream<Result<M, RepositoryError>>,
}

impl<M: Send + 'static> RecordStream<M> {
    /// Spawn the producer over a row cursor
    ///
    /// `map` turns each record into the output row. Must be called within
    /// a Tokio runtime; otherwise the stream yields a single error.
    pub(crate) fn spawn<S, F>(rows: S, buffer: usize, mut map: F) -> Self
    where
        S: Stream<Item = Result<Record, RepositoryError>> + Send + 'static,
        F: FnMut(Record) -> Result<M, RepositoryError> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Self::failed(RepositoryError::not_connected(
                "record streams require a Tokio runtime",
            ));
        };

        let (tx, rx) = mpsc::channel(buffer.max(1));
        handle.spawn(async move {
            let mut rows = pin!(rows);
            let mut sent = 0usize;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        tracing::trace!(sent, "Record stream dropped by consumer");
                        break;
                    }
                    next = rows.next() => next,
                };
                let Some(item) = next else {
                    tracing::trace!(sent, "Record stream exhausted");
                    break;
                };

                let item = item.and_then(&mut map);
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
                sent += 1;
            }
        });

        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Stream whose only item is `error`
    pub(crate) fn failed(error: RepositoryError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // capacity 1, receiver alive: cannot fail
        let _ = tx.try_send(Err(error));
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Drain the stream, stopping at the first error
    pub async fn try_collect(self) -> Result<Vec<M>, RepositoryError> {
        TryStreamExt::try_collect(self).await
    }

    /// Push-style consumption on a spawned task
    pub fn subscribe<O>(self, mut observer: O) -> JoinHandle<()>
    where
        O: StreamObserver<M> + 'static,
    {
        tokio::spawn(async move {
            let mut stream = self;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(row) => observer.on_row(row).await,
                    Err(e) => {
                        observer.on_error(e).await;
                        return;
                    }
                }
            }
            observer.on_end().await;
        })
    }
}

impl<M> Stream for RecordStream<M> {
    type Item = Result<M, RepositoryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Receiver for [`RecordStream::subscribe`]
///
/// Gets every row in order, then either one error or the end.
#[async_trait]
pub trait StreamObserver<M>: Send {
    async fn on_row(&mut self, row: M);

    async fn on_error(&mut self, error: RepositoryError);

    async fn on_end(&mut self) {}
}
