use bulk_indexer_repository::{SessionOptions, SinkSession};
use bulk_indexer_shared::DocumentBatch;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::{encode, write_document, BulkDispatcher, DispatchStrategy};
use crate::aggregator::DispatchSummary;
use crate::errors::DispatchError;

impl BulkDispatcher {
    /// Write the batch one document at a time, in order.
    ///
    /// Each document is written with its 1-based ordinal as identifier. The
    /// first failure stops the call: later documents are never written and
    /// earlier ones are not rolled back, so a failed call may leave the target
    /// partially ingested. An empty batch opens no session.
    ///
    /// # Returns
    ///
    /// * `Ok(DispatchSummary)` - Every document was written and the session closed
    /// * `Err(DispatchError)` - The first error, naming the failing document
    #[instrument(
        skip(self, cancellation, target, batch),
        fields(index = %target, documents = batch.len())
    )]
    pub async fn dispatch_sequential<T>(
        &self,
        cancellation: &CancellationToken,
        target: &str,
        batch: &DocumentBatch<T>,
    ) -> Result<DispatchSummary, DispatchError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.dispatch_in_order(
            cancellation,
            target,
            batch,
            DispatchStrategy::Sequential,
            SessionOptions::immediate(),
        )
        .await
    }

    /// Write the batch in order through a single session opened with `options`.
    ///
    /// Shared by the sequential and bulk strategies; they differ only in how
    /// the session delivers writes.
    pub(super) async fn dispatch_in_order<T>(
        &self,
        cancellation: &CancellationToken,
        target: &str,
        batch: &DocumentBatch<T>,
        strategy: DispatchStrategy,
        options: SessionOptions,
    ) -> Result<DispatchSummary, DispatchError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let mut summary = DispatchSummary {
            strategy: strategy.name(),
            documents: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            info!("Empty batch, nothing to dispatch");
            return Ok(summary);
        }

        info!(strategy = %strategy, "Starting in-order dispatch");
        let session = self.open_session(target, options, cancellation).await?;
        summary.sessions = 1;
        summary.units = 1;

        let written = write_in_order(session.as_ref(), batch, cancellation).await;
        summary.submitted = match &written {
            Ok(count) => *count,
            Err((count, _)) => *count,
        };
        let closed = session.close().await;

        if let Err((_, e)) = written {
            if let Err(close_error) = closed {
                warn!(error = %close_error, "Failed to close session after write failure");
            }
            error!(strategy = %strategy, error = %e, submitted = summary.submitted, "Dispatch failed");
            if let Some(sink) = &self.error_sink {
                sink.record(&e);
            }
            return Err(if cancellation.is_cancelled() {
                DispatchError::Cancelled
            } else {
                e
            });
        }

        summary.sink_stats = closed.map_err(DispatchError::flush)?;
        info!(strategy = %strategy, submitted = summary.submitted, "Dispatch completed");
        Ok(summary)
    }
}

/// Write every document in order. On failure, returns how many were written before it.
async fn write_in_order<T: Serialize>(
    session: &dyn SinkSession,
    batch: &DocumentBatch<T>,
    cancellation: &CancellationToken,
) -> Result<usize, (usize, DispatchError)> {
    for (index, document) in batch.iter().enumerate() {
        let ordinal = index + 1;
        if cancellation.is_cancelled() {
            return Err((index, DispatchError::Cancelled));
        }
        let value = encode(document, ordinal).map_err(|e| (index, e))?;
        write_document(
            session,
            Some(DocumentBatch::<T>::write_id(ordinal)),
            value,
            ordinal,
            cancellation,
        )
        .await
        .map_err(|e| (index, e))?;
    }
    Ok(batch.len())
}
