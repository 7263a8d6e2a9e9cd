use bulk_indexer_repository::SessionOptions;
use bulk_indexer_shared::DocumentBatch;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{BulkDispatcher, DispatchStrategy};
use crate::aggregator::DispatchSummary;
use crate::errors::DispatchError;

impl BulkDispatcher {
    /// Write the whole batch through one buffered session.
    ///
    /// Documents are queued in batch order with their 1-based ordinal as
    /// identifier and the sink flushes them in bulk requests. Any encoding or
    /// enqueue failure stops the call. A failed flush surfaces from closing
    /// the session as [`DispatchError::Flush`]. An empty batch opens no session.
    ///
    /// # Returns
    ///
    /// * `Ok(DispatchSummary)` - Every document was flushed and the session closed
    /// * `Err(DispatchError)` - The first error
    #[instrument(
        skip(self, cancellation, target, batch),
        fields(index = %target, documents = batch.len())
    )]
    pub async fn dispatch_bulk<T>(
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
            DispatchStrategy::Bulk,
            SessionOptions::buffered(),
        )
        .await
    }
}
