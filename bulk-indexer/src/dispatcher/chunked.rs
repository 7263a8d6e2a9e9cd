use std::sync::Arc;

use bulk_indexer_repository::{BulkWriteSink, SessionOptions, SessionStats, SinkSession};
use bulk_indexer_shared::{Chunk, DocumentBatch};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{encode, require_positive, write_document, BulkDispatcher, DispatchStrategy};
use crate::aggregator::{DispatchSummary, FirstErrorCell};
use crate::errors::DispatchError;
use crate::partitioner::{chunk_count, partition};

/// Everything one chunk unit needs, owned so the unit can be spawned.
struct ChunkUnit<T> {
    sink: Arc<dyn BulkWriteSink>,
    target: Arc<str>,
    batch: DocumentBatch<T>,
    chunk: Chunk,
    permits: Arc<Semaphore>,
    cancellation: CancellationToken,
}

/// What one chunk unit did before it finished.
struct ChunkReport {
    chunk: Chunk,
    opened_session: bool,
    submitted: usize,
    stats: SessionStats,
    result: Result<(), DispatchError>,
}

impl BulkDispatcher {
    /// Write the batch as independent chunks of `chunk_size` documents.
    ///
    /// Every chunk becomes one unit of work with its own buffered session,
    /// written in order and then closed. At most `max_concurrency` units hold
    /// a session at any time. Documents get no explicit identifier; the sink
    /// assigns one. All units run to completion even when some fail, and the
    /// first failure observed is returned wrapped with its chunk. Write order
    /// across chunks is not preserved.
    ///
    /// # Returns
    ///
    /// * `Ok(DispatchSummary)` - Every chunk was written and its session closed
    /// * `Err(DispatchError::InvalidParameter)` - `chunk_size` or `max_concurrency` is 0
    /// * `Err(DispatchError::Aggregate)` - The first unit failure observed
    /// * `Err(DispatchError::Cancelled)` - The call was cancelled
    #[instrument(
        skip(self, cancellation, target, batch),
        fields(index = %target, documents = batch.len())
    )]
    pub async fn dispatch_chunked<T>(
        &self,
        cancellation: &CancellationToken,
        target: &str,
        batch: &DocumentBatch<T>,
        chunk_size: usize,
        max_concurrency: usize,
    ) -> Result<DispatchSummary, DispatchError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        require_positive("max concurrency", max_concurrency)?;
        let chunks = partition(batch.len(), chunk_size)?;

        let mut summary = DispatchSummary {
            strategy: DispatchStrategy::Chunked {
                chunk_size,
                max_concurrency,
            }
            .name(),
            documents: batch.len(),
            units: chunk_count(batch.len(), chunk_size),
            ..Default::default()
        };
        if batch.is_empty() {
            info!("Empty batch, nothing to dispatch");
            return Ok(summary);
        }

        info!(units = summary.units, "Starting chunked dispatch");
        let permits = Arc::new(Semaphore::new(max_concurrency.min(Semaphore::MAX_PERMITS)));
        let target: Arc<str> = Arc::from(target);
        let mut units = JoinSet::new();
        for chunk in chunks {
            units.spawn(run_chunk(ChunkUnit {
                sink: Arc::clone(&self.sink),
                target: Arc::clone(&target),
                batch: batch.clone(),
                chunk,
                permits: Arc::clone(&permits),
                cancellation: cancellation.clone(),
            }));
        }

        let errors = FirstErrorCell::new(self.error_sink.clone());
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(report) => {
                    summary.sessions += usize::from(report.opened_session);
                    summary.submitted += report.submitted;
                    summary.sink_stats += report.stats;
                    if let Err(e) = report.result {
                        errors.record(DispatchError::aggregate(describe(&report.chunk), e));
                    }
                }
                Err(join_error) => {
                    errors.record(DispatchError::aggregate(
                        "chunk unit",
                        DispatchError::task_failed(join_error.to_string()),
                    ));
                }
            }
        }

        if cancellation.is_cancelled() {
            warn!(submitted = summary.submitted, "Chunked dispatch cancelled");
            return Err(DispatchError::Cancelled);
        }
        if let Some(e) = errors.first() {
            error!(
                error = %e,
                discarded_errors = errors.suppressed(),
                "Chunked dispatch failed"
            );
            return Err(e);
        }

        info!(
            submitted = summary.submitted,
            sessions = summary.sessions,
            "Chunked dispatch completed"
        );
        Ok(summary)
    }
}

fn describe(chunk: &Chunk) -> String {
    format!(
        "chunk {} (documents {}..={})",
        chunk.index,
        chunk.first_ordinal(),
        chunk.last_ordinal()
    )
}

async fn run_chunk<T>(unit: ChunkUnit<T>) -> ChunkReport
where
    T: Serialize + Send + Sync + 'static,
{
    let mut report = ChunkReport {
        chunk: unit.chunk.clone(),
        opened_session: false,
        submitted: 0,
        stats: SessionStats::default(),
        result: Ok(()),
    };

    let _permit = tokio::select! {
        biased;
        _ = unit.cancellation.cancelled() => {
            report.result = Err(DispatchError::Cancelled);
            return report;
        }
        permit = Arc::clone(&unit.permits).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                report.result = Err(DispatchError::task_failed(e.to_string()));
                return report;
            }
        },
    };

    let session = match unit
        .sink
        .open(&unit.target, SessionOptions::buffered(), unit.cancellation.clone())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            report.result = Err(DispatchError::session(e));
            return report;
        }
    };
    report.opened_session = true;
    debug!(chunk = unit.chunk.index, documents = unit.chunk.len(), "Chunk session opened");

    let written = write_chunk(session.as_ref(), &unit, &mut report.submitted).await;
    let closed = session.close().await;

    report.result = match (written, closed) {
        (Err(e), closed) => {
            if let Err(close_error) = closed {
                warn!(
                    chunk = unit.chunk.index,
                    error = %close_error,
                    "Failed to close chunk session after write failure"
                );
            }
            Err(e)
        }
        (Ok(()), Err(e)) => Err(DispatchError::flush(e)),
        (Ok(()), Ok(stats)) => {
            report.stats = stats;
            Ok(())
        }
    };
    debug!(chunk = unit.chunk.index, ok = report.result.is_ok(), "Chunk unit finished");
    report
}

async fn write_chunk<T: Serialize>(
    session: &dyn SinkSession,
    unit: &ChunkUnit<T>,
    submitted: &mut usize,
) -> Result<(), DispatchError> {
    let documents = unit.batch.slice(unit.chunk.range.clone()).ok_or_else(|| {
        DispatchError::invalid_parameter(format!(
            "chunk {} is outside the batch",
            unit.chunk.index
        ))
    })?;

    for (offset, document) in documents.iter().enumerate() {
        let ordinal = unit.chunk.first_ordinal() + offset;
        if unit.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let value = encode(document, ordinal)?;
        write_document(session, None, value, ordinal, &unit.cancellation).await?;
        *submitted += 1;
    }
    Ok(())
}
