//! Dependency initialization and wiring for the bulk indexer.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::aggregator::CollectingErrorSink;
use crate::dispatcher::{BulkDispatcher, DispatchStrategy, StrategyKind};
use crate::source;
use crate::IndexingError;
use bulk_indexer_repository::opensearch::IndexConfig;
use bulk_indexer_repository::{BulkSinkConfig, BulkWriteSink, InMemorySink, OpenSearchSink};
use bulk_indexer_shared::DocumentBatch;
use serde_json::Value;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default target index.
const DEFAULT_INDEX_NAME: &str = "documents";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default chunk size for the chunked strategy.
const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of concurrently running chunks.
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Default number of worker-pool workers.
const DEFAULT_WORKER_COUNT: usize = 4;

/// Default number of synthetic documents when no file is given.
const DEFAULT_DOCUMENT_COUNT: usize = 1000;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection at a fixed interval until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode. Defaults to `Retry` on unknown values.
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Which bulk write sink the binary writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// OpenSearch `_bulk` API.
    OpenSearch,
    /// In-memory sink; nothing leaves the process.
    Memory,
}

impl SinkKind {
    fn parse(value: Option<String>) -> Result<Self, IndexingError> {
        match value.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("opensearch") => Ok(Self::OpenSearch),
            Some("memory") | Some("in-memory") | Some("dry-run") => Ok(Self::Memory),
            Some(other) => Err(IndexingError::config(format!("Unknown SINK '{}'", other))),
        }
    }
}

/// Dispatch settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub index_name: String,
    pub strategy: DispatchStrategy,
    pub documents_path: Option<String>,
    pub document_count: usize,
}

impl DispatchSettings {
    /// Read dispatch settings from the process environment.
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read dispatch settings through `lookup`.
    ///
    /// Unparseable numbers fall back to their default; an unknown strategy is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexingError> {
        let kind = match lookup("DISPATCH_STRATEGY") {
            Some(value) => value
                .parse::<StrategyKind>()
                .map_err(|e| IndexingError::config(e.to_string()))?,
            None => StrategyKind::WorkerPool,
        };

        let strategy = match kind {
            StrategyKind::Sequential => DispatchStrategy::Sequential,
            StrategyKind::Bulk => DispatchStrategy::Bulk,
            StrategyKind::Chunked => DispatchStrategy::Chunked {
                chunk_size: parse_or(&lookup, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
                max_concurrency: parse_or(&lookup, "MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY),
            },
            StrategyKind::WorkerPool => DispatchStrategy::WorkerPool {
                workers: parse_or(&lookup, "WORKER_COUNT", DEFAULT_WORKER_COUNT),
            },
        };

        Ok(Self {
            index_name: lookup("INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            strategy,
            documents_path: lookup("DOCUMENTS_PATH").filter(|p| !p.is_empty()),
            document_count: parse_or(&lookup, "DOCUMENT_COUNT", DEFAULT_DOCUMENT_COUNT),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(value) => value.parse::<T>().unwrap_or_else(|_| {
            warn!(key, value = %value, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

/// Sink worker and flush settings read through `lookup`.
fn sink_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BulkSinkConfig {
    let defaults = BulkSinkConfig::default();
    let num_workers = parse_or(&lookup, "SINK_WORKERS", defaults.num_workers);
    let flush_documents = parse_or(&lookup, "SINK_FLUSH_DOCUMENTS", defaults.flush_documents);
    let flush_interval_ms = parse_or(
        &lookup,
        "SINK_FLUSH_INTERVAL_MS",
        defaults.flush_interval.as_millis() as u64,
    );

    defaults
        .with_num_workers(num_workers)
        .with_flush_documents(flush_documents)
        .with_flush_interval(Duration::from_millis(flush_interval_ms))
}

/// Target index settings read through `lookup`.
///
/// `INDEX_MAPPINGS` holds a JSON mappings body; invalid JSON is a config error.
fn index_config_from_lookup(
    index_name: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<IndexConfig, IndexingError> {
    let mut index_config = IndexConfig::new(index_name);
    if let Some(refresh_interval) = lookup("INDEX_REFRESH_INTERVAL").filter(|v| !v.is_empty()) {
        index_config = index_config.with_refresh_interval(refresh_interval);
    }
    if let Some(mappings) = lookup("INDEX_MAPPINGS").filter(|v| !v.is_empty()) {
        let mappings: Value = serde_json::from_str(&mappings)
            .map_err(|e| IndexingError::config(format!("Invalid INDEX_MAPPINGS: {}", e)))?;
        index_config = index_config.with_mappings(mappings);
    }
    Ok(index_config)
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// Dispatcher wired to the configured sink.
    pub dispatcher: BulkDispatcher,
    /// What to dispatch and how.
    pub settings: DispatchSettings,
    /// The documents to ingest.
    pub documents: DocumentBatch,
    /// Every error observed while dispatching, including discarded ones.
    pub errors: Arc<CollectingErrorSink>,
    /// The in-memory sink, when `SINK=memory`.
    pub memory_sink: Option<InMemorySink>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_NAME`: Target index (default: "documents")
    /// - `SINK`: "opensearch" or "memory" (default: opensearch)
    /// - `OPENSEARCH_CONNECTION_MODE`: Connection mode - "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `RECREATE_INDEX`: Delete and recreate the index before ingesting (default: false)
    /// - `DOCUMENTS_PATH`: NDJSON file to ingest (default: synthetic documents)
    /// - `DOCUMENT_COUNT`: Number of synthetic documents (default: 1000)
    /// - `DISPATCH_STRATEGY`: "sequential", "bulk", "chunked" or "worker-pool" (default: worker-pool)
    /// - `CHUNK_SIZE`: Documents per chunk (default: 1000)
    /// - `MAX_CONCURRENCY`: Chunks running at once (default: 8)
    /// - `WORKER_COUNT`: Worker-pool workers (default: 4)
    /// - `SINK_WORKERS`: Flush workers per buffered session (default: available parallelism)
    /// - `SINK_FLUSH_DOCUMENTS`: Documents per bulk request (default: 1000)
    /// - `SINK_FLUSH_INTERVAL_MS`: Flush interval in milliseconds (default: 30000)
    /// - `INDEX_REFRESH_INTERVAL`: Refresh interval of a created index (default: 60s)
    /// - `INDEX_MAPPINGS`: JSON mappings body of a created index (default: dynamic)
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (connection errors only in fail-fast mode)
    pub async fn new() -> Result<Self, IndexingError> {
        let settings = DispatchSettings::from_env()?;
        let sink_kind = SinkKind::parse(env::var("SINK").ok())?;
        let opensearch_url =
            env::var("OPENSEARCH_URL").unwrap_or_else(|_| DEFAULT_OPENSEARCH_URL.to_string());
        let connection_mode = ConnectionMode::parse(env::var("OPENSEARCH_CONNECTION_MODE").ok());
        let retry_interval = env::var("OPENSEARCH_RETRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);
        let recreate_index = env::var("RECREATE_INDEX")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        info!(
            opensearch_url = %opensearch_url,
            index = %settings.index_name,
            sink = ?sink_kind,
            strategy = ?settings.strategy,
            connection_mode = ?connection_mode,
            retry_interval_secs = retry_interval,
            recreate_index,
            "Initializing dependencies"
        );

        let (sink, memory_sink): (Arc<dyn BulkWriteSink>, Option<InMemorySink>) = match sink_kind
        {
            SinkKind::Memory => {
                let memory = InMemorySink::new();
                let sink: Arc<dyn BulkWriteSink> = Arc::new(memory.clone());
                (sink, Some(memory))
            }
            SinkKind::OpenSearch => {
                let sink = Self::connect_to_opensearch(
                    &opensearch_url,
                    Self::sink_config_from_env(),
                    connection_mode,
                    Duration::from_secs(retry_interval),
                )
                .await?;
                info!("OpenSearch connection established");

                let index_config =
                    index_config_from_lookup(&settings.index_name, |key| env::var(key).ok())?;
                let prepared = if recreate_index {
                    sink.recreate_index(&index_config).await
                } else {
                    sink.ensure_index(&index_config).await
                };
                prepared.map_err(|e| {
                    IndexingError::config(format!("Failed to prepare index: {}", e))
                })?;

                let sink: Arc<dyn BulkWriteSink> = Arc::new(sink);
                (sink, None)
            }
        };

        let documents = match &settings.documents_path {
            Some(path) => source::load_ndjson(path).await?,
            None => source::generate_documents(settings.document_count),
        };

        let errors = Arc::new(CollectingErrorSink::new());
        let dispatcher = BulkDispatcher::new(sink).with_error_sink(errors.clone());

        Ok(Self {
            dispatcher,
            settings,
            documents,
            errors,
            memory_sink,
        })
    }

    fn sink_config_from_env() -> BulkSinkConfig {
        sink_config_from_lookup(|key| env::var(key).ok())
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        config: BulkSinkConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchSink, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url, config.clone()).await {
                Ok(sink) => return Ok(sink),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch and reach the cluster.
    async fn try_connect_opensearch(
        url: &str,
        config: BulkSinkConfig,
    ) -> Result<OpenSearchSink, IndexingError> {
        let sink = OpenSearchSink::new(url, config).await.map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch sink: {}", e))
        })?;
        sink.check_connection()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch is unreachable: {}", e)))?;

        Ok(sink)
    }
}
