//! OpenSearch sink implementation.
//!
//! This module provides the concrete implementation of `BulkWriteSink` using the
//! OpenSearch Rust crate, along with the index administration the bulk indexer
//! needs before ingesting.

use async_trait::async_trait;
use opensearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts},
    OpenSearch,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use crate::config::BulkSinkConfig;
use crate::errors::SinkError;
use crate::interfaces::{BulkWriteSink, SinkSession};
use crate::opensearch::index_config::IndexConfig;
use crate::opensearch::session::OpenSearchSession;
use crate::types::SessionOptions;

/// OpenSearch bulk write sink.
///
/// Every session opened on this sink shares one HTTP client. Buffered sessions
/// run their own flush workers; see [`OpenSearchSession`].
///
/// # Example
///
/// ```ignore
/// use bulk_indexer_repository::{BulkSinkConfig, BulkWriteSink, OpenSearchSink, SessionOptions};
/// use tokio_util::sync::CancellationToken;
///
/// let sink = OpenSearchSink::new("http://localhost:9200", BulkSinkConfig::default()).await?;
/// let session = sink
///     .open("books", SessionOptions::buffered(), CancellationToken::new())
///     .await?;
/// session.write_one(None, serde_json::json!({"title": "Dune"})).await?;
/// let stats = session.close().await?;
/// ```
pub struct OpenSearchSink {
    client: OpenSearch,
    config: BulkSinkConfig,
}

impl OpenSearchSink {
    /// Create a new OpenSearch sink connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Worker and flush settings for the sessions this sink opens
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchSink)` - A new sink instance
    /// * `Err(SinkError)` - If connection setup fails
    pub async fn new(url: &str, config: BulkSinkConfig) -> Result<Self, SinkError> {
        let parsed_url = Url::parse(url).map_err(|e| SinkError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SinkError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            num_workers = config.num_workers,
            flush_documents = config.flush_documents,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            "Created OpenSearch sink"
        );

        Ok(Self { client, config })
    }

    /// Check that the cluster is reachable.
    pub async fn check_connection(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SinkError::connection(format!(
                "Ping failed with status {}",
                status
            )));
        }
        Ok(())
    }

    /// Check whether an index exists.
    pub async fn index_exists(&self, index: &str) -> Result<bool, SinkError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SinkError::index_creation(format!(
                "Unexpected status {} checking index {}",
                status, index
            ))),
        }
    }

    /// Create the index described by `index_config` if it does not exist.
    pub async fn ensure_index(&self, index_config: &IndexConfig) -> Result<(), SinkError> {
        if self.index_exists(&index_config.name).await? {
            debug!(index = %index_config.name, "Index already exists");
            return Ok(());
        }
        self.create_index(index_config).await
    }

    /// Delete the index if it exists, then create it anew.
    ///
    /// Used before benchmark-style ingests that must start from an empty index.
    pub async fn recreate_index(&self, index_config: &IndexConfig) -> Result<(), SinkError> {
        if self.index_exists(&index_config.name).await? {
            let response = self
                .client
                .indices()
                .delete(IndicesDeleteParts::Index(&[index_config.name.as_str()]))
                .send()
                .await
                .map_err(|e| SinkError::index_creation(e.to_string()))?;

            let status = response.status_code();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                error!(status = %status, body = %error_body, "Delete index request failed");
                return Err(SinkError::index_creation(format!(
                    "Failed to delete existing index {}: {}",
                    index_config.name, error_body
                )));
            }
            info!(index = %index_config.name, "Deleted existing index");
        }
        self.create_index(index_config).await
    }

    async fn create_index(&self, index_config: &IndexConfig) -> Result<(), SinkError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index_config.name))
            .body(index_config.create_body())
            .send()
            .await
            .map_err(|e| SinkError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Create index request failed");
            return Err(SinkError::index_creation(format!(
                "Failed to create index {} with status {}: {}",
                index_config.name, status, error_body
            )));
        }

        info!(index = %index_config.name, "Created index");
        Ok(())
    }
}

#[async_trait]
impl BulkWriteSink for OpenSearchSink {
    async fn open(
        &self,
        target: &str,
        options: SessionOptions,
        cancellation: CancellationToken,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        let session = OpenSearchSession::start(
            self.client.clone(),
            target,
            options,
            &self.config,
            cancellation,
        );
        Ok(Box::new(session))
    }
}
