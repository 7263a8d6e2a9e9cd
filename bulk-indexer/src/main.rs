//! Bulk Indexer Main Entry Point
//!
//! Loads a batch of documents and dispatches it into the configured bulk
//! write sink with the configured strategy. Ctrl-C cancels the dispatch.

use bulk_indexer::{Dependencies, IndexingError};
use dotenv::dotenv;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("bulk_indexer=info,bulk_indexer_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "bulk-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "bulk-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!("Starting bulk indexer");

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!(documents = deps.documents.len(), "Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let cancellation = CancellationToken::new();
    let ctrl_c_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling dispatch");
            ctrl_c_token.cancel();
        }
    });

    let result = deps
        .dispatcher
        .dispatch(
            &cancellation,
            &deps.settings.index_name,
            &deps.documents,
            deps.settings.strategy,
        )
        .await;

    if !deps.errors.is_empty() {
        warn!(observed_errors = deps.errors.len(), "Errors observed during dispatch");
    }

    match result {
        Ok(summary) => {
            info!(
                strategy = summary.strategy,
                documents = summary.documents,
                submitted = summary.submitted,
                units = summary.units,
                sessions = summary.sessions,
                skipped = summary.serialization_failures,
                flushed = summary.sink_stats.num_flushed,
                failed = summary.sink_stats.num_failed,
                requests = summary.sink_stats.num_requests,
                "Bulk indexer completed successfully"
            );
            if let Some(memory) = &deps.memory_sink {
                info!(
                    stored = memory.document_count(&deps.settings.index_name),
                    "Dry run finished"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Bulk indexer failed");
            Err(e.into())
        }
    }
}
