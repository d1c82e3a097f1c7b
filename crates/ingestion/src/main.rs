//! OncoRAG Ingestion Service
//!
//! One-shot vectorizer for the evidence collection:
//! 1. Scans the source directory for text documents
//! 2. Creates the collection when it does not exist
//! 3. Embeds every document with the query encoder
//! 4. Upserts points in batches, retrying transient failures

mod errors;
mod processor;
mod scanner;

use anyhow::Context;
use oncorag_common::{
    config::AppConfig,
    embeddings::create_embedder,
    metrics,
    store::{QdrantStore, StoreSession},
    VERSION,
};
use processor::Vectorizer;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting OncoRAG Ingestion Service v{}", VERSION);
    metrics::register_metrics();

    let source_dir = Path::new(&config.ingestion.source_dir);
    let documents = scanner::scan_directory(source_dir, &config.ingestion.extension)?;
    info!(documents = documents.len(), dir = %source_dir.display(), "Source documents found");

    let embedder = create_embedder(&config.embedding)?;

    let store = QdrantStore::new(config.store.clone());
    let session = store.open_session()?;
    if session.ensure_collection(config.store.dimension).await? {
        info!(collection = store.collection(), "Created evidence collection");
    }

    // Refuse to write vectors the collection cannot hold
    let stored = session.vector_size().await?;
    if stored != embedder.dimension() {
        return Err(errors::IngestionError::Config(format!(
            "collection {} stores vectors of size {}, encoder produces {}",
            store.collection(),
            stored,
            embedder.dimension()
        ))
        .into());
    }

    let vectorizer = Vectorizer::new(embedder, session, config.ingestion.batch_size);
    let report = vectorizer.run(&documents).await;

    let mut session = vectorizer.into_sink();
    session.close();

    info!(
        processed = report.processed,
        failed_documents = report.failed_documents,
        failed_batches = report.failed_batches,
        "Processed {} documents",
        report.processed
    );
    Ok(())
}
