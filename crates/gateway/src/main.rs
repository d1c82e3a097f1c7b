//! OncoRAG API Gateway
//!
//! The serving boundary for oncology questions.
//! Handles:
//! - Query parsing and validation
//! - Translation between the user and model languages
//! - Rate limiting
//! - Observability (logging, metrics)
//! - Startup verification of the evidence collection

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use oncorag_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    errors::AppError,
    generation::create_engine,
    metrics::{self, ANSWER_BUCKETS, METRICS_PREFIX, RETRIEVAL_BUCKETS},
    pipeline::PipelineOptions,
    store::QdrantStore,
    translation::{create_translator, Translator},
    AnswerCache, RagPipeline,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<RagPipeline>,
    pub translator: Arc<dyn Translator>,
}

/// Rate limit settings applied to the query route
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting OncoRAG API Gateway v{}", oncorag_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(&config.observability)?;
    }
    metrics::register_metrics();

    let config = Arc::new(config);
    let pipeline = Arc::new(build_pipeline(&config)?);

    check_store(pipeline.verify_store().await)?;
    info!(collection = %config.store.collection, "Evidence store check finished");

    let translator = create_translator(&config.translation)?;

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        translator,
    };

    let rate_limit = config.rate_limit.enabled.then_some(RateLimit {
        requests_per_second: config.rate_limit.requests_per_second,
        burst: config.rate_limit.burst,
    });

    // Build the router
    let app = create_router(state, rate_limit)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let drain_limit = config.shutdown_timeout();

    // In-flight requests get `shutdown_timeout` to finish after the signal
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(drain_limit).await;
        } => warn!(timeout_secs = drain_limit.as_secs(), "Shutdown timeout elapsed, dropping open connections"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let port = config.metrics_port;
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_answer_duration_seconds", METRICS_PREFIX)),
            ANSWER_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".to_string()), RETRIEVAL_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Decide whether the startup store check allows serving
///
/// Fatal errors (a collection built for another encoder) abort startup. An
/// unreachable store only degrades answers until it comes back.
fn check_store(result: Result<(), AppError>) -> Result<(), AppError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Evidence collection does not match the encoder, aborting");
            Err(e)
        }
        Err(e) => {
            warn!(error = %e, "Evidence store not reachable at startup, serving degraded answers");
            Ok(())
        }
    }
}

/// Wire the production capabilities into one pipeline
fn build_pipeline(config: &AppConfig) -> Result<RagPipeline, AppError> {
    let embedder = create_embedder(&config.embedding)?;
    let engine = create_engine(&config.generation)?;
    let store = Arc::new(QdrantStore::new(config.store.clone()));
    let cache = Arc::new(AnswerCache::new(config.cache.capacity));

    info!(
        embedding_model = embedder.model_name(),
        generation_model = engine.model_name(),
        collection = %config.store.collection,
        cache_capacity = config.cache.capacity,
        "Pipeline configured"
    );

    Ok(RagPipeline::new(
        embedder,
        store,
        engine,
        cache,
        PipelineOptions::from(config),
    ))
}

/// Create the main application router
fn create_router(state: AppState, rate_limit: Option<RateLimit>) -> Result<Router, AppError> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut query_routes = Router::new().route("/oncology/query/", post(handlers::query::oncology_query));

    if let Some(limit) = rate_limit {
        let limiter = create_rate_limiter(limit.requests_per_second, limit.burst)?;
        query_routes = query_routes.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                rate_limit_middleware(request, next, limiter.clone(), limit.requests_per_second)
            },
        ));
    }

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    // Compose the app
    Ok(Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(query_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
