//! RangeWatch Server - Detection ingestion and proximity alerting
//!
//! Main entry point for the RangeWatch application.

use rangewatch::{
    aggregate_cache::AggregateCache,
    alert_hub::AlertHub,
    detection_store::DetectionStore,
    detector::{Detector, SimulatedDetector},
    job_dispatch::WorkerPool,
    pipeline::DetectionPipeline,
    settings_store::SettingsStore,
    state::{AppConfig, AppState},
    storage_pool::StoragePool,
    web_api,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rangewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RangeWatch server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_path = %config.database_path.display(),
        pool_capacity = config.pool_capacity,
        worker_count = config.worker_count,
        video_frames = config.video_frames,
        "Configuration loaded"
    );

    // Storage pool and schema
    let pool = StoragePool::connect(config.storage_pool_config()).await?;
    let store = DetectionStore::new(pool);
    store.init_schema().await?;
    tracing::info!("DetectionStore initialized");

    // Initialize components
    let cache = Arc::new(AggregateCache::new(config.cache_capacity));
    let settings = Arc::new(SettingsStore::new(config.initial_settings()));
    let hub = Arc::new(AlertHub::new());
    let detector: Arc<dyn Detector> = Arc::new(SimulatedDetector::new());
    let workers = Arc::new(WorkerPool::start(config.worker_count));
    tracing::info!(worker_count = workers.worker_count(), "WorkerPool started");

    let pipeline = Arc::new(DetectionPipeline::new(
        store,
        cache,
        settings,
        hub.clone(),
        detector,
        workers,
        config.pipeline_config(),
    ));
    tracing::info!("DetectionPipeline initialized");

    // Create application state
    let state = AppState {
        config,
        pipeline,
        hub,
        started_at: Instant::now(),
    };

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
