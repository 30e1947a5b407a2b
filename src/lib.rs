//! RangeWatch Server Library
//!
//! Detection ingestion and proximity alerting
//!
//! ## Architecture (9 Components)
//!
//! 1. StoragePool - SQLite connections with overflow acquisition
//! 2. DetectionStore - Durable detection persistence
//! 3. AggregateCache - Generation-stamped aggregate caching
//! 4. JobDispatch - Worker pool for queued background jobs
//! 5. AlertHub - Realtime event fan-out to subscribers
//! 6. SettingsStore - Runtime alert settings
//! 7. Detector - Simulated proximity detector
//! 8. DetectionPipeline - Ingestion and query orchestration
//! 9. WebAPI - REST/WebSocket endpoints
//!
//! ## Design Principles
//!
//! - A detection is durable before anything reacts to it
//! - Aggregate reads never serve data older than the latest write
//! - Accepting a submission never blocks on background processing

pub mod detector;
pub mod settings_store;
pub mod storage_pool;
pub mod detection_store;
pub mod aggregate_cache;
pub mod job_dispatch;
pub mod alert_hub;
pub mod pipeline;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
