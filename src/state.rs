//! Application state
//!
//! Holds all shared components and state

use crate::alert_hub::AlertHub;
use crate::pipeline::{DetectionPipeline, PipelineConfig};
use crate::settings_store::SettingsSnapshot;
use crate::storage_pool::StoragePoolConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Warm connections kept by the storage pool
    pub pool_capacity: usize,
    /// Wait budget before the pool opens an overflow connection
    pub pool_acquire_timeout_ms: u64,
    /// Background workers draining the job queue
    pub worker_count: usize,
    /// Frames synthesized per video submission
    pub video_frames: u32,
    /// Pacing pause between video frames
    pub frame_interval_ms: u64,
    /// Cached parameterizations per aggregate query kind
    pub cache_capacity: usize,
    /// Alert threshold in meters at startup
    pub default_threshold: f64,
    /// Whether alerting starts enabled
    pub default_alerts_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("detections.db")),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            pool_capacity: std::env::var("POOL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            pool_acquire_timeout_ms: std::env::var("POOL_ACQUIRE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            video_frames: std::env::var("VIDEO_FRAMES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            frame_interval_ms: std::env::var("FRAME_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            cache_capacity: std::env::var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(32),
            default_threshold: std::env::var("ALERT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2.0),
            default_alerts_enabled: std::env::var("ALERTS_ENABLED")
                .ok()
                .map(|v| v == "true")
                .unwrap_or(true),
        }
    }
}

impl AppConfig {
    /// Storage pool settings derived from this config
    pub fn storage_pool_config(&self) -> StoragePoolConfig {
        StoragePoolConfig {
            database_path: self.database_path.clone(),
            capacity: self.pool_capacity,
            acquire_timeout: Duration::from_millis(self.pool_acquire_timeout_ms),
        }
    }

    /// Pipeline settings derived from this config
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            video_frames: self.video_frames,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
        }
    }

    /// Settings in effect at startup
    pub fn initial_settings(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            threshold: self.default_threshold,
            alerts_enabled: self.default_alerts_enabled,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Ingestion pipeline
    pub pipeline: Arc<DetectionPipeline>,
    /// AlertHub (WebSocket fan-out)
    pub hub: Arc<AlertHub>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}
