//! Shared models and types for RangeWatch
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub db_connected: bool,
    pub subscribers: u64,
}

/// Aggregate view returned by the stats endpoint: total stored
/// detections plus the settings in effect when the count was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub count: u64,
    pub threshold: f64,
    pub alerts_enabled: bool,
}

/// Acknowledgement for an accepted video submission. Processing runs
/// in the background; frames shows how many detections will be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAccepted {
    pub frames: u32,
    pub message: String,
}
