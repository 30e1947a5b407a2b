//! SettingsStore - Runtime Alert Settings
//!
//! ## Responsibilities
//!
//! - Hold the proximity alert threshold and the alerts on/off switch
//! - Validate threshold updates before they take effect
//! - Hand out consistent snapshots to ingestion and the API layer
//!
//! Settings are process-local runtime state. They reset to the
//! configured defaults on restart; only detections are persisted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Point-in-time view of the alert settings.
///
/// Both fields are read together by the alert predicate, so callers
/// always work from one snapshot rather than two independent reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Alert when a detection is at most this many meters away
    pub threshold: f64,
    /// Master switch for alert publication
    pub alerts_enabled: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            alerts_enabled: true,
        }
    }
}

/// SettingsStore service
pub struct SettingsStore {
    inner: RwLock<SettingsSnapshot>,
}

impl SettingsStore {
    /// Create a store seeded with the given settings
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Create with default settings
    pub fn with_defaults() -> Self {
        Self::new(SettingsSnapshot::default())
    }

    /// Current settings
    pub async fn snapshot(&self) -> SettingsSnapshot {
        *self.inner.read().await
    }

    /// Update the alert threshold.
    ///
    /// Rejects NaN, infinities and negative values; the stored settings
    /// are untouched when validation fails. Returns the settings now in
    /// effect so the caller can broadcast them.
    pub async fn set_threshold(&self, threshold: f64) -> Result<SettingsSnapshot> {
        if !threshold.is_finite() {
            return Err(Error::Validation(
                "threshold must be a finite number".to_string(),
            ));
        }
        if threshold < 0.0 {
            return Err(Error::Validation(
                "threshold must not be negative".to_string(),
            ));
        }

        let mut settings = self.inner.write().await;
        settings.threshold = threshold;
        tracing::info!(threshold = threshold, "Alert threshold updated");
        Ok(*settings)
    }

    /// Flip the alerts master switch. Returns the settings now in effect.
    pub async fn set_alerts_enabled(&self, enabled: bool) -> SettingsSnapshot {
        let mut settings = self.inner.write().await;
        settings.alerts_enabled = enabled;
        tracing::info!(alerts_enabled = enabled, "Alerts toggled");
        *settings
    }
}
