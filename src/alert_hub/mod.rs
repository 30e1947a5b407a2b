//! AlertHub - Real-Time Alert Fan-Out
//!
//! ## Responsibilities
//!
//! - Subscriber registry for live alert delivery
//! - Best-effort broadcast of detection alerts and settings changes
//! - Settings snapshot push to every new subscriber
//!
//! Delivery is fire-and-forget over unbounded channels: a slow or gone
//! subscriber never blocks the publisher, and nothing is retried. The
//! alert predicate itself lives in the pipeline; the hub only fans out
//! what it is handed.

use crate::detection_store::DetectionRecord;
use crate::settings_store::SettingsSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Events delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubEvent {
    /// A detection that satisfied the alert policy
    Detection(DetectionRecord),
    /// The settings now in effect
    Settings(SettingsSnapshot),
}

/// Subscriber connection
struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<HubEvent>,
}

/// AlertHub instance
pub struct AlertHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
}

impl AlertHub {
    /// Create new AlertHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber.
    ///
    /// The receiver's first event is the given settings snapshot; past
    /// detections are not replayed.
    pub async fn subscribe(
        &self,
        settings: SettingsSnapshot,
    ) -> (Uuid, mpsc::UnboundedReceiver<HubEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        // The receiver is alive here, so this send cannot fail.
        let _ = tx.send(HubEvent::Settings(settings));

        {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, Subscriber { id, tx });
        }

        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscriber_id = %id, "Subscriber connected");

        (id, rx)
    }

    /// Remove a subscriber
    pub async fn unsubscribe(&self, id: &Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(id).is_some() {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Subscriber disconnected");
        }
    }

    /// Broadcast an event to all subscribers, best effort
    pub async fn publish(&self, event: HubEvent) {
        let subscribers = self.subscribers.read().await;
        tracing::debug!(
            subscriber_count = subscribers.len(),
            "Publishing event to subscribers"
        );

        for subscriber in subscribers.values() {
            if let Err(e) = subscriber.tx.send(event.clone()) {
                tracing::warn!(
                    subscriber_id = %subscriber.id,
                    error = %e,
                    "Failed to deliver event"
                );
            }
        }
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new()
    }
}
