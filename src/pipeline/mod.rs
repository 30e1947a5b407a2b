//! DetectionPipeline - Ingestion Orchestration
//!
//! ## Responsibilities
//!
//! - Run the ingestion sequence: append, invalidate, evaluate, notify
//! - Serve aggregate reads through the cache
//! - Enqueue multi-frame video jobs on the worker pool
//! - Apply the alert policy against the current settings
//!
//! Photo submissions are synchronous: the caller waits through the full
//! sequence and gets the stored record back. Video submissions are
//! acknowledged immediately and processed frame by frame on a worker,
//! with a pacing pause between frames standing in for real-time
//! arrival. The pause deliberately occupies that worker for the whole
//! clip.

use crate::aggregate_cache::{AggregateCache, AggregateValue, QueryKind};
use crate::alert_hub::{AlertHub, HubEvent};
use crate::detection_store::{DetectionRecord, DetectionStore};
use crate::detector::{Detection, Detector};
use crate::error::{Error, Result};
use crate::job_dispatch::{Job, WorkerPool};
use crate::models::{StatsSnapshot, VideoAccepted};
use crate::settings_store::{SettingsSnapshot, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Hard cap on history reads, applied after the per-request limit
const MAX_HISTORY_LIMIT: u32 = 500;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frames synthesized per submitted video
    pub video_frames: u32,
    /// Pacing pause between video frames
    pub frame_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_frames: 4,
            frame_interval: Duration::from_secs(2),
        }
    }
}

/// DetectionPipeline instance. Clones share all underlying services.
#[derive(Clone)]
pub struct DetectionPipeline {
    store: DetectionStore,
    cache: Arc<AggregateCache>,
    settings: Arc<SettingsStore>,
    hub: Arc<AlertHub>,
    detector: Arc<dyn Detector>,
    workers: Arc<WorkerPool>,
    config: PipelineConfig,
}

impl DetectionPipeline {
    /// Create new DetectionPipeline
    pub fn new(
        store: DetectionStore,
        cache: Arc<AggregateCache>,
        settings: Arc<SettingsStore>,
        hub: Arc<AlertHub>,
        detector: Arc<dyn Detector>,
        workers: Arc<WorkerPool>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
            hub,
            detector,
            workers,
            config,
        }
    }

    /// Analyze a photo and record the detection synchronously.
    ///
    /// Returns the stored record once it is durable, the cache is
    /// invalidated and the alert policy has been evaluated.
    pub async fn submit_photo(&self, image: &[u8]) -> Result<DetectionRecord> {
        if image.is_empty() {
            return Err(Error::Validation("empty image payload".to_string()));
        }

        let detection = self.detector.analyze_image(image);
        self.ingest(detection).await
    }

    /// Accept a video for background processing.
    ///
    /// One detection per synthesized frame is ingested by a worker,
    /// paced by the configured interval. The acknowledgement returns
    /// before any frame is recorded.
    pub async fn submit_video(&self, video: Vec<u8>) -> Result<VideoAccepted> {
        if video.is_empty() {
            return Err(Error::Validation("empty video payload".to_string()));
        }

        let frames = self.config.video_frames;
        let interval = self.config.frame_interval;
        let pipeline = self.clone();
        let job_id = Uuid::new_v4();

        let job = Job::new(format!("video-{job_id}"), async move {
            for frame_index in 0..frames {
                let detection = pipeline.detector.analyze_frame(&video, frame_index);
                let record = pipeline.ingest(detection).await?;
                tracing::debug!(
                    job_id = %job_id,
                    frame = frame_index,
                    id = record.id,
                    "Video frame recorded"
                );
                if frame_index + 1 < frames {
                    tokio::time::sleep(interval).await;
                }
            }
            Ok(())
        });

        self.workers.enqueue(job)?;
        tracing::info!(job_id = %job_id, frames = frames, "Video accepted for processing");

        Ok(VideoAccepted {
            frames,
            message: "Video accepted. Processing started.".to_string(),
        })
    }

    /// Total detection count plus the settings in effect
    pub async fn get_stats(&self) -> Result<StatsSnapshot> {
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_compute(QueryKind::Count, 0, || async move {
                store.count().await.map(AggregateValue::Count)
            })
            .await?;

        let count = match value {
            AggregateValue::Count(count) => count,
            _ => return Err(Error::Internal("count query produced wrong shape".to_string())),
        };

        let settings = self.settings.snapshot().await;
        Ok(StatsSnapshot {
            count,
            threshold: settings.threshold,
            alerts_enabled: settings.alerts_enabled,
        })
    }

    /// Most recent detections, newest first
    pub async fn get_history(&self, limit: u32) -> Result<Vec<DetectionRecord>> {
        let limit = limit.min(MAX_HISTORY_LIMIT);
        let store = self.store.clone();
        let value = self
            .cache
            .get_or_compute(QueryKind::RecentHistory, u64::from(limit), || async move {
                store.recent_history(limit).await.map(AggregateValue::History)
            })
            .await?;

        match value {
            AggregateValue::History(records) => Ok(records),
            _ => Err(Error::Internal("history query produced wrong shape".to_string())),
        }
    }

    /// Update the alert threshold and broadcast the new settings
    pub async fn set_threshold(&self, threshold: f64) -> Result<SettingsSnapshot> {
        let settings = self.settings.set_threshold(threshold).await?;
        self.hub.publish(HubEvent::Settings(settings)).await;
        Ok(settings)
    }

    /// Toggle alerting and broadcast the new settings
    pub async fn set_alerts_enabled(&self, enabled: bool) -> SettingsSnapshot {
        let settings = self.settings.set_alerts_enabled(enabled).await;
        self.hub.publish(HubEvent::Settings(settings)).await;
        settings
    }

    /// Register an alert subscriber. The first received event is the
    /// current settings snapshot.
    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<HubEvent>) {
        let settings = self.settings.snapshot().await;
        self.hub.subscribe(settings).await
    }

    /// Remove an alert subscriber
    pub async fn unsubscribe(&self, id: &Uuid) {
        self.hub.unsubscribe(id).await;
    }

    /// Record one detection: durable append, then cache invalidation,
    /// then alert evaluation. Later aggregate reads see the new record.
    async fn ingest(&self, detection: Detection) -> Result<DetectionRecord> {
        let record = self
            .store
            .append(&detection.object_class, detection.distance)
            .await?;
        self.cache.invalidate_all();
        self.evaluate_alert(&record).await;

        tracing::info!(
            id = record.id,
            object_class = %record.object_class,
            distance = ?record.distance,
            "Detection recorded"
        );

        Ok(record)
    }

    /// Publish the record iff alerts are on and it is within threshold.
    /// An undefined distance never alerts.
    async fn evaluate_alert(&self, record: &DetectionRecord) {
        let settings = self.settings.snapshot().await;
        let within = match record.distance {
            Some(distance) => distance <= settings.threshold,
            None => false,
        };

        if settings.alerts_enabled && within {
            tracing::info!(
                id = record.id,
                distance = ?record.distance,
                threshold = settings.threshold,
                "Proximity alert"
            );
            self.hub.publish(HubEvent::Detection(record.clone())).await;
        }
    }
}
