//! E2E Test Tool for RangeWatch
//!
//! Exercises a running RangeWatch server over HTTP and WebSocket.
//!
//! ## Usage
//! ```bash
//! # Default test set
//! cargo run -- --server http://127.0.0.1:8080
//!
//! # All tests (includes the slow video test and the WebSocket test)
//! cargo run -- --server http://127.0.0.1:8080 --all
//!
//! # Single test
//! cargo run -- --server http://127.0.0.1:8080 --test video
//! ```

use anyhow::{anyhow, Result};
use base64::Engine;
use clap::Parser;
use colored::*;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

#[derive(Parser, Debug)]
#[command(name = "rangewatch-test")]
#[command(about = "E2E Test Tool for RangeWatch")]
struct Args {
    /// RangeWatch server URL (e.g., http://127.0.0.1:8080)
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Run all tests
    #[arg(long)]
    all: bool,

    /// Run specific test (health, photo, video, stats, history, threshold, alerts, ws)
    #[arg(long)]
    test: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Single test outcome
#[derive(Debug)]
struct TestResult {
    name: String,
    success: bool,
    duration_ms: u64,
    message: String,
    details: Option<String>,
}

impl TestResult {
    fn success(name: &str, duration_ms: u64, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            duration_ms,
            message: message.to_string(),
            details: None,
        }
    }

    fn failure(name: &str, duration_ms: u64, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms,
            message: message.to_string(),
            details: None,
        }
    }

    fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }

    fn print(&self) {
        let status = if self.success {
            "✅".green()
        } else {
            "❌".red()
        };
        let result = if self.success { "SUCCESS" } else { "FAILED" };
        println!(
            "{} {}: {} ({}ms)",
            status,
            self.name.bold(),
            result
                .to_string()
                .color(if self.success { Color::Green } else { Color::Red }),
            self.duration_ms
        );
        if !self.message.is_empty() {
            println!("   └─ {}", self.message);
        }
        if let Some(ref details) = self.details {
            for line in details.lines() {
                println!("      {}", line.dimmed());
            }
        }
    }
}

/// Response envelope used by all REST endpoints
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_sec: u64,
    db_connected: bool,
    subscribers: u64,
}

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    id: i64,
    timestamp: String,
    object_class: String,
    distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StatsSnapshot {
    count: u64,
    threshold: f64,
    alerts_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SettingsSnapshot {
    threshold: f64,
    alerts_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct VideoAccepted {
    frames: u32,
    message: String,
}

/// Test runner
struct TestRunner {
    client: Client,
    base_url: String,
    verbose: bool,
}

impl TestRunner {
    fn new(base_url: &str, verbose: bool) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            verbose,
        }
    }

    fn ws_url(&self) -> String {
        format!("{}/api/ws", self.base_url.replacen("http", "ws", 1))
    }

    fn encode_payload(&self, payload: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    /// Current aggregate stats
    async fn fetch_stats(&self) -> Result<StatsSnapshot> {
        let url = format!("{}/api/stats", self.base_url);
        let envelope: ApiEnvelope<StatsSnapshot> =
            self.client.get(&url).send().await?.json().await?;
        envelope
            .data
            .ok_or_else(|| anyhow!("stats envelope had no data: {:?}", envelope.error))
    }

    /// Set the alert threshold, returning the full HTTP response
    async fn put_threshold(&self, threshold: f64) -> Result<reqwest::Response> {
        let url = format!("{}/api/settings/threshold", self.base_url);
        Ok(self
            .client
            .put(&url)
            .json(&serde_json::json!({ "threshold": threshold }))
            .send()
            .await?)
    }

    /// Enable or disable alert publication
    async fn put_alerts(&self, enabled: bool) -> Result<SettingsSnapshot> {
        let url = format!("{}/api/settings/alerts", self.base_url);
        let envelope: ApiEnvelope<SettingsSnapshot> = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "enabled": enabled }))
            .send()
            .await?
            .json()
            .await?;
        envelope
            .data
            .ok_or_else(|| anyhow!("alerts envelope had no data: {:?}", envelope.error))
    }

    /// Test 1: Health endpoint
    async fn test_health(&self) -> TestResult {
        let start = Instant::now();
        let url = format!("{}/healthz", self.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<HealthResponse>().await {
                Ok(health) => {
                    let duration = start.elapsed().as_millis() as u64;
                    if health.status == "ok" && health.db_connected {
                        TestResult::success(
                            "Health",
                            duration,
                            &format!(
                                "v{}, uptime {}s, {} subscribers",
                                health.version, health.uptime_sec, health.subscribers
                            ),
                        )
                    } else {
                        TestResult::failure(
                            "Health",
                            duration,
                            &format!("status={}, db_connected={}", health.status, health.db_connected),
                        )
                    }
                }
                Err(e) => TestResult::failure(
                    "Health",
                    start.elapsed().as_millis() as u64,
                    &format!("Parse error: {}", e),
                ),
            },
            Err(e) => TestResult::failure(
                "Health",
                start.elapsed().as_millis() as u64,
                &format!("Request error: {}", e),
            ),
        }
    }

    /// Test 2: Photo submission records a detection synchronously
    async fn test_photo(&self) -> TestResult {
        let start = Instant::now();

        let before = match self.fetch_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                return TestResult::failure(
                    "Photo Ingestion",
                    start.elapsed().as_millis() as u64,
                    &format!("Stats error: {}", e),
                )
            }
        };

        let url = format!("{}/api/detections/photo", self.base_url);
        let body = serde_json::json!({ "image": self.encode_payload(b"e2e photo payload") });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) => match resp.json::<ApiEnvelope<DetectionRecord>>().await {
                Ok(envelope) => {
                    let duration = start.elapsed().as_millis() as u64;
                    let record = match envelope.data {
                        Some(record) => record,
                        None => {
                            return TestResult::failure(
                                "Photo Ingestion",
                                duration,
                                &format!("No record in response: {:?}", envelope.error),
                            )
                        }
                    };

                    if self.verbose {
                        println!("Photo record: {:?}", record);
                    }

                    // The new record must be visible in stats immediately
                    match self.fetch_stats().await {
                        Ok(after) if after.count > before.count => TestResult::success(
                            "Photo Ingestion",
                            duration,
                            &format!(
                                "id={}, class={}, distance={:?}, count {} -> {}",
                                record.id, record.object_class, record.distance,
                                before.count, after.count
                            ),
                        ),
                        Ok(after) => TestResult::failure(
                            "Photo Ingestion",
                            duration,
                            &format!("Count did not advance: {} -> {}", before.count, after.count),
                        ),
                        Err(e) => TestResult::failure(
                            "Photo Ingestion",
                            duration,
                            &format!("Stats error after submit: {}", e),
                        ),
                    }
                }
                Err(e) => TestResult::failure(
                    "Photo Ingestion",
                    start.elapsed().as_millis() as u64,
                    &format!("Parse error: {}", e),
                ),
            },
            Err(e) => TestResult::failure(
                "Photo Ingestion",
                start.elapsed().as_millis() as u64,
                &format!("Request error: {}", e),
            ),
        }
    }

    /// Test 3: Video submission is accepted up front and all frames
    /// eventually land in storage
    async fn test_video(&self) -> TestResult {
        let start = Instant::now();

        let before = match self.fetch_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                return TestResult::failure(
                    "Video Processing",
                    start.elapsed().as_millis() as u64,
                    &format!("Stats error: {}", e),
                )
            }
        };

        let url = format!("{}/api/detections/video", self.base_url);
        let body = serde_json::json!({ "video": self.encode_payload(b"e2e video payload") });

        let accepted = match self.client.post(&url).json(&body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.as_u16() != 202 {
                    return TestResult::failure(
                        "Video Processing",
                        start.elapsed().as_millis() as u64,
                        &format!("Expected HTTP 202, got {}", status.as_u16()),
                    );
                }
                match resp.json::<ApiEnvelope<VideoAccepted>>().await {
                    Ok(envelope) => match envelope.data {
                        Some(accepted) => accepted,
                        None => {
                            return TestResult::failure(
                                "Video Processing",
                                start.elapsed().as_millis() as u64,
                                &format!("No acceptance in response: {:?}", envelope.error),
                            )
                        }
                    },
                    Err(e) => {
                        return TestResult::failure(
                            "Video Processing",
                            start.elapsed().as_millis() as u64,
                            &format!("Parse error: {}", e),
                        )
                    }
                }
            }
            Err(e) => {
                return TestResult::failure(
                    "Video Processing",
                    start.elapsed().as_millis() as u64,
                    &format!("Request error: {}", e),
                )
            }
        };

        if self.verbose {
            println!("Accepted: {} frames, {}", accepted.frames, accepted.message);
        }

        // Frames are paced a couple of seconds apart; poll until they all arrive
        let target = before.count + u64::from(accepted.frames);
        let deadline = Instant::now() + Duration::from_secs(10 + 3 * u64::from(accepted.frames));
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match self.fetch_stats().await {
                Ok(stats) if stats.count >= target => {
                    return TestResult::success(
                        "Video Processing",
                        start.elapsed().as_millis() as u64,
                        &format!(
                            "{} frames processed, count {} -> {}",
                            accepted.frames, before.count, stats.count
                        ),
                    );
                }
                Ok(stats) => {
                    if Instant::now() >= deadline {
                        return TestResult::failure(
                            "Video Processing",
                            start.elapsed().as_millis() as u64,
                            &format!(
                                "Timed out waiting for frames: count {} of target {}",
                                stats.count, target
                            ),
                        );
                    }
                }
                Err(e) => {
                    return TestResult::failure(
                        "Video Processing",
                        start.elapsed().as_millis() as u64,
                        &format!("Stats error while polling: {}", e),
                    )
                }
            }
        }
    }

    /// Test 4: Stats endpoint shape
    async fn test_stats(&self) -> TestResult {
        let start = Instant::now();

        match self.fetch_stats().await {
            Ok(stats) => TestResult::success(
                "Stats",
                start.elapsed().as_millis() as u64,
                &format!(
                    "count={}, threshold={}, alerts_enabled={}",
                    stats.count, stats.threshold, stats.alerts_enabled
                ),
            ),
            Err(e) => TestResult::failure(
                "Stats",
                start.elapsed().as_millis() as u64,
                &format!("{}", e),
            ),
        }
    }

    /// Test 5: History returns newest-first and honors the limit
    async fn test_history(&self) -> TestResult {
        let start = Instant::now();
        let url = format!("{}/api/history?limit=5", self.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<ApiEnvelope<Vec<DetectionRecord>>>().await {
                Ok(envelope) => {
                    let duration = start.elapsed().as_millis() as u64;
                    let records = envelope.data.unwrap_or_default();

                    if records.len() > 5 {
                        return TestResult::failure(
                            "History",
                            duration,
                            &format!("Limit ignored: got {} records", records.len()),
                        );
                    }
                    let ordered = records.windows(2).all(|pair| pair[0].id > pair[1].id);
                    if !ordered {
                        return TestResult::failure(
                            "History",
                            duration,
                            "Records are not newest-first",
                        );
                    }

                    let newest = records
                        .first()
                        .map(|r| format!("newest id={} at {}", r.id, r.timestamp))
                        .unwrap_or_else(|| "empty history".to_string());
                    TestResult::success(
                        "History",
                        duration,
                        &format!("{} records, {}", records.len(), newest),
                    )
                }
                Err(e) => TestResult::failure(
                    "History",
                    start.elapsed().as_millis() as u64,
                    &format!("Parse error: {}", e),
                ),
            },
            Err(e) => TestResult::failure(
                "History",
                start.elapsed().as_millis() as u64,
                &format!("Request error: {}", e),
            ),
        }
    }

    /// Test 6: Threshold validation accepts finite non-negative values
    /// and rejects negatives with HTTP 400
    async fn test_threshold(&self) -> TestResult {
        let start = Instant::now();

        let original = match self.fetch_stats().await {
            Ok(stats) => stats.threshold,
            Err(e) => {
                return TestResult::failure(
                    "Threshold Validation",
                    start.elapsed().as_millis() as u64,
                    &format!("Stats error: {}", e),
                )
            }
        };

        // Valid update
        let updated = match self.put_threshold(1.25).await {
            Ok(resp) => match resp.json::<ApiEnvelope<SettingsSnapshot>>().await {
                Ok(envelope) => envelope.data,
                Err(e) => {
                    return TestResult::failure(
                        "Threshold Validation",
                        start.elapsed().as_millis() as u64,
                        &format!("Parse error: {}", e),
                    )
                }
            },
            Err(e) => {
                return TestResult::failure(
                    "Threshold Validation",
                    start.elapsed().as_millis() as u64,
                    &format!("Request error: {}", e),
                )
            }
        };
        if updated.map(|s| s.threshold) != Some(1.25) {
            return TestResult::failure(
                "Threshold Validation",
                start.elapsed().as_millis() as u64,
                "Valid threshold update was not echoed back",
            );
        }

        // Negative values must be rejected and must not change the setting
        let rejected = match self.put_threshold(-1.0).await {
            Ok(resp) => resp.status().as_u16() == 400,
            Err(e) => {
                return TestResult::failure(
                    "Threshold Validation",
                    start.elapsed().as_millis() as u64,
                    &format!("Request error: {}", e),
                )
            }
        };
        let unchanged = match self.fetch_stats().await {
            Ok(stats) => stats.threshold == 1.25,
            Err(_) => false,
        };

        // Restore whatever was configured before the test
        let _ = self.put_threshold(original).await;

        let duration = start.elapsed().as_millis() as u64;
        if rejected && unchanged {
            TestResult::success(
                "Threshold Validation",
                duration,
                &format!("1.25 accepted, -1.0 rejected, restored {}", original),
            )
        } else {
            TestResult::failure(
                "Threshold Validation",
                duration,
                &format!("rejected={}, unchanged={}", rejected, unchanged),
            )
        }
    }

    /// Test 7: Alert toggle round-trip
    async fn test_alerts(&self) -> TestResult {
        let start = Instant::now();

        let disabled = match self.put_alerts(false).await {
            Ok(settings) => !settings.alerts_enabled,
            Err(e) => {
                return TestResult::failure(
                    "Alert Toggle",
                    start.elapsed().as_millis() as u64,
                    &format!("{}", e),
                )
            }
        };
        let enabled = match self.put_alerts(true).await {
            Ok(settings) => settings.alerts_enabled,
            Err(e) => {
                return TestResult::failure(
                    "Alert Toggle",
                    start.elapsed().as_millis() as u64,
                    &format!("{}", e),
                )
            }
        };

        let duration = start.elapsed().as_millis() as u64;
        if disabled && enabled {
            TestResult::success("Alert Toggle", duration, "disabled and re-enabled")
        } else {
            TestResult::failure(
                "Alert Toggle",
                duration,
                &format!("disabled={}, enabled={}", disabled, enabled),
            )
        }
    }

    /// Test 8: WebSocket delivers the settings snapshot on connect and
    /// a detection alert once a close detection is submitted
    async fn test_ws(&self) -> TestResult {
        let start = Instant::now();

        match self.run_ws_scenario().await {
            Ok(message) => TestResult::success(
                "WebSocket Alerts",
                start.elapsed().as_millis() as u64,
                &message,
            ),
            Err(e) => TestResult::failure(
                "WebSocket Alerts",
                start.elapsed().as_millis() as u64,
                &format!("{}", e),
            ),
        }
    }

    async fn run_ws_scenario(&self) -> Result<String> {
        let (mut ws, _) = connect_async(self.ws_url()).await?;

        // First frame is always the current settings snapshot
        let first = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .map_err(|_| anyhow!("No settings snapshot within 5s of connecting"))?
            .ok_or_else(|| anyhow!("WebSocket closed before the settings snapshot"))??;
        let first_json: serde_json::Value = match first {
            WsMessage::Text(text) => serde_json::from_str(&text)?,
            other => return Err(anyhow!("Unexpected first frame: {:?}", other)),
        };
        if first_json["type"] != "settings" {
            return Err(anyhow!("First frame was not settings: {}", first_json));
        }
        let original_threshold = first_json["data"]["threshold"]
            .as_f64()
            .ok_or_else(|| anyhow!("Settings snapshot missing threshold"))?;

        if self.verbose {
            println!("Settings snapshot: {}", first_json);
        }

        // Make any detection alert: simulated distances top out near 5,
        // so a 9.9 threshold catches every class
        self.put_alerts(true).await?;
        self.put_threshold(9.9).await?;

        let url = format!("{}/api/detections/photo", self.base_url);
        let body = serde_json::json!({ "image": self.encode_payload(b"e2e alert payload") });
        self.client.post(&url).json(&body).send().await?;

        // Settings updates also arrive on this socket; skip to the alert
        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(anyhow!("No detection alert within 10s"));
            }
            let frame = tokio::time::timeout(remaining, ws.next())
                .await
                .map_err(|_| anyhow!("No detection alert within 10s"))?
                .ok_or_else(|| anyhow!("WebSocket closed while waiting for the alert"))??;
            let json: serde_json::Value = match frame {
                WsMessage::Text(text) => serde_json::from_str(&text)?,
                _ => continue,
            };
            if self.verbose {
                println!("Frame: {}", json);
            }
            if json["type"] == "detection" {
                break Ok(format!(
                    "settings snapshot on connect, alert for class={} distance={}",
                    json["data"]["object_class"], json["data"]["distance"]
                ));
            }
        };

        // Restore the configured threshold before reporting
        self.put_threshold(original_threshold).await?;
        let _ = ws.send(WsMessage::Close(None)).await;

        outcome
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("{}", "═".repeat(60).blue());
    println!("{}", "  RangeWatch E2E Test Tool".bold());
    println!("{}", "═".repeat(60).blue());
    println!();
    println!("Target: {}", args.server.cyan());
    println!();

    let runner = TestRunner::new(&args.server, args.verbose);

    let mut results: Vec<TestResult> = Vec::new();

    let tests_to_run: Vec<&str> = if args.all {
        vec![
            "health",
            "photo",
            "stats",
            "history",
            "threshold",
            "alerts",
            "video",
            "ws",
        ]
    } else if let Some(ref test) = args.test {
        vec![test.as_str()]
    } else {
        vec!["health", "photo", "stats", "history", "threshold", "alerts"]
    };

    println!("{}", "Running tests...".yellow());
    println!("{}", "─".repeat(60));

    for test in &tests_to_run {
        let result = match *test {
            "health" => runner.test_health().await,
            "photo" => runner.test_photo().await,
            "video" => runner.test_video().await,
            "stats" => runner.test_stats().await,
            "history" => runner.test_history().await,
            "threshold" => runner.test_threshold().await,
            "alerts" => runner.test_alerts().await,
            "ws" => runner.test_ws().await,
            _ => TestResult::failure(test, 0, "Unknown test"),
        };
        result.print();
        results.push(result);
    }

    println!("{}", "─".repeat(60));

    let passed = results.iter().filter(|r| r.success).count();
    let failed = results.iter().filter(|r| !r.success).count();
    let total = results.len();

    println!();
    if failed == 0 {
        println!("{} All {} tests passed!", "✅".green(), total);
    } else {
        println!("{} {} passed, {} failed", "⚠️".yellow(), passed, failed);
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
