//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::ApiResponse;
use crate::state::AppState;

/// History page size when the query string does not specify one
const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Detections
        .route("/api/detections/photo", post(submit_photo))
        .route("/api/detections/video", post(submit_video))
        // Aggregates
        .route("/api/stats", get(get_stats))
        .route("/api/history", get(get_history))
        // Settings
        .route("/api/settings/threshold", put(update_threshold))
        .route("/api/settings/alerts", put(update_alerts))
        // Realtime
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

/// Photo submission request
#[derive(Debug, Deserialize)]
struct PhotoSubmission {
    /// Base64-encoded image bytes
    image: String,
}

/// Video submission request
#[derive(Debug, Deserialize)]
struct VideoSubmission {
    /// Base64-encoded clip bytes
    video: String,
}

/// Threshold update request
#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    threshold: f64,
}

/// Alert toggle request
#[derive(Debug, Deserialize)]
struct AlertsUpdate {
    enabled: bool,
}

/// History query parameters
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

/// Decode a base64 request payload
fn decode_payload(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Validation(format!("Invalid base64 payload: {}", e)))
}

/// Submit a photo for immediate analysis
async fn submit_photo(
    State(state): State<AppState>,
    Json(req): Json<PhotoSubmission>,
) -> impl IntoResponse {
    let image = match decode_payload(&req.image) {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };

    match state.pipeline.submit_photo(&image).await {
        Ok(record) => Json(ApiResponse::success(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Submit a simulated video clip for background analysis
async fn submit_video(
    State(state): State<AppState>,
    Json(req): Json<VideoSubmission>,
) -> impl IntoResponse {
    let video = match decode_payload(&req.video) {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };

    match state.pipeline.submit_video(video).await {
        Ok(accepted) => {
            (StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Aggregate detection stats
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.get_stats().await {
        Ok(stats) => Json(ApiResponse::success(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Most recent detections, newest first
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    match state.pipeline.get_history(limit).await {
        Ok(records) => Json(ApiResponse::success(records)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update the proximity alert threshold
async fn update_threshold(
    State(state): State<AppState>,
    Json(req): Json<ThresholdUpdate>,
) -> impl IntoResponse {
    match state.pipeline.set_threshold(req.threshold).await {
        Ok(settings) => Json(ApiResponse::success(settings)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Enable or disable alert publication
async fn update_alerts(
    State(state): State<AppState>,
    Json(req): Json<AlertsUpdate>,
) -> impl IntoResponse {
    let settings = state.pipeline.set_alerts_enabled(req.enabled).await;
    Json(ApiResponse::success(settings))
}

// ===== WebSocket =====

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with the alert hub; the first queued event is the
    // current settings snapshot.
    let (conn_id, mut rx) = state.pipeline.subscribe().await;

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    // Forward hub events to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize hub event");
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong, close)
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by axum
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    // Wait for either task to complete
    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    // Unregister from hub
    state.pipeline.unsubscribe(&conn_id).await;
}
