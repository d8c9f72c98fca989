//! API Routes

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::stream_routes;
use crate::error::Result;
use crate::models::ApiResponse;
use crate::sensor_log::SensorLogEntry;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // State
        .route("/api/state", get(current_state))
        .route("/api/state/stream", get(stream_routes::state_stream))
        .route("/api/ws", get(stream_routes::ws_handler))
        .route("/api/history", get(history))
        // Legacy per-field streams
        .route("/temperature_stream", get(stream_routes::temperature_stream))
        .route("/crying_status", get(stream_routes::crying_status_stream))
        .route("/baby_direction", get(stream_routes::baby_direction_stream))
        .route("/video_feed", get(stream_routes::video_feed))
        // Actuator
        .route("/toggle_servo", get(toggle_servo).post(toggle_servo))
        .with_state(state)
}

async fn current_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.broadcaster.current())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

/// Most recent log entries, newest first
async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<SensorLogEntry>>>> {
    let limit = query
        .limit
        .unwrap_or(state.config.history_default_limit)
        .min(state.config.history_max_limit);

    let entries = state.history.query_recent(limit).await?;
    Ok(Json(ApiResponse::success(entries)))
}

async fn toggle_servo(State(state): State<AppState>) -> impl IntoResponse {
    state.actuator.toggle().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator_controller::{ActuatorConfig, ActuatorController};
    use crate::camera_capture::Frame;
    use crate::frame_relay::FrameRelay;
    use crate::sensor_log::{MemorySensorLogRepository, SensorLogRepository};
    use crate::sensor_state::{
        BabyDirection, CryingStatus, SensorStateStore, StateField, TemperatureReading,
    };
    use crate::serial_link::UnavailablePort;
    use crate::state::AppConfig;
    use crate::stream_broadcaster::{BroadcasterConfig, StreamBroadcaster};
    use axum::body::{Body, Bytes};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(config: AppConfig) -> AppState {
        let store = Arc::new(SensorStateStore::new());
        let broadcaster = Arc::new(StreamBroadcaster::new(
            store.clone(),
            BroadcasterConfig::default(),
        ));
        let actuator = Arc::new(ActuatorController::new(
            store.clone(),
            Arc::new(UnavailablePort),
            ActuatorConfig::default(),
        ));
        AppState {
            config: Arc::new(config),
            store,
            broadcaster,
            actuator,
            history: Arc::new(MemorySensorLogRepository::new()),
            frames: Arc::new(FrameRelay::new()),
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(test_state(AppConfig::default()));
        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscribers"], 0);
    }

    #[tokio::test]
    async fn test_state_placeholders_then_values() {
        let state = test_state(AppConfig::default());
        let app = create_router(state.clone());

        let json = body_json(app.clone().oneshot(get("/api/state")).await.unwrap()).await;
        assert_eq!(json["crying_status"], "unknown");
        assert_eq!(json["baby_direction"], "unknown");
        assert_eq!(json["temperature"], "pending");

        state.store.write(StateField::Temperature(TemperatureReading::Celsius(36.5)));
        state.store.write(StateField::BabyDirection(BabyDirection::Right));
        let json = body_json(app.oneshot(get("/api/state")).await.unwrap()).await;
        assert_eq!(json["temperature"], 36.5);
        assert_eq!(json["baby_direction"], "right");
    }

    #[tokio::test]
    async fn test_toggle_servo_text_and_methods() {
        let app = create_router(test_state(AppConfig::default()));

        let post = Request::builder()
            .method(Method::POST)
            .uri("/toggle_servo")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(post).await.unwrap();
        assert_eq!(body_text(response).await, "Servo ON");

        let response = app.oneshot(get("/toggle_servo")).await.unwrap();
        assert_eq!(body_text(response).await, "Servo OFF");
    }

    #[tokio::test]
    async fn test_history_newest_first_and_clamped() {
        let config = AppConfig {
            history_default_limit: 2,
            history_max_limit: 3,
            ..Default::default()
        };
        let state = test_state(config);
        for minute in 0..5 {
            state
                .history
                .persist(&SensorLogEntry {
                    recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, minute, 0).unwrap(),
                    temperature: Some(36.0),
                    crying_status: CryingStatus::Silent,
                    baby_direction: BabyDirection::Center,
                })
                .await
                .unwrap();
        }
        let app = create_router(state);

        let json = body_json(app.clone().oneshot(get("/api/history")).await.unwrap()).await;
        assert_eq!(json["ok"], true);
        let rows = json["data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0]["recorded_at"].as_str().unwrap() > rows[1]["recorded_at"].as_str().unwrap());

        let json = body_json(app.oneshot(get("/api/history?limit=1000")).await.unwrap()).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_history_rejects_bad_limit() {
        let app = create_router(test_state(AppConfig::default()));
        let response = app.oneshot(get("/api/history?limit=-4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_crying_status_sse_emits_text() {
        let state = test_state(AppConfig::default());
        state.store.write(StateField::CryingStatus(CryingStatus::Crying));
        let ticker = tokio::spawn(state.broadcaster.clone().run());
        let app = create_router(state.clone());

        let response = app.oneshot(get("/crying_status")).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let chunk: Bytes = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("data: Crying"), "unexpected event: {text}");
        ticker.abort();
    }

    #[tokio::test]
    async fn test_video_feed_sends_latest_frame() {
        let state = test_state(AppConfig::default());
        state.frames.publish(Frame {
            jpeg: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        });
        let app = create_router(state.clone());

        let response = app.oneshot(get("/video_feed")).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );

        let mut body = response.into_body().into_data_stream();
        let chunk: Bytes = body.next().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(chunk.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
