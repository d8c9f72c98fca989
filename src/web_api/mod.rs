//! WebAPI - HTTP Endpoints
//!
//! ## Responsibilities
//!
//! - JSON state and history queries
//! - Live transports (SSE, WebSocket, MJPEG video)
//! - Actuator toggle

mod routes;
mod stream_routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.broadcaster.current();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.broadcaster.subscriber_count(),
        // The relay keeps no receiver of its own
        video_viewers: state.frames.viewer_count(),
        camera_error: snapshot.camera_error,
        serial_error: snapshot.serial_error,
    };

    Json(response)
}
