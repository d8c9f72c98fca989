//! Live transports: SSE, WebSocket and the MJPEG video feed

use axum::{
    body::{Body, Bytes},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::{SinkExt, Stream, StreamExt};
use std::convert::Infallible;

use crate::camera_capture::Frame;
use crate::sensor_state::SensorSnapshot;
use crate::state::AppState;

const MJPEG_BOUNDARY: &str = "frame";

/// Subscribe and map every snapshot through `render`
async fn snapshot_sse<F>(
    state: &AppState,
    render: F,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    F: Fn(&SensorSnapshot) -> Result<Event, axum::Error> + Send + 'static,
{
    let subscription = state.broadcaster.subscribe().await;
    let stream = subscription
        .into_stream()
        .map(move |snapshot| render(&snapshot));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Full snapshot as JSON per cadence
pub async fn state_stream(State(state): State<AppState>) -> impl IntoResponse {
    snapshot_sse(&state, |snapshot| Event::default().json_data(snapshot)).await
}

pub async fn temperature_stream(State(state): State<AppState>) -> impl IntoResponse {
    snapshot_sse(&state, |snapshot| {
        Ok(Event::default().data(snapshot.temperature.to_string()))
    })
    .await
}

pub async fn crying_status_stream(State(state): State<AppState>) -> impl IntoResponse {
    snapshot_sse(&state, |snapshot| {
        Ok(Event::default().data(snapshot.crying_status.to_string()))
    })
    .await
}

pub async fn baby_direction_stream(State(state): State<AppState>) -> impl IntoResponse {
    snapshot_sse(&state, |snapshot| {
        Ok(Event::default().data(snapshot.baby_direction.to_string()))
    })
    .await
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = state.broadcaster.subscribe().await;
    let conn_id = subscription.id();

    // Forward snapshots from the broadcaster to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(snapshot) = subscription.recv().await {
            let json = match serde_json::to_string(&*snapshot) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize snapshot");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Incoming messages are only watched for close / errors
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
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
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unregister(&conn_id).await;
}

/// One multipart part: boundary, headers, JPEG bytes
fn mjpeg_part(frame: &Frame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
        MJPEG_BOUNDARY
    );
    let mut part = Vec::with_capacity(header.len() + frame.jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(&frame.jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Raw camera frames as `multipart/x-mixed-replace`
pub async fn video_feed(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.frames.subscribe();

    // The current frame goes out immediately, later ones as they arrive
    let frames = futures::stream::unfold((rx, true), |(mut rx, mut first)| async move {
        loop {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            first = false;
            let latest = rx.borrow_and_update().clone();
            if let Some(frame) = latest {
                return Some((Ok::<_, Infallible>(mjpeg_part(&frame)), (rx, false)));
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
        )],
        Body::from_stream(frames),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_layout() {
        let frame = Frame {
            jpeg: Bytes::from_static(b"JPEGDATA"),
        };
        let part = mjpeg_part(&frame);
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n"
        );
    }
}
