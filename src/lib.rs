//! cradlewatch - infant monitoring hub
//!
//! ## Architecture
//!
//! 1. SensorState - shared latest-value store
//! 2. Producers - cry, face direction and temperature loops
//! 3. ActuatorController - armed/disarmed servo drive loop
//! 4. StateSnapshotter - periodic history writer
//! 5. StreamBroadcaster - fixed-cadence fan-out to live subscribers
//! 6. SensorLog - history persistence and query
//! 7. WebAPI - HTTP, SSE, WebSocket and video endpoints
//!
//! Device and model access sits behind the collaborator traits in
//! `audio_capture`, `camera_capture`, `inference_client` and `serial_link`.

pub mod actuator_controller;
pub mod audio_capture;
pub mod camera_capture;
pub mod frame_relay;
pub mod inference_client;
pub mod producers;
pub mod sensor_log;
pub mod sensor_state;
pub mod serial_link;
pub mod snapshotter;
pub mod stream_broadcaster;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
