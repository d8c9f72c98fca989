//! Application state
//!
//! Holds all shared components and configuration

use crate::actuator_controller::{ActuatorConfig, ActuatorController};
use crate::audio_capture::AudioConfig;
use crate::frame_relay::FrameRelay;
use crate::producers::{
    CryProducerConfig, FaceProducerConfig, SignConvention, TemperatureProducerConfig,
};
use crate::sensor_log::SensorLogRepository;
use crate::sensor_state::SensorStateStore;
use crate::serial_link::SerialConfig;
use crate::stream_broadcaster::{BroadcasterConfig, StreamBroadcaster};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MySQL URL; history stays in memory when unset
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Front-end build served as fallback
    pub static_dir: Option<PathBuf>,
    /// Inference service base URL
    pub inference_url: String,
    pub audio: AudioConfig,
    pub cry: CryProducerConfig,
    pub face: FaceProducerConfig,
    pub serial: SerialConfig,
    pub temperature: TemperatureProducerConfig,
    pub actuator: ActuatorConfig,
    pub snapshot_interval: Duration,
    pub broadcaster: BroadcasterConfig,
    pub history_default_limit: u32,
    pub history_max_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: None,
            inference_url: "http://localhost:9000".to_string(),
            audio: AudioConfig::default(),
            cry: CryProducerConfig::default(),
            face: FaceProducerConfig::default(),
            serial: SerialConfig::default(),
            temperature: TemperatureProducerConfig::default(),
            actuator: ActuatorConfig::default(),
            snapshot_interval: Duration::from_secs(60),
            broadcaster: BroadcasterConfig::default(),
            history_default_limit: 20,
            history_max_limit: 200,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Invalid values keep the default and log
    /// a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = Env { lookup: &lookup };

        config.database_url = env.string("DATABASE_URL");
        if let Some(host) = env.string("HOST") {
            config.host = host;
        }
        config.port = env.parsed("PORT", config.port);
        config.static_dir = env.string("STATIC_DIR").map(PathBuf::from);
        if let Some(url) = env.string("INFERENCE_URL") {
            config.inference_url = url;
        }
        if let Some(device) = env.string("AUDIO_DEVICE") {
            config.audio.device = device;
        }

        config.cry.cadence = env.millis("CRY_CADENCE_MS", config.cry.cadence);
        config.cry.cooldown = env.millis("CRY_COOLDOWN_MS", config.cry.cooldown);

        let threshold: f32 = env.parsed("FACE_THRESHOLD", config.face.threshold);
        if threshold.is_finite() && threshold > 0.0 {
            config.face.threshold = threshold;
        } else {
            tracing::warn!(key = "FACE_THRESHOLD", value = threshold, "Invalid value, using default");
        }
        if let Some(sign) = env.string("FACE_SIGN") {
            match SignConvention::parse(&sign) {
                Some(sign) => config.face.sign = sign,
                None => tracing::warn!(key = "FACE_SIGN", value = %sign, "Invalid value, using default"),
            }
        }
        let start = env.parsed("CAMERA_INDEX_START", config.face.camera_indices.start);
        let end = env.parsed("CAMERA_INDEX_END", config.face.camera_indices.end);
        if start < end {
            config.face.camera_indices = start..end;
        } else {
            tracing::warn!(start, end, "Empty camera index range, using default");
        }

        if let Some(port) = env.string("SERIAL_PORT") {
            config.serial.port = PathBuf::from(port);
        }
        config.serial.baud = env.parsed("SERIAL_BAUD", config.serial.baud);
        if let Some(marker) = env.string("TEMP_MARKER") {
            config.temperature.marker = marker;
        }

        config.actuator.interval = env.millis("SERVO_INTERVAL_MS", config.actuator.interval);
        config.snapshot_interval = env.secs("SNAPSHOT_INTERVAL_SECS", config.snapshot_interval);
        config.broadcaster.cadence = env.millis("STREAM_CADENCE_MS", config.broadcaster.cadence);

        config.history_max_limit = env.parsed("HISTORY_MAX_LIMIT", config.history_max_limit);
        config.history_default_limit = env
            .parsed("HISTORY_DEFAULT_LIMIT", config.history_default_limit)
            .min(config.history_max_limit);

        config
    }
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.string(key) {
            None => default,
            Some(raw) => match raw.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Invalid value, using default");
                    default
                }
            },
        }
    }

    /// Zero durations are rejected
    fn secs(&self, key: &str, default: Duration) -> Duration {
        let secs: u64 = self.parsed(key, default.as_secs());
        if secs == 0 {
            tracing::warn!(key, "Zero duration, using default");
            return default;
        }
        Duration::from_secs(secs)
    }

    /// Zero durations are rejected
    fn millis(&self, key: &str, default: Duration) -> Duration {
        let ms: u64 = self.parsed(key, default.as_millis() as u64);
        if ms == 0 {
            tracing::warn!(key, "Zero duration, using default");
            return default;
        }
        Duration::from_millis(ms)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<SensorStateStore>,
    pub broadcaster: Arc<StreamBroadcaster>,
    pub actuator: Arc<ActuatorController>,
    pub history: Arc<dyn SensorLogRepository>,
    pub frames: Arc<FrameRelay>,
}
