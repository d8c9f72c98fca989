//! SensorState - Shared Latest-Value Store
//!
//! ## Responsibilities
//!
//! - Hold the latest value of every tracked sensor field plus device error flags
//! - Hand out full copies (`SensorSnapshot`) to consumers
//! - Accept single-field writes from producers
//!
//! One guard covers the whole structure. Critical sections only copy or
//! assign, so nothing that blocks (device I/O, awaits) ever runs under it.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Cry classification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CryingStatus {
    /// Placeholder before the first classification
    #[default]
    Unknown,
    Silent,
    Crying,
    /// Capture or model failure on the latest attempt
    Error,
}

impl CryingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CryingStatus::Unknown => "unknown",
            CryingStatus::Silent => "silent",
            CryingStatus::Crying => "crying",
            CryingStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unknown" => Some(CryingStatus::Unknown),
            "silent" => Some(CryingStatus::Silent),
            "crying" => Some(CryingStatus::Crying),
            "error" => Some(CryingStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for CryingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CryingStatus::Unknown => "Checking...",
            CryingStatus::Silent => "Silent",
            CryingStatus::Crying => "Crying",
            CryingStatus::Error => "Error",
        };
        f.write_str(text)
    }
}

/// Face direction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BabyDirection {
    /// Placeholder before the first frame
    #[default]
    Unknown,
    Center,
    Left,
    Right,
    NotDetected,
    /// Camera unavailable
    Error,
}

impl BabyDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BabyDirection::Unknown => "unknown",
            BabyDirection::Center => "center",
            BabyDirection::Left => "left",
            BabyDirection::Right => "right",
            BabyDirection::NotDetected => "not_detected",
            BabyDirection::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unknown" => Some(BabyDirection::Unknown),
            "center" => Some(BabyDirection::Center),
            "left" => Some(BabyDirection::Left),
            "right" => Some(BabyDirection::Right),
            "not_detected" => Some(BabyDirection::NotDetected),
            "error" => Some(BabyDirection::Error),
            _ => None,
        }
    }
}

impl fmt::Display for BabyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BabyDirection::Unknown => "Checking...",
            BabyDirection::Center => "Facing forward",
            BabyDirection::Left => "Moving left",
            BabyDirection::Right => "Moving right",
            BabyDirection::NotDetected => "Not detected",
            BabyDirection::Error => "Camera error",
        };
        f.write_str(text)
    }
}

/// Latest temperature value
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TemperatureReading {
    /// No reading yet
    #[default]
    Pending,
    /// Degrees Celsius
    Celsius(f32),
    /// Explicit error marker
    Error,
}

impl TemperatureReading {
    pub fn celsius(&self) -> Option<f32> {
        match self {
            TemperatureReading::Celsius(value) => Some(*value),
            _ => None,
        }
    }
}

/// Numbers serialize as numbers, the two markers as strings
impl Serialize for TemperatureReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TemperatureReading::Pending => serializer.serialize_str("pending"),
            TemperatureReading::Celsius(value) => serializer.serialize_f32(*value),
            TemperatureReading::Error => serializer.serialize_str("error"),
        }
    }
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureReading::Pending => f.write_str("Checking..."),
            TemperatureReading::Celsius(value) => write!(f, "{:.1}", value),
            TemperatureReading::Error => f.write_str("Error"),
        }
    }
}

/// Full copy of the shared state at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorSnapshot {
    pub crying_status: CryingStatus,
    pub baby_direction: BabyDirection,
    pub temperature: TemperatureReading,
    pub servo_armed: bool,
    pub camera_error: bool,
    pub serial_error: bool,
}

impl SensorSnapshot {
    /// True once every sensor field has left its placeholder.
    /// Error values count as observed.
    pub fn is_warmed_up(&self) -> bool {
        self.crying_status != CryingStatus::Unknown
            && self.baby_direction != BabyDirection::Unknown
            && self.temperature != TemperatureReading::Pending
    }
}

/// One field assignment. Each variant has exactly one producing task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateField {
    CryingStatus(CryingStatus),
    BabyDirection(BabyDirection),
    Temperature(TemperatureReading),
    ServoArmed(bool),
    CameraError(bool),
    SerialError(bool),
}

/// Shared state store
pub struct SensorStateStore {
    inner: Mutex<SensorSnapshot>,
}

impl SensorStateStore {
    /// Create store with every field at its placeholder
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SensorSnapshot::default()),
        }
    }

    /// Copy of all fields
    pub fn read(&self) -> SensorSnapshot {
        *self.lock()
    }

    /// Assign one field
    pub fn write(&self, field: StateField) {
        let mut state = self.lock();
        match field {
            StateField::CryingStatus(v) => state.crying_status = v,
            StateField::BabyDirection(v) => state.baby_direction = v,
            StateField::Temperature(v) => state.temperature = v,
            StateField::ServoArmed(v) => state.servo_armed = v,
            StateField::CameraError(v) => state.camera_error = v,
            StateField::SerialError(v) => state.serial_error = v,
        }
    }

    // Every critical section leaves the snapshot valid, so a poisoned
    // guard still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, SensorSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SensorStateStore {
    fn default() -> Self {
        Self::new()
    }
}
