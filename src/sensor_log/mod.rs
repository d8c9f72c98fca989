//! SensorLog - Periodic Snapshot History
//!
//! ## Responsibilities
//!
//! - `SensorLogEntry` record type (append-only)
//! - Repository trait used by the snapshotter and the history API
//! - MySQL (`repository`) and in-memory implementations

mod repository;

pub use repository::MySqlSensorLogRepository;

use crate::error::Result;
use crate::sensor_state::{BabyDirection, CryingStatus, SensorSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// One persisted snapshot row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorLogEntry {
    pub recorded_at: DateTime<Utc>,
    /// `None` when the field held the error marker
    pub temperature: Option<f32>,
    pub crying_status: CryingStatus,
    pub baby_direction: BabyDirection,
}

impl SensorLogEntry {
    pub fn from_snapshot(snapshot: &SensorSnapshot, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            temperature: snapshot.temperature.celsius(),
            crying_status: snapshot.crying_status,
            baby_direction: snapshot.baby_direction,
        }
    }
}

#[async_trait]
pub trait SensorLogRepository: Send + Sync {
    async fn persist(&self, entry: &SensorLogEntry) -> Result<()>;

    /// Most recent `limit` entries, newest first
    async fn query_recent(&self, limit: u32) -> Result<Vec<SensorLogEntry>>;
}

/// Process-local repository used when no database is configured
#[derive(Default)]
pub struct MemorySensorLogRepository {
    entries: Mutex<Vec<SensorLogEntry>>,
}

impl MemorySensorLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SensorLogRepository for MemorySensorLogRepository {
    async fn persist(&self, entry: &SensorLogEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push(entry.clone());
        Ok(())
    }

    async fn query_recent(&self, limit: u32) -> Result<Vec<SensorLogEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        // Equal timestamps: later insert first
        let mut sorted: Vec<SensorLogEntry> = entries.clone();
        sorted.sort_by_key(|e| e.recorded_at);
        sorted.reverse();
        sorted.truncate(limit as usize);
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_state::TemperatureReading;
    use chrono::TimeZone;

    fn entry(minute: u32, temperature: Option<f32>) -> SensorLogEntry {
        SensorLogEntry {
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            temperature,
            crying_status: CryingStatus::Silent,
            baby_direction: BabyDirection::Center,
        }
    }

    #[test]
    fn test_entry_from_snapshot_maps_error_marker_to_none() {
        let snapshot = SensorSnapshot {
            temperature: TemperatureReading::Error,
            crying_status: CryingStatus::Crying,
            baby_direction: BabyDirection::Left,
            ..Default::default()
        };
        let entry = SensorLogEntry::from_snapshot(&snapshot, Utc::now());
        assert_eq!(entry.temperature, None);
        assert_eq!(entry.crying_status, CryingStatus::Crying);

        let snapshot = SensorSnapshot {
            temperature: TemperatureReading::Celsius(36.6),
            ..snapshot
        };
        assert_eq!(SensorLogEntry::from_snapshot(&snapshot, Utc::now()).temperature, Some(36.6));
    }

    #[tokio::test]
    async fn test_query_recent_newest_first_and_bounded() {
        let repo = MemorySensorLogRepository::new();
        // Inserted out of order
        for minute in [3, 1, 4, 0, 2] {
            repo.persist(&entry(minute, Some(36.0 + minute as f32))).await.unwrap();
        }

        let recent = repo.query_recent(3).await.unwrap();
        let minutes: Vec<u32> = recent
            .iter()
            .map(|e| chrono::Timelike::minute(&e.recorded_at))
            .collect();
        assert_eq!(minutes, vec![4, 3, 2]);

        // Fewer entries than requested
        assert_eq!(repo.query_recent(50).await.unwrap().len(), 5);
        assert!(repo.query_recent(0).await.unwrap().is_empty());
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(entry(5, None)).unwrap();
        assert_eq!(json["temperature"], serde_json::Value::Null);
        assert_eq!(json["crying_status"], "silent");
        assert_eq!(json["baby_direction"], "center");
    }
}
