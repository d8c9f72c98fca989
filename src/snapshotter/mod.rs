//! StateSnapshotter - periodic history writer
//!
//! Reads the store once per interval and appends a `SensorLogEntry` once
//! every sensor field has reported at least once.

use crate::error::Result;
use crate::sensor_log::{SensorLogEntry, SensorLogRepository};
use crate::sensor_state::SensorStateStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub struct StateSnapshotter {
    store: Arc<SensorStateStore>,
    repo: Arc<dyn SensorLogRepository>,
    interval: Duration,
}

impl StateSnapshotter {
    pub fn new(
        store: Arc<SensorStateStore>,
        repo: Arc<dyn SensorLogRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            repo,
            interval,
        }
    }

    /// Runs for the process lifetime. The first tick fires one interval
    /// after start.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "State snapshotter started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                // Dropped, next interval tries again with fresh values
                tracing::error!(error = %e, "Failed to persist sensor snapshot");
            }
        }
    }

    /// One snapshot attempt. Returns whether an entry was written.
    pub async fn tick(&self) -> Result<bool> {
        let snapshot = self.store.read();
        if !snapshot.is_warmed_up() {
            tracing::debug!(
                crying_status = snapshot.crying_status.as_str(),
                baby_direction = snapshot.baby_direction.as_str(),
                temperature = %snapshot.temperature,
                "Sensors still warming up, snapshot skipped"
            );
            return Ok(false);
        }

        let entry = SensorLogEntry::from_snapshot(&snapshot, Utc::now());
        self.repo.persist(&entry).await?;
        tracing::debug!(recorded_at = %entry.recorded_at, "Sensor snapshot persisted");
        Ok(true)
    }
}
