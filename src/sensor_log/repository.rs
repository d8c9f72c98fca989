//! MySQL persistence for `sensor_logs`

use super::{SensorLogEntry, SensorLogRepository};
use crate::error::{Error, Result};
use crate::sensor_state::{BabyDirection, CryingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

pub struct MySqlSensorLogRepository {
    pool: MySqlPool,
}

impl MySqlSensorLogRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the table if missing. No migrations beyond this.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_logs (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                recorded_at DATETIME(3) NOT NULL,
                temperature DOUBLE NULL,
                crying_status VARCHAR(16) NOT NULL,
                baby_direction VARCHAR(16) NOT NULL,
                INDEX idx_sensor_logs_recorded_at (recorded_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_entry(row: MySqlRow) -> Result<SensorLogEntry> {
        let crying: String = row.try_get("crying_status")?;
        let direction: String = row.try_get("baby_direction")?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
        let temperature: Option<f64> = row.try_get("temperature")?;

        Ok(SensorLogEntry {
            recorded_at,
            temperature: temperature.map(|t| t as f32),
            crying_status: CryingStatus::parse(&crying)
                .ok_or_else(|| Error::Storage(format!("unknown crying_status '{}'", crying)))?,
            baby_direction: BabyDirection::parse(&direction)
                .ok_or_else(|| Error::Storage(format!("unknown baby_direction '{}'", direction)))?,
        })
    }
}

#[async_trait]
impl SensorLogRepository for MySqlSensorLogRepository {
    async fn persist(&self, entry: &SensorLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sensor_logs (recorded_at, temperature, crying_status, baby_direction)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.recorded_at)
        .bind(entry.temperature.map(f64::from))
        .bind(entry.crying_status.as_str())
        .bind(entry.baby_direction.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_recent(&self, limit: u32) -> Result<Vec<SensorLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT recorded_at, temperature, crying_status, baby_direction
            FROM sensor_logs
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
