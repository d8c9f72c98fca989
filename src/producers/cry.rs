//! CryProducer - audio window → cry classification → `crying_status`

use super::{FailureClass, ProducerExit};
use crate::audio_capture::AudioSource;
use crate::error::{with_deadline, Error, Result};
use crate::inference_client::{CryClassifier, CryLabel, CryVerdict};
use crate::sensor_state::{CryingStatus, SensorStateStore, StateField};
use std::sync::Arc;
use std::time::Duration;

/// CryProducer settings
#[derive(Debug, Clone)]
pub struct CryProducerConfig {
    /// Pause after a successful classification
    pub cadence: Duration,
    /// Pause after a failed capture or classification
    pub cooldown: Duration,
    /// Bound on one capture (covers the recording window itself)
    pub capture_timeout: Duration,
    /// Bound on one classification request
    pub classify_timeout: Duration,
}

impl Default for CryProducerConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(1),
            cooldown: Duration::from_secs(10),
            capture_timeout: Duration::from_secs(8),
            classify_timeout: Duration::from_secs(10),
        }
    }
}

impl CryProducerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cooldown <= self.cadence {
            return Err(Error::Config(format!(
                "cry cooldown ({:?}) must be longer than cadence ({:?})",
                self.cooldown, self.cadence
            )));
        }
        Ok(())
    }
}

pub struct CryProducer {
    store: Arc<SensorStateStore>,
    audio: Arc<dyn AudioSource>,
    classifier: Arc<dyn CryClassifier>,
    config: CryProducerConfig,
}

impl CryProducer {
    pub fn new(
        store: Arc<SensorStateStore>,
        audio: Arc<dyn AudioSource>,
        classifier: Arc<dyn CryClassifier>,
        config: CryProducerConfig,
    ) -> Self {
        Self {
            store,
            audio,
            classifier,
            config,
        }
    }

    /// Runs for the process lifetime; capture failures back off and retry.
    pub async fn run(self) -> ProducerExit {
        loop {
            let pause = self.step().await;
            tokio::time::sleep(pause).await;
        }
    }

    /// One iteration. Returns how long to wait before the next one.
    async fn step(&self) -> Duration {
        match self.sample().await {
            Ok(verdict) => {
                let status = match verdict.label {
                    CryLabel::Crying => CryingStatus::Crying,
                    CryLabel::Silent => CryingStatus::Silent,
                };
                let previous = self.store.read().crying_status;
                self.store.write(StateField::CryingStatus(status));

                if previous != status {
                    tracing::info!(
                        status = status.as_str(),
                        probability = f64::from(verdict.probability),
                        "Crying status changed"
                    );
                } else {
                    tracing::debug!(
                        status = status.as_str(),
                        probability = f64::from(verdict.probability),
                        "Cry classified"
                    );
                }
                self.config.cadence
            }
            Err(e) => {
                self.store.write(StateField::CryingStatus(CryingStatus::Error));
                tracing::warn!(
                    error = %e,
                    class = FailureClass::Cooldown.as_str(),
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    "Cry detection failed, backing off"
                );
                self.config.cooldown
            }
        }
    }

    async fn sample(&self) -> Result<CryVerdict> {
        let clip = with_deadline(self.config.capture_timeout, self.audio.capture_window()).await?;
        with_deadline(self.config.classify_timeout, self.classifier.classify(&clip)).await
    }
}
