//! FaceDirectionProducer - camera frame → face offset → `baby_direction`
//!
//! Also owns `camera_error`, and it publishes every frame it reads to the
//! video relay.

use super::{FailureClass, ProducerExit};
use crate::camera_capture::{probe_camera, CameraOpener, FrameSource};
use crate::error::with_deadline;
use crate::frame_relay::FrameRelay;
use crate::inference_client::FaceLocator;
use crate::sensor_state::{BabyDirection, SensorStateStore, StateField};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

const PRODUCER: &str = "face_direction";

/// Which side a negative offset maps to.
///
/// The camera image is not mirrored, so by default a nose left of the eye
/// midpoint in the image means the baby turned to its right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignConvention {
    #[default]
    NegativeIsRight,
    NegativeIsLeft,
}

impl SignConvention {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "negative_is_right" => Some(SignConvention::NegativeIsRight),
            "negative_is_left" => Some(SignConvention::NegativeIsLeft),
            _ => None,
        }
    }
}

/// Three-way direction from a horizontal face offset
pub fn classify_offset(offset: Option<f32>, threshold: f32, sign: SignConvention) -> BabyDirection {
    let Some(dx) = offset else {
        return BabyDirection::NotDetected;
    };
    if dx.abs() < threshold {
        return BabyDirection::Center;
    }
    match (dx < 0.0, sign) {
        (true, SignConvention::NegativeIsRight) | (false, SignConvention::NegativeIsLeft) => {
            BabyDirection::Right
        }
        _ => BabyDirection::Left,
    }
}

/// FaceDirectionProducer settings
#[derive(Debug, Clone)]
pub struct FaceProducerConfig {
    /// |dx| below this is centered
    pub threshold: f32,
    pub sign: SignConvention,
    /// Device indices probed on (re)acquisition
    pub camera_indices: Range<u32>,
    /// Pause between frames
    pub frame_interval: Duration,
    pub capture_timeout: Duration,
    pub locate_timeout: Duration,
    /// Bound per probed index
    pub probe_timeout: Duration,
}

impl Default for FaceProducerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            sign: SignConvention::default(),
            camera_indices: 1..5,
            frame_interval: Duration::from_millis(200),
            capture_timeout: Duration::from_secs(5),
            locate_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

pub struct FaceDirectionProducer {
    store: Arc<SensorStateStore>,
    opener: Arc<dyn CameraOpener>,
    locator: Arc<dyn FaceLocator>,
    relay: Arc<FrameRelay>,
    config: FaceProducerConfig,
}

impl FaceDirectionProducer {
    pub fn new(
        store: Arc<SensorStateStore>,
        opener: Arc<dyn CameraOpener>,
        locator: Arc<dyn FaceLocator>,
        relay: Arc<FrameRelay>,
        config: FaceProducerConfig,
    ) -> Self {
        Self {
            store,
            opener,
            locator,
            relay,
            config,
        }
    }

    /// Runs until the camera is lost and no index in the range answers.
    pub async fn run(self) -> ProducerExit {
        let mut camera = match self.acquire().await {
            Some(camera) => camera,
            None => return self.fail_terminal("no working camera at startup"),
        };

        loop {
            match with_deadline(self.config.capture_timeout, camera.capture_frame()).await {
                Ok(frame) => {
                    self.relay.publish(frame.clone());
                    match with_deadline(self.config.locate_timeout, self.locator.locate(&frame)).await {
                        Ok(offset) => {
                            let direction =
                                classify_offset(offset, self.config.threshold, self.config.sign);
                            self.store.write(StateField::BabyDirection(direction));
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                class = FailureClass::Transient.as_str(),
                                "Face offset detection failed, keeping last direction"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        device = %camera.describe(),
                        error = %e,
                        "Frame capture failed, reacquiring camera"
                    );
                    self.store.write(StateField::CameraError(true));
                    self.store.write(StateField::BabyDirection(BabyDirection::Error));

                    match self.acquire().await {
                        Some(replacement) => {
                            camera = replacement;
                            self.store.write(StateField::CameraError(false));
                        }
                        None => return self.fail_terminal(format!("camera lost: {}", e)),
                    }
                }
            }

            tokio::time::sleep(self.config.frame_interval).await;
        }
    }

    async fn acquire(&self) -> Option<Arc<dyn FrameSource>> {
        probe_camera(
            self.opener.as_ref(),
            self.config.camera_indices.clone(),
            self.config.probe_timeout,
        )
        .await
        .map(|(_, camera)| camera)
    }

    fn fail_terminal(&self, reason: impl Into<String>) -> ProducerExit {
        let reason = reason.into();
        self.store.write(StateField::CameraError(true));
        self.store.write(StateField::BabyDirection(BabyDirection::Error));
        tracing::error!(
            range = ?self.config.camera_indices,
            class = FailureClass::Terminal.as_str(),
            reason = %reason,
            "No usable camera"
        );
        ProducerExit::terminal(PRODUCER, reason)
    }
}
