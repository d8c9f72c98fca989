//! CameraCapture - USB Camera Frames via ffmpeg
//!
//! ## Responsibilities
//!
//! - Single-frame JPEG capture from a V4L2 device (ffmpeg, no OpenCV binding)
//! - Camera discovery by probing a range of device indices
//!
//! Each capture spawns ffmpeg with `kill_on_drop`, so dropping the future
//! on timeout also kills the process.

use crate::error::{with_deadline, Error, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use std::ops::Range;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// One JPEG-encoded camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Bytes,
}

/// An opened camera
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture_frame(&self) -> Result<Frame>;

    /// Human-readable device name for logs
    fn describe(&self) -> String;
}

/// Opens a camera by device index
#[async_trait]
pub trait CameraOpener: Send + Sync {
    async fn open(&self, index: u32) -> Result<Arc<dyn FrameSource>>;
}

/// Find the first index in `indices` whose camera opens and yields a frame.
///
/// Each index gets at most `per_index_timeout`. Returns `None` when the
/// whole range is exhausted.
pub async fn probe_camera(
    opener: &dyn CameraOpener,
    indices: Range<u32>,
    per_index_timeout: Duration,
) -> Option<(u32, Arc<dyn FrameSource>)> {
    for index in indices {
        let attempt = with_deadline(per_index_timeout, async {
            let source = opener.open(index).await?;
            source.capture_frame().await?;
            Ok(source)
        })
        .await;

        match attempt {
            Ok(source) => {
                tracing::info!(index = index, device = %source.describe(), "Camera working");
                return Some((index, source));
            }
            Err(e) => {
                tracing::debug!(index = index, error = %e, "Camera probe failed");
            }
        }
    }
    None
}

/// V4L2 device read through ffmpeg
pub struct V4l2Camera {
    device: PathBuf,
}

impl V4l2Camera {
    pub fn new(device: PathBuf) -> Self {
        Self { device }
    }
}

#[async_trait]
impl FrameSource for V4l2Camera {
    async fn capture_frame(&self) -> Result<Frame> {
        // -frames:v 1: Capture only 1 frame
        // -f image2pipe -vcodec mjpeg: Output as MJPEG to pipe
        let child = Command::new("ffmpeg")
            .args(["-f", "v4l2", "-i"])
            .arg(&self.device)
            .args([
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-loglevel", "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Camera(format!("ffmpeg spawn failed: {}", e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Camera(format!("ffmpeg execution failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Camera(format!("ffmpeg failed: {}", stderr.trim())));
        }

        if output.stdout.is_empty() {
            return Err(Error::Camera("ffmpeg returned empty output".to_string()));
        }

        Ok(Frame {
            jpeg: Bytes::from(output.stdout),
        })
    }

    fn describe(&self) -> String {
        self.device.display().to_string()
    }
}

/// Opens `/dev/video{index}`
pub struct V4l2Opener {
    device_prefix: String,
}

impl V4l2Opener {
    pub fn new() -> Self {
        Self {
            device_prefix: "/dev/video".to_string(),
        }
    }

    fn device_path(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}{}", self.device_prefix, index))
    }
}

impl Default for V4l2Opener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraOpener for V4l2Opener {
    async fn open(&self, index: u32) -> Result<Arc<dyn FrameSource>> {
        let device = self.device_path(index);
        if tokio::fs::metadata(&device).await.is_err() {
            return Err(Error::Camera(format!("{} not present", device.display())));
        }
        Ok(Arc::new(V4l2Camera::new(device)))
    }
}
