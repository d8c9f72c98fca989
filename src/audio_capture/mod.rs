//! AudioCapture - Fixed-Window Microphone Recording
//!
//! ## Responsibilities
//!
//! - Record one fixed-duration mono window from an ALSA device
//! - Hand the WAV bytes to the cry classifier untouched
//!
//! Recording runs in an `arecord` child process. The process is killed when
//! the capture future is dropped, so a caller-side timeout never leaks it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Recorded audio window (WAV container)
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration: Duration,
}

/// Source of fixed-duration audio windows
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn capture_window(&self) -> Result<AudioClip>;
}

/// Audio capture settings
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA device name
    pub device: String,
    /// Input sample rate (Hz)
    pub sample_rate: u32,
    /// Window length
    pub window: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "plughw:2,0".to_string(),
            sample_rate: 44_100,
            window: Duration::from_secs(2),
        }
    }
}

/// `arecord`-backed audio source
pub struct ArecordSource {
    config: AudioConfig,
}

impl ArecordSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn args(&self) -> Vec<String> {
        let seconds = self.config.window.as_secs().max(1);
        vec![
            "-D".to_string(),
            self.config.device.clone(),
            "-f".to_string(),
            "FLOAT_LE".to_string(),
            "-r".to_string(),
            self.config.sample_rate.to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-d".to_string(),
            seconds.to_string(),
            "-t".to_string(),
            "wav".to_string(),
            "-q".to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl AudioSource for ArecordSource {
    async fn capture_window(&self) -> Result<AudioClip> {
        let child = Command::new("arecord")
            .args(self.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::AudioCapture(format!("arecord spawn failed: {}", e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::AudioCapture(format!("arecord execution failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::AudioCapture(format!("arecord failed: {}", stderr.trim())));
        }

        // A bare WAV header is 44 bytes; anything that short carries no samples
        if output.stdout.len() <= 44 {
            return Err(Error::AudioCapture("arecord returned no samples".to_string()));
        }

        tracing::trace!(
            device = %self.config.device,
            bytes = output.stdout.len(),
            "Audio window captured"
        );

        Ok(AudioClip {
            wav: output.stdout,
            sample_rate: self.config.sample_rate,
            duration: self.config.window,
        })
    }
}
