//! FrameRelay - latest camera frame for the video feed
//!
//! The face producer publishes every frame it reads; video subscribers see
//! the newest one. Frame bytes are passed through unmodified.

use crate::camera_capture::Frame;
use tokio::sync::watch;

pub struct FrameRelay {
    tx: watch::Sender<Option<Frame>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the latest frame
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }

    /// Receiver that wakes on every published frame
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}
