//! ActuatorController - Servo Arm Signal and Drive Loop
//!
//! ## Responsibilities
//!
//! - Arm / disarm / toggle the periodic actuation
//! - Own the single drive task that writes commands to the serial port
//! - Mirror the arm signal into `servo_armed`
//!
//! The arm signal is a `watch` channel. The drive task sleeps on it while
//! disarmed and is the only writer of the display flag.

use crate::sensor_state::{SensorStateStore, StateField};
use crate::serial_link::ActuatorPort;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Drive loop settings
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Bytes written on every tick
    pub command: Vec<u8>,
    /// Time between commands while armed
    pub interval: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            command: b"servo\n".to_vec(),
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Disarmed,
    Armed,
}

impl ActuatorState {
    fn from_signal(armed: bool) -> Self {
        if armed {
            ActuatorState::Armed
        } else {
            ActuatorState::Disarmed
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorState::Armed => write!(f, "Servo ON"),
            ActuatorState::Disarmed => write!(f, "Servo OFF"),
        }
    }
}

pub struct ActuatorController {
    signal: Arc<watch::Sender<bool>>,
}

impl ActuatorController {
    /// Create the controller and spawn its drive task. Must be called from
    /// within a tokio runtime.
    pub fn new(
        store: Arc<SensorStateStore>,
        port: Arc<dyn ActuatorPort>,
        config: ActuatorConfig,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        let signal = Arc::new(tx);

        tokio::spawn(drive(signal.clone(), rx, store, port, config));

        Self { signal }
    }

    pub fn arm(&self) -> ActuatorState {
        self.set(true)
    }

    pub fn disarm(&self) -> ActuatorState {
        self.set(false)
    }

    pub fn toggle(&self) -> ActuatorState {
        let mut armed = false;
        self.signal.send_modify(|value| {
            *value = !*value;
            armed = *value;
        });
        tracing::info!(armed, "Actuator toggled");
        ActuatorState::from_signal(armed)
    }

    pub fn state(&self) -> ActuatorState {
        ActuatorState::from_signal(*self.signal.borrow())
    }

    fn set(&self, armed: bool) -> ActuatorState {
        let changed = self.signal.send_if_modified(|value| {
            if *value == armed {
                return false;
            }
            *value = armed;
            true
        });
        if changed {
            tracing::info!(armed, "Actuator signal changed");
        }
        ActuatorState::from_signal(armed)
    }
}

/// Drive task body. Lives for the process.
async fn drive(
    signal: Arc<watch::Sender<bool>>,
    mut rx: watch::Receiver<bool>,
    store: Arc<SensorStateStore>,
    port: Arc<dyn ActuatorPort>,
    config: ActuatorConfig,
) {
    loop {
        let armed = *rx.borrow_and_update();
        store.write(StateField::ServoArmed(armed));

        if !armed {
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        // First command one interval after arming
        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = port.send(&config.command).await {
                        tracing::warn!(error = %e, "Actuator write failed, disarming");
                        signal.send_replace(false);
                        break;
                    }
                    tracing::debug!("Actuator command sent");
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPort {
        sent: Mutex<Vec<(Instant, Vec<u8>)>>,
    }

    impl RecordingPort {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ActuatorPort for RecordingPort {
        async fn send(&self, command: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((Instant::now(), command.to_vec()));
            Ok(())
        }
    }

    struct BrokenPort;

    #[async_trait]
    impl ActuatorPort for BrokenPort {
        async fn send(&self, _command: &[u8]) -> Result<()> {
            Err(Error::Serial("write failed".to_string()))
        }
    }

    fn controller(port: Arc<dyn ActuatorPort>) -> (ActuatorController, Arc<SensorStateStore>) {
        let store = Arc::new(SensorStateStore::new());
        let controller = ActuatorController::new(store.clone(), port, ActuatorConfig::default());
        (controller, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_duration_yields_floor_commands() {
        let port = Arc::new(RecordingPort::default());
        let (ctl, _store) = controller(port.clone());

        let armed_at = Instant::now();
        ctl.arm();
        tokio::time::sleep(Duration::from_secs(5)).await;
        ctl.disarm();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let sent = port.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, b"servo\n".to_vec());
        assert_eq!(sent[0].0 - armed_at, Duration::from_secs(2));
        assert_eq!(sent[1].0 - armed_at, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_before_first_tick_sends_nothing() {
        let port = Arc::new(RecordingPort::default());
        let (ctl, _store) = controller(port.clone());

        ctl.arm();
        tokio::time::sleep(Duration::from_millis(500)).await;
        ctl.disarm();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(port.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_never_doubles_the_rate() {
        let port = Arc::new(RecordingPort::default());
        let (ctl, _store) = controller(port.clone());

        for _ in 0..3 {
            ctl.arm();
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctl.disarm();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        ctl.arm();
        ctl.arm();
        tokio::time::sleep(Duration::from_millis(4500)).await;

        assert_eq!(port.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_display_flag() {
        let port = Arc::new(RecordingPort::default());
        let (ctl, store) = controller(port);

        assert_eq!(ctl.state(), ActuatorState::Disarmed);
        assert_eq!(ctl.toggle(), ActuatorState::Armed);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.read().servo_armed);

        assert_eq!(ctl.toggle(), ActuatorState::Disarmed);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!store.read().servo_armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_disarms() {
        let (ctl, store) = controller(Arc::new(BrokenPort));

        ctl.arm();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(ctl.state(), ActuatorState::Disarmed);
        assert!(!store.read().servo_armed);
    }

    #[test]
    fn test_state_text() {
        assert_eq!(ActuatorState::Armed.to_string(), "Servo ON");
        assert_eq!(ActuatorState::Disarmed.to_string(), "Servo OFF");
    }
}
