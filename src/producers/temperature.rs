//! TemperatureProducer - serial lines → `temperature`
//!
//! Owns the read half of the serial connection and the `serial_error` flag.

use super::{FailureClass, ProducerExit};
use crate::error::with_deadline;
use crate::sensor_state::{SensorStateStore, StateField, TemperatureReading};
use crate::serial_link::SerialLineReader;
use std::sync::Arc;
use std::time::Duration;

const PRODUCER: &str = "temperature";

/// Result of inspecting one serial line
#[derive(Debug, Clone, PartialEq)]
pub enum LineParse {
    /// Marker present, payload is a valid temperature
    Reading(f32),
    /// Marker present, payload unusable
    Malformed(String),
    /// Line does not carry a temperature
    Unrelated,
}

/// Extract the temperature that follows `marker`, e.g. `"baby temp: 36.5C"`.
pub fn parse_temperature_line(line: &str, marker: &str) -> LineParse {
    let Some(pos) = line.find(marker) else {
        return LineParse::Unrelated;
    };
    let payload = line[pos + marker.len()..].trim();
    let number = payload
        .strip_suffix("°C")
        .or_else(|| payload.strip_suffix('℃'))
        .or_else(|| payload.strip_suffix('C'))
        .unwrap_or(payload)
        .trim();

    match number.parse::<f32>() {
        Ok(value) if value.is_finite() => LineParse::Reading(value),
        _ => LineParse::Malformed(payload.to_string()),
    }
}

/// TemperatureProducer settings
#[derive(Debug, Clone)]
pub struct TemperatureProducerConfig {
    /// Text preceding the numeric payload
    pub marker: String,
    /// Silence longer than this is treated as a lost connection
    pub read_timeout: Duration,
}

impl Default for TemperatureProducerConfig {
    fn default() -> Self {
        Self {
            marker: "baby temp:".to_string(),
            read_timeout: Duration::from_secs(60),
        }
    }
}

pub struct TemperatureProducer {
    store: Arc<SensorStateStore>,
    reader: Box<dyn SerialLineReader>,
    config: TemperatureProducerConfig,
}

impl TemperatureProducer {
    pub fn new(
        store: Arc<SensorStateStore>,
        reader: Box<dyn SerialLineReader>,
        config: TemperatureProducerConfig,
    ) -> Self {
        Self {
            store,
            reader,
            config,
        }
    }

    /// Record a connect failure that happened before the producer could start.
    pub fn mark_unconnected(store: &SensorStateStore) {
        store.write(StateField::SerialError(true));
        store.write(StateField::Temperature(TemperatureReading::Error));
    }

    /// Runs until the serial connection fails. Not retried.
    pub async fn run(mut self) -> ProducerExit {
        loop {
            let line = match with_deadline(self.config.read_timeout, self.reader.read_line()).await {
                Ok(Some(line)) => line,
                Ok(None) => return self.fail_terminal("serial stream closed".to_string()),
                Err(e) => return self.fail_terminal(e.to_string()),
            };
            self.handle_line(&line);
        }
    }

    fn handle_line(&self, line: &str) {
        match parse_temperature_line(line, &self.config.marker) {
            LineParse::Reading(value) => {
                self.store
                    .write(StateField::Temperature(TemperatureReading::Celsius(value)));
                tracing::debug!(celsius = f64::from(value), "Temperature updated");
            }
            LineParse::Malformed(payload) => {
                tracing::warn!(
                    payload = %payload,
                    class = FailureClass::Transient.as_str(),
                    "Invalid temperature value, line ignored"
                );
            }
            LineParse::Unrelated => {
                tracing::debug!(line = %line, "Serial line");
            }
        }
    }

    fn fail_terminal(&self, reason: String) -> ProducerExit {
        self.store.write(StateField::SerialError(true));
        tracing::error!(
            class = FailureClass::Terminal.as_str(),
            reason = %reason,
            "Serial connection lost"
        );
        ProducerExit::terminal(PRODUCER, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    enum Scripted {
        Line(&'static str),
        Fail,
        Hang,
    }

    /// Replays a script, then reports end of stream
    struct ScriptedReader {
        script: VecDeque<Scripted>,
    }

    impl ScriptedReader {
        fn boxed(script: Vec<Scripted>) -> Box<dyn SerialLineReader> {
            Box::new(Self {
                script: script.into(),
            })
        }
    }

    #[async_trait]
    impl SerialLineReader for ScriptedReader {
        async fn read_line(&mut self) -> Result<Option<String>> {
            match self.script.pop_front() {
                Some(Scripted::Line(line)) => Ok(Some(line.to_string())),
                Some(Scripted::Fail) => Err(Error::Serial("device reset".to_string())),
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(None)
                }
                None => Ok(None),
            }
        }
    }

    #[test]
    fn test_parse_scenarios() {
        let marker = "baby temp:";
        assert_eq!(parse_temperature_line("baby temp: 36.5C", marker), LineParse::Reading(36.5));
        assert_eq!(
            parse_temperature_line("baby temp: not-a-number", marker),
            LineParse::Malformed("not-a-number".to_string())
        );
        assert_eq!(parse_temperature_line("ambient 22.0", marker), LineParse::Unrelated);
    }

    #[test]
    fn test_parse_suffix_variants() {
        let marker = "baby temp:";
        assert_eq!(parse_temperature_line("baby temp: 37.1°C", marker), LineParse::Reading(37.1));
        assert_eq!(parse_temperature_line("baby temp:36", marker), LineParse::Reading(36.0));
        assert_eq!(parse_temperature_line(">> baby temp: 35.9 C", marker), LineParse::Reading(35.9));
        assert!(matches!(parse_temperature_line("baby temp: NaN", marker), LineParse::Malformed(_)));
        assert!(matches!(parse_temperature_line("baby temp:", marker), LineParse::Malformed(_)));
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_value_and_loop_continues() {
        let store = Arc::new(SensorStateStore::new());
        let reader = ScriptedReader::boxed(vec![
            Scripted::Line("baby temp: 36.5C"),
            Scripted::Line("baby temp: not-a-number"),
            Scripted::Line("servo ok"),
        ]);
        let mut producer = TemperatureProducer::new(store.clone(), reader, Default::default());

        // Drive line by line to observe the field after the bad line
        for _ in 0..2 {
            let line = producer.reader.read_line().await.unwrap().unwrap();
            producer.handle_line(&line);
        }
        assert_eq!(store.read().temperature, TemperatureReading::Celsius(36.5));
        assert!(!store.read().serial_error);

        let exit = producer.run().await;
        assert_eq!(exit.reason, "serial stream closed");
        assert_eq!(store.read().temperature, TemperatureReading::Celsius(36.5));
    }

    #[tokio::test]
    async fn test_read_error_is_terminal() {
        let store = Arc::new(SensorStateStore::new());
        let reader = ScriptedReader::boxed(vec![
            Scripted::Line("baby temp: 36.8C"),
            Scripted::Fail,
            Scripted::Line("baby temp: 40.0C"),
        ]);
        let exit = TemperatureProducer::new(store.clone(), reader, Default::default())
            .run()
            .await;

        assert_eq!(exit.producer, "temperature");
        let snap = store.read();
        assert!(snap.serial_error);
        // The line after the failure is never consumed
        assert_eq!(snap.temperature, TemperatureReading::Celsius(36.8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let store = Arc::new(SensorStateStore::new());
        let reader = ScriptedReader::boxed(vec![Scripted::Hang]);
        let exit = TemperatureProducer::new(store.clone(), reader, Default::default())
            .run()
            .await;
        assert!(exit.reason.contains("Timed out"));
        assert!(store.read().serial_error);
    }

    #[test]
    fn test_mark_unconnected() {
        let store = SensorStateStore::new();
        TemperatureProducer::mark_unconnected(&store);
        let snap = store.read();
        assert!(snap.serial_error);
        assert_eq!(snap.temperature, TemperatureReading::Error);
    }
}
