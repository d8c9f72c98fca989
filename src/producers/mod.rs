//! Sensor producers
//!
//! Each producer is a long-running task that owns exactly one field group of
//! the shared state: acquire a sample, transform it through its collaborator,
//! write the result, wait. Producers never share a field and never hold the
//! store guard across device work.
//!
//! Failures are classified per stage:
//!
//! | Class      | Policy                                      |
//! |------------|---------------------------------------------|
//! | Transient  | log, keep the prior value, next iteration   |
//! | Cooldown   | write the error marker, back off, retry     |
//! | Terminal   | set the error flag, stop this producer      |

pub mod cry;
pub mod face;
pub mod temperature;

pub use cry::{CryProducer, CryProducerConfig};
pub use face::{classify_offset, FaceDirectionProducer, FaceProducerConfig, SignConvention};
pub use temperature::{parse_temperature_line, LineParse, TemperatureProducer, TemperatureProducerConfig};

use std::future::Future;
use tokio::task::JoinHandle;

/// Failure handling class of one producer stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Cooldown,
    Terminal,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Cooldown => "cooldown",
            FailureClass::Terminal => "terminal",
        }
    }
}

/// Why a producer task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerExit {
    pub producer: &'static str,
    pub reason: String,
}

impl ProducerExit {
    pub fn terminal(producer: &'static str, reason: impl Into<String>) -> Self {
        Self {
            producer,
            reason: reason.into(),
        }
    }
}

/// Spawn a producer loop and log its exit.
///
/// Terminal producers are not restarted; the error flag they leave behind
/// is the signal to the operator.
pub fn spawn_producer<F>(name: &'static str, run: F) -> JoinHandle<ProducerExit>
where
    F: Future<Output = ProducerExit> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(producer = name, "Producer started");
        let exit = run.await;
        tracing::error!(
            producer = exit.producer,
            reason = %exit.reason,
            "Producer stopped"
        );
        exit
    })
}
