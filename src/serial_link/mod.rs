//! SerialLink - Temperature / Servo Board Connection
//!
//! ## Responsibilities
//!
//! - Open and configure the serial line (`stty`, then the tty device)
//! - Line-oriented reads for the temperature producer
//! - Serialized command writes for the actuator
//!
//! One physical connection is split into a read half (owned by exactly one
//! task) and a shared write half.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Serial settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: PathBuf,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/ttyACM0"),
            baud: 9600,
        }
    }
}

/// Read half: one text line at a time
#[async_trait]
pub trait SerialLineReader: Send {
    /// Next line without the terminator, `None` at end of stream
    async fn read_line(&mut self) -> Result<Option<String>>;
}

/// Write half: actuation commands
#[async_trait]
pub trait ActuatorPort: Send + Sync {
    async fn send(&self, command: &[u8]) -> Result<()>;
}

/// An open serial connection
pub struct SerialConnection {
    pub reader: Box<dyn SerialLineReader>,
    pub writer: Arc<dyn ActuatorPort>,
}

/// Opens serial connections
#[async_trait]
pub trait SerialConnector: Send + Sync {
    async fn connect(&self, config: &SerialConfig) -> Result<SerialConnection>;
}

/// Port used when the serial connection could not be opened.
/// Every send fails, which makes the actuator disarm itself.
pub struct UnavailablePort;

#[async_trait]
impl ActuatorPort for UnavailablePort {
    async fn send(&self, _command: &[u8]) -> Result<()> {
        Err(Error::Serial("serial device not connected".to_string()))
    }
}

/// tty-device connector
pub struct TtyConnector;

impl TtyConnector {
    async fn configure_line(config: &SerialConfig) -> Result<()> {
        let output = Command::new("stty")
            .arg("-F")
            .arg(&config.port)
            .args([config.baud.to_string().as_str(), "raw", "-echo"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Serial(format!("stty spawn failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Serial(format!("stty failed: {}", stderr.trim())));
        }
        Ok(())
    }
}

#[async_trait]
impl SerialConnector for TtyConnector {
    async fn connect(&self, config: &SerialConfig) -> Result<SerialConnection> {
        Self::configure_line(config).await?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.port)
            .await
            .map_err(|e| Error::Serial(format!("open {} failed: {}", config.port.display(), e)))?;
        let write_half = file
            .try_clone()
            .await
            .map_err(|e| Error::Serial(format!("clone handle failed: {}", e)))?;

        tracing::info!(
            port = %config.port.display(),
            baud = config.baud,
            "Serial connection opened"
        );

        Ok(SerialConnection {
            reader: Box::new(LineReader::new(file)),
            writer: Arc::new(TtyWriter {
                file: Mutex::new(write_half),
            }),
        })
    }
}

/// Longest line accepted, terminator included
pub const MAX_LINE: usize = 256;

/// Buffered line reader over any async byte source
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: tokio::io::AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::with_capacity(128),
        }
    }

    /// Discard input up to and including the next newline
    async fn skip_line(&mut self) -> Result<usize> {
        let mut dropped = 0;
        loop {
            let available = self
                .inner
                .fill_buf()
                .await
                .map_err(|e| Error::Serial(format!("read failed: {}", e)))?;
            if available.is_empty() {
                return Ok(dropped);
            }
            let (len, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            self.inner.consume(len);
            dropped += len;
            if done {
                return Ok(dropped);
            }
        }
    }
}

#[async_trait]
impl<R: tokio::io::AsyncRead + Unpin + Send> SerialLineReader for LineReader<R> {
    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            self.buf.clear();
            let n = (&mut self.inner)
                .take(MAX_LINE as u64)
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| Error::Serial(format!("read failed: {}", e)))?;
            if n == 0 {
                return Ok(None);
            }
            if n < MAX_LINE || self.buf.last() == Some(&b'\n') {
                break;
            }
            // Overlong lines are dropped whole, never returned in part
            let dropped = MAX_LINE + self.skip_line().await?;
            tracing::warn!(max = MAX_LINE, dropped, "Serial line too long, discarded");
        }
        // Boards emit the odd non-UTF-8 byte on reset
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim().to_string()))
    }
}

struct TtyWriter {
    file: Mutex<File>,
}

#[async_trait]
impl ActuatorPort for TtyWriter {
    async fn send(&self, command: &[u8]) -> Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(command)
            .await
            .map_err(|e| Error::Serial(format!("write failed: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Serial(format!("flush failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_reader_splits_and_trims() {
        let data: &[u8] = b"baby temp: 36.5C\r\nhello\n\xffnoise\nlast";
        let mut reader = LineReader::new(data);
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("baby temp: 36.5C"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("\u{FFFD}noise"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overlong_line_is_discarded() {
        // A marker line whose value sits past the limit must not parse from its prefix
        let mut data = b"baby temp: 36.5".to_vec();
        data.extend(std::iter::repeat(b' ').take(10_000));
        data.extend_from_slice(b"C junk\nbaby temp: 37.1C\n");
        let mut reader = LineReader::new(data.as_slice());

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("baby temp: 37.1C"));
        assert!(reader.buf.capacity() < 10_000);
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unterminated_flood_ends_at_eof() {
        let data = vec![b'x'; 50_000];
        let mut reader = LineReader::new(data.as_slice());
        assert_eq!(reader.read_line().await.unwrap(), None);
        assert!(reader.buf.capacity() <= 2 * MAX_LINE);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept_whole() {
        let mut data = vec![b'y'; MAX_LINE - 1];
        data.extend_from_slice(b"\nnext\n");
        let mut reader = LineReader::new(data.as_slice());
        assert_eq!(reader.read_line().await.unwrap().unwrap().len(), MAX_LINE - 1);
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_unavailable_port_always_fails() {
        let port = UnavailablePort;
        assert!(matches!(port.send(b"servo\n").await, Err(Error::Serial(_))));
    }

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.port, PathBuf::from("/dev/ttyACM0"));
        assert_eq!(config.baud, 9600);
    }
}
