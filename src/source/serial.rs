//! Sensor microcontroller on a serial line
//!
//! The board prints one JSON object per line at a fixed baud rate.

use std::path::Path;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::protocol::SensorReading;

use super::adapter::{SourceItem, SourceKind, UpstreamSource};
use super::error::SourceError;

/// Default line length limit
pub const DEFAULT_MAX_LINE: usize = 4 * 1024;

/// Device-name fragments that identify a USB serial adapter
const PORT_PATTERNS: [&str; 3] = ["usbserial", "usbmodem", "ttyusb"];

/// Checked when no listed port matches
const FALLBACK_PORT: &str = "/dev/ttyUSB0";

/// Serial line settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Explicit port; discovered when `None`
    pub port: Option<String>,

    pub baud_rate: u32,

    /// Lines longer than this are discarded
    pub max_line: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

impl SerialConfig {
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// First port whose name looks like a USB serial adapter
pub fn match_port<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().find(|name| {
        let lower = name.to_ascii_lowercase();
        PORT_PATTERNS.iter().any(|p| lower.contains(p))
    })
}

/// Resolve the port to open
///
/// An explicit port wins. Otherwise the available ports are scanned, then
/// `/dev/ttyUSB0` is tried.
pub fn discover_port(config: &SerialConfig) -> Result<String, SourceError> {
    if let Some(ref port) = config.port {
        return Ok(port.clone());
    }

    let ports = tokio_serial::available_ports()?;
    if let Some(name) = match_port(ports.iter().map(|p| p.port_name.as_str())) {
        return Ok(name.to_string());
    }

    if Path::new(FALLBACK_PORT).exists() {
        return Ok(FALLBACK_PORT.to_string());
    }

    Err(SourceError::NoDevice("no USB serial port found".to_string()))
}

/// Newline-delimited framing over any byte stream
///
/// Partial lines stay buffered across reads. An over-long line is dropped
/// up to its terminating newline.
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    max_line: usize,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_line: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(1024),
            max_line,
            discarding: false,
        }
    }

    /// Next non-empty line with surrounding whitespace trimmed
    ///
    /// Returns `None` at end of stream; a trailing partial line is dropped.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line = self.buf.split_to(pos + 1);

                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if pos > self.max_line {
                    tracing::debug!(len = pos, "Discarding over-long serial line");
                    continue;
                }

                let text = String::from_utf8_lossy(&line[..pos]).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(text));
            }

            if self.buf.len() > self.max_line {
                tracing::debug!(len = self.buf.len(), "Discarding over-long serial line");
                self.buf.clear();
                self.discarding = true;
            }

            self.buf.reserve(1024);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }
}

/// Sensor board on a serial port
pub struct SerialSource {
    config: SerialConfig,
    reader: Option<LineReader<SerialStream>>,
    port: Option<String>,
}

impl SerialSource {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            reader: None,
            port: None,
        }
    }

    /// Port currently open
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}

#[async_trait]
impl UpstreamSource for SerialSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Serial
    }

    fn describe(&self) -> String {
        match (&self.port, &self.config.port) {
            (Some(port), _) | (None, Some(port)) => port.clone(),
            (None, None) => "auto-discovered serial port".to_string(),
        }
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        self.reader = None;
        let port = discover_port(&self.config)?;

        let stream = tokio_serial::new(port.as_str(), self.config.baud_rate)
            .open_native_async()
            .map_err(|e| SourceError::Open(format!("{}: {}", port, e)))?;

        tracing::debug!(port = %port, baud = self.config.baud_rate, "Serial port opened");
        self.reader = Some(LineReader::new(stream, self.config.max_line));
        self.port = Some(port);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<SourceItem>, SourceError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| SourceError::Open("serial port not open".to_string()))?;

        loop {
            let line = match reader.next_line().await.map_err(SourceError::Read)? {
                Some(line) => line,
                None => return Ok(None),
            };

            match SensorReading::from_line(&line) {
                Ok(reading) => return Ok(Some(SourceItem::Sensor(reading))),
                Err(e) => {
                    tracing::warn!(line = %line, error = %e, "Invalid sensor line");
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::debug!(port = ?self.port, "Serial port closed");
        }
    }
}
