//! Local camera capture through an external program
//!
//! The capture program (ffmpeg by default) reads the device and writes MJPEG
//! to stdout. Frames are cut from that stream with [`MjpegSplitter`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use super::adapter::{SourceItem, SourceKind, UpstreamSource};
use super::error::SourceError;
use super::mjpeg::{MjpegSplitter, DEFAULT_MAX_FRAME};

const READ_CHUNK: usize = 64 * 1024;

/// Camera capture settings
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Device index (`/dev/videoN` on Linux, avfoundation index on macOS)
    pub index: u32,

    /// Capture program
    pub program: String,

    /// Output frame rate
    pub fps: u32,

    /// JPEG quality passed to the encoder (2 = best, 31 = worst)
    pub quality: u8,

    /// Replace the generated program arguments entirely
    pub custom_args: Option<Vec<String>>,

    /// `open` fails if no frame arrives within this time
    pub first_frame_timeout: Duration,

    /// Frames larger than this are dropped
    pub max_frame: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            program: "ffmpeg".to_string(),
            fps: 10,
            quality: 5,
            custom_args: None,
            first_frame_timeout: Duration::from_secs(5),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl CameraConfig {
    pub fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the frame rate (at least 1)
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn custom_args(mut self, args: Vec<String>) -> Self {
        self.custom_args = Some(args);
        self
    }

    pub fn first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.first_frame_timeout = timeout;
        self
    }

    /// Device node the index refers to, where the platform has one
    pub fn device_path(&self) -> Option<PathBuf> {
        if cfg!(target_os = "linux") {
            Some(PathBuf::from(format!("/dev/video{}", self.index)))
        } else {
            None
        }
    }

    /// Arguments for the capture program
    pub fn capture_args(&self) -> Vec<String> {
        if let Some(ref args) = self.custom_args {
            return args.clone();
        }

        let (format, input) = if cfg!(target_os = "macos") {
            ("avfoundation", self.index.to_string())
        } else {
            ("v4l2", format!("/dev/video{}", self.index))
        };

        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-f", format, "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(input);
        args.extend([
            "-r".to_string(),
            self.fps.to_string(),
            "-f".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            self.quality.to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

/// Camera device read through the capture program
pub struct CameraSource {
    config: CameraConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    splitter: MjpegSplitter,
    pending: VecDeque<Bytes>,
    chunk: Vec<u8>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        let splitter = MjpegSplitter::new(config.max_frame);
        Self {
            config,
            child: None,
            stdout: None,
            splitter,
            pending: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>, SourceError> {
        loop {
            if let Some(frame) = self.splitter.next_frame()? {
                return Ok(Some(frame));
            }

            let stdout = match self.stdout.as_mut() {
                Some(stdout) => stdout,
                None => return Ok(None),
            };
            let n = stdout
                .read(&mut self.chunk)
                .await
                .map_err(SourceError::Read)?;
            if n == 0 {
                return Ok(None);
            }
            self.splitter.push(&self.chunk[..n]);
        }
    }

    async fn stop_child(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(status = %status, "Capture program exited"),
                Ok(Err(e)) => tracing::debug!(error = %e, "Failed to reap capture program"),
                Err(_) => tracing::warn!("Capture program did not exit after kill"),
            }
        }
        self.splitter.clear();
        self.pending.clear();
    }
}

#[async_trait]
impl UpstreamSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn describe(&self) -> String {
        match self.config.device_path() {
            Some(path) if self.config.custom_args.is_none() => path.display().to_string(),
            _ => format!("{} (camera {})", self.config.program, self.config.index),
        }
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        self.stop_child().await;

        if self.config.custom_args.is_none() {
            if let Some(path) = self.config.device_path() {
                if !path.exists() {
                    return Err(SourceError::NoDevice(path.display().to_string()));
                }
            }
        }

        let mut child = Command::new(&self.config.program)
            .args(self.config.capture_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;

        self.stdout = child.stdout.take();
        self.child = Some(child);

        let wait = self.config.first_frame_timeout;
        match tokio::time::timeout(wait, self.next_frame()).await {
            Ok(Ok(Some(frame))) => {
                self.pending.push_back(frame);
                Ok(())
            }
            Ok(Ok(None)) => {
                self.stop_child().await;
                Err(SourceError::Open(format!(
                    "{} exited before producing a frame",
                    self.config.program
                )))
            }
            Ok(Err(e)) => {
                self.stop_child().await;
                Err(e)
            }
            Err(_) => {
                self.stop_child().await;
                Err(SourceError::Timeout(wait))
            }
        }
    }

    async fn read(&mut self) -> Result<Option<SourceItem>, SourceError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(SourceItem::Frame(frame)));
        }
        Ok(self.next_frame().await?.map(SourceItem::Frame))
    }

    async fn close(&mut self) {
        self.stop_child().await;
    }
}
