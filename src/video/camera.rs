//! Virtual camera sink
//!
//! # Contract
//!
//! - `open(width, height, fps) -> sink`
//! - `send(rgb)` takes exactly `width * height * 3` bytes
//! - `pace()` suspends until the next frame slot
//! - `close()`

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::VideoConfig;
use crate::errors::RelayError;
use crate::timing::FramePacer;

/// A fixed-format RGB24 output device
pub trait VirtualCamera: Send {
    fn name(&self) -> &str;

    /// Write one frame. The buffer always matches the opened resolution.
    fn send(&mut self, rgb: &[u8]) -> Result<(), RelayError>;

    fn close(&mut self) {}
}

/// Opened camera device plus its frame clock
pub struct CameraSink {
    device: Box<dyn VirtualCamera>,
    pacer: FramePacer,
    width: u32,
    height: u32,
    fps: u32,
    frames_sent: u64,
}

/// Camera handle shared by successive video pumps; `None` means inactive.
///
/// A pump holds the lock for its whole life.
pub type SharedCamera = Arc<Mutex<Option<CameraSink>>>;

impl CameraSink {
    /// Open the platform virtual camera described by `config`
    pub fn open(config: &VideoConfig) -> Result<Self, RelayError> {
        let device = open_platform_device(config)?;
        Ok(Self::with_device(device, config.width, config.height, config.fps))
    }

    /// Wrap an already-open device
    pub fn with_device(device: Box<dyn VirtualCamera>, width: u32, height: u32, fps: u32) -> Self {
        log::info!(
            "Virtual camera '{}' ready: {}x{} @ {} fps",
            device.name(),
            width,
            height,
            fps
        );
        Self {
            device,
            pacer: FramePacer::new(fps),
            width,
            height,
            fps,
            frames_sent: 0,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn send(&mut self, rgb: &[u8]) -> Result<(), RelayError> {
        let expected = self.width as usize * self.height as usize * 3;
        if rgb.len() != expected {
            return Err(RelayError::DeviceError(format!(
                "frame is {} bytes, camera expects {}",
                rgb.len(),
                expected
            )));
        }
        self.device.send(rgb)?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Wait for the camera's next frame slot
    pub async fn pace(&mut self) {
        self.pacer.pace().await;
    }

    pub fn close(&mut self) {
        self.device.close();
        log::info!(
            "Virtual camera '{}' closed after {} frame(s)",
            self.device.name(),
            self.frames_sent
        );
    }
}

/// Open the camera and wrap it for sharing; an open failure yields an inactive handle
pub fn open_shared(config: &VideoConfig) -> SharedCamera {
    let sink = match CameraSink::open(config) {
        Ok(sink) => Some(sink),
        Err(e) => {
            log::warn!("Virtual camera unavailable, video will be discarded: {}", e);
            None
        }
    };
    Arc::new(Mutex::new(sink))
}

#[cfg(target_os = "linux")]
fn open_platform_device(config: &VideoConfig) -> Result<Box<dyn VirtualCamera>, RelayError> {
    let device = super::v4l2::V4l2Loopback::open(&config.device, config.width, config.height)?;
    Ok(Box::new(device))
}

#[cfg(not(target_os = "linux"))]
fn open_platform_device(_config: &VideoConfig) -> Result<Box<dyn VirtualCamera>, RelayError> {
    Err(RelayError::DeviceError(
        "no virtual camera backend for this platform".to_string(),
    ))
}
