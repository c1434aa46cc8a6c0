//! v4l2loopback output device (Linux)
//!
//! The loopback node is configured for RGB24 through the V4L2 output API,
//! then frames are written to it as raw bytes.

use std::fs::{File, OpenOptions};
use std::io::Write;

use v4l::video::Output;
use v4l::{Device, Format, FourCC};

use super::camera::VirtualCamera;
use crate::errors::RelayError;

pub struct V4l2Loopback {
    path: String,
    // Kept open so the negotiated format stays in effect
    _device: Device,
    writer: File,
}

impl V4l2Loopback {
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, RelayError> {
        if !std::path::Path::new(path).exists() {
            return Err(RelayError::DeviceError(format!(
                "{} does not exist (is v4l2loopback loaded?)",
                path
            )));
        }

        let device = Device::with_path(path)
            .map_err(|e| RelayError::DeviceError(format!("Failed to open {}: {}", path, e)))?;

        let requested = Format::new(width, height, FourCC::new(b"RGB3"));
        let actual = Output::set_format(&device, &requested)
            .map_err(|e| RelayError::DeviceError(format!("Failed to set format on {}: {}", path, e)))?;

        if actual.width != width || actual.height != height || actual.fourcc != requested.fourcc {
            return Err(RelayError::DeviceError(format!(
                "{} accepted {}x{} {} instead of {}x{} RGB3",
                path, actual.width, actual.height, actual.fourcc, width, height
            )));
        }

        let writer = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| RelayError::DeviceError(format!("Failed to open {} for writing: {}", path, e)))?;

        log::info!("Opened v4l2loopback device {} ({}x{} RGB3)", path, width, height);
        Ok(Self {
            path: path.to_string(),
            _device: device,
            writer,
        })
    }
}

impl VirtualCamera for V4l2Loopback {
    fn name(&self) -> &str {
        &self.path
    }

    fn send(&mut self, rgb: &[u8]) -> Result<(), RelayError> {
        self.writer
            .write_all(rgb)
            .map_err(|e| RelayError::DeviceError(format!("Write to {} failed: {}", self.path, e)))
    }
}
