//! Video path for relaycam
//!
//! Remote H.264 video becomes local webcam output:
//! - `decoder`: H.264 access units to RGB24 (openh264), skipping damaged units
//! - `resize`: normalize to the camera resolution
//! - `pump`: track -> camera, paced by the camera
//! - `camera`: virtual camera sink and its frame clock
//! - `v4l2`: v4l2loopback backend (Linux)

mod camera;
mod decoder;
mod pump;
mod resize;
#[cfg(target_os = "linux")]
mod v4l2;

pub use camera::{open_shared, CameraSink, SharedCamera, VirtualCamera};
pub use decoder::{H264Decoder, ResyncingDecoder};
pub use pump::{run_video_pump, VideoPumpStats};
pub use resize::normalize_frame;
