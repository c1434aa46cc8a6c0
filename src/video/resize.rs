//! Resolution normalization for the virtual camera

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use crate::errors::RelayError;
use crate::types::VideoFrame;

/// Resize `frame` to `width`x`height` if, and only if, its dimensions differ.
///
/// Uses a bilinear (triangle) filter. Returns whether a resize happened.
pub fn normalize_frame(frame: VideoFrame, width: u32, height: u32) -> Result<(VideoFrame, bool), RelayError> {
    if frame.dimensions() == (width, height) {
        return Ok((frame, false));
    }

    let VideoFrame {
        width: src_w,
        height: src_h,
        data,
        timestamp,
    } = frame;

    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(src_w, src_h, data)
        .ok_or_else(|| {
            RelayError::DecodeError(format!(
                "RGB buffer does not match {}x{}",
                src_w, src_h
            ))
        })?;

    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    Ok((VideoFrame::new(resized.into_raw(), width, height, timestamp), true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_video_frame;

    #[test]
    fn test_same_size_is_untouched() {
        let frame = synthetic_video_frame(3, 1280, 720);
        let original = frame.data.clone();
        let (out, resized) = normalize_frame(frame, 1280, 720).unwrap();
        assert!(!resized);
        assert_eq!(out.data, original);
    }

    #[test]
    fn test_downscale_1080p() {
        let frame = synthetic_video_frame(0, 1920, 1080);
        let (out, resized) = normalize_frame(frame, 1280, 720).unwrap();
        assert!(resized);
        assert_eq!(out.dimensions(), (1280, 720));
        assert!(out.is_well_formed());
    }

    #[test]
    fn test_upscale_and_aspect_change() {
        let frame = synthetic_video_frame(0, 320, 320);
        let (out, resized) = normalize_frame(frame, 640, 360).unwrap();
        assert!(resized);
        assert_eq!(out.dimensions(), (640, 360));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let frame = VideoFrame::new(vec![0; 10], 16, 16, 0.0);
        assert!(normalize_frame(frame, 8, 8).is_err());
    }
}
