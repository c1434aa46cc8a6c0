//! H.264 decoder wrapper using openh264

use openh264::decoder::Decoder;
use openh264::formats::YUVSource;

use crate::errors::RelayError;
use crate::timing::MediaClock;
use crate::types::VideoFrame;

/// Decodes H.264 access units (Annex B) into RGB24 frames
pub struct H264Decoder {
    decoder: Decoder,
    clock: MediaClock,
    frames: u64,
}

// SAFETY: the decoder handle is owned exclusively by this struct and only
// used through `&mut self`; openh264 decoders have no thread affinity.
unsafe impl Send for H264Decoder {}

impl H264Decoder {
    pub fn new(clock: MediaClock) -> Result<Self, RelayError> {
        let decoder = Decoder::new()
            .map_err(|e| RelayError::InitializationError(format!("Failed to create H.264 decoder: {}", e)))?;
        Ok(Self {
            decoder,
            clock,
            frames: 0,
        })
    }

    /// Decode one access unit.
    ///
    /// Returns `None` while the decoder is still buffering (e.g. waiting for
    /// the first IDR after SPS/PPS).
    pub fn decode(&mut self, access_unit: &[u8]) -> Result<Option<VideoFrame>, RelayError> {
        let decoded = self
            .decoder
            .decode(access_unit)
            .map_err(|e| RelayError::DecodeError(format!("H.264 decoding failed: {}", e)))?;

        let Some(yuv) = decoded else {
            return Ok(None);
        };

        let (width, height) = yuv.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let mut rgb = vec![0u8; width * height * 3];
        yuv.write_rgb8(&mut rgb);

        self.frames += 1;
        Ok(Some(VideoFrame::new(
            rgb,
            width as u32,
            height as u32,
            self.clock.now(),
        )))
    }

    /// Frames produced so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }
}

/// Consecutive undecodable access units after which the stream is given up
const MAX_CONSECUTIVE_ERRORS: u32 = 300;

/// Decoder for a lossy RTP stream.
///
/// An access unit that fails to decode (lost reference, damaged slice) is
/// skipped and decoding resumes at the next keyframe. Only a long run of
/// failures is reported as an error.
pub struct ResyncingDecoder {
    decoder: H264Decoder,
    synced: bool,
    consecutive_errors: u32,
    skipped: u64,
}

impl ResyncingDecoder {
    pub fn new(decoder: H264Decoder) -> Self {
        Self {
            decoder,
            synced: false,
            consecutive_errors: 0,
            skipped: 0,
        }
    }

    /// Decode one access unit; `Ok(None)` when there is no picture to show
    pub fn push(&mut self, access_unit: &[u8]) -> Result<Option<VideoFrame>, RelayError> {
        match self.decoder.decode(access_unit) {
            Ok(Some(frame)) => {
                if !self.synced {
                    log::info!("Video decoding in sync: {}x{}", frame.width, frame.height);
                    self.synced = true;
                }
                self.consecutive_errors = 0;
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.skipped += 1;
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(RelayError::DecodeError(format!(
                        "{} access units in a row failed to decode, last: {}",
                        self.consecutive_errors, e
                    )));
                }
                if !self.synced {
                    log::debug!("Waiting for keyframe: {}", e);
                } else if self.consecutive_errors == 1 {
                    log::debug!("Dropping undecodable access unit until the next keyframe: {}", e);
                }
                Ok(None)
            }
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Access units dropped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openh264::encoder::Encoder;
    use openh264::formats::YUVBuffer;

    /// First output of a fresh encoder: SPS, PPS and an IDR picture
    fn keyframe(w: usize, h: usize, luma: u8) -> Vec<u8> {
        let yuv = YUVBuffer::from_vec(vec![luma; w * h * 3 / 2], w, h);
        let mut encoder = Encoder::new().unwrap();
        encoder.encode(&yuv).unwrap().to_vec()
    }

    #[test]
    fn test_decode_encoded_frame() {
        // Mid-grey YUV420
        let bitstream = keyframe(64, 48, 128);

        let mut decoder = H264Decoder::new(MediaClock::new()).unwrap();
        let frame = decoder.decode(&bitstream).unwrap().expect("IDR decodes to a frame");
        assert_eq!(frame.dimensions(), (64, 48));
        assert!(frame.is_well_formed());
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_garbage_does_not_panic() {
        let mut decoder = H264Decoder::new(MediaClock::new()).unwrap();
        let _ = decoder.decode(&[0, 0, 0, 1, 0x65, 0xff, 0x00]);
    }

    #[test]
    fn test_damaged_unit_between_keyframes_is_skipped() {
        let mut decoder = ResyncingDecoder::new(H264Decoder::new(MediaClock::new()).unwrap());

        assert!(decoder.push(&keyframe(64, 48, 100)).unwrap().is_some());
        assert!(decoder.is_synced());

        // A damaged slice must not end the stream
        assert!(decoder.push(&[0, 0, 0, 1, 0x65, 0xff, 0x00]).is_ok());
        assert!(decoder.push(&[0, 0, 0, 1, 0x41, 0x9a, 0x12, 0x34]).is_ok());

        let frame = decoder.push(&keyframe(64, 48, 160)).unwrap();
        assert_eq!(frame.expect("keyframe resyncs").dimensions(), (64, 48));
    }

    #[test]
    fn test_errors_before_first_picture_are_skipped() {
        let mut decoder = ResyncingDecoder::new(H264Decoder::new(MediaClock::new()).unwrap());
        for _ in 0..10 {
            assert!(decoder.push(&[0, 0, 0, 1, 0x41, 0xff]).is_ok());
        }
        assert!(!decoder.is_synced());
        assert!(decoder.push(&keyframe(64, 48, 128)).unwrap().is_some());
    }
}
