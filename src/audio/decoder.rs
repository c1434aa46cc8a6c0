//! Opus audio decoder
//!
//! - opus_packet -> interleaved f32 frame
//! - decodes directly at the output sample rate (libopus resamples internally)
//! - one packet in, one frame out; no buffering across packets

use crate::errors::RelayError;
use crate::types::{AudioFrame, SampleData, SampleLayout};

/// Longest Opus packet duration is 120ms; at 48kHz that is 5760 samples per channel.
const MAX_FRAME_SAMPLES_48K: usize = 5760;

/// Opus decoder for RTP payloads
///
/// # Thread Safety
/// `Send` so the decoder can live inside the track reader task. It is not
/// `Sync`; libopus decoder state must only be touched from one thread at a time.
pub struct OpusDecoder {
    decoder: *mut libopus_sys::OpusDecoder,
    sample_rate: u32,
    channels: u16,
    pcm: Vec<f32>,
}

// SAFETY: the pointer is owned exclusively by this struct, libopus decoders
// carry no thread affinity, and without `Sync` there is no shared access.
unsafe impl Send for OpusDecoder {}

impl OpusDecoder {
    /// Create a decoder producing `channels` channels at `sample_rate`
    ///
    /// `sample_rate` must be one of 8000, 12000, 16000, 24000 or 48000.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, RelayError> {
        if ![8000, 12000, 16000, 24000, 48000].contains(&sample_rate) {
            return Err(RelayError::InitializationError(format!(
                "Opus cannot decode at {} Hz",
                sample_rate
            )));
        }
        if channels != 1 && channels != 2 {
            return Err(RelayError::InitializationError(
                "Opus supports only mono (1) or stereo (2) channels".to_string(),
            ));
        }

        let mut error: i32 = 0;
        let decoder = unsafe {
            libopus_sys::opus_decoder_create(sample_rate as i32, channels as i32, &mut error)
        };

        if decoder.is_null() || error != 0 {
            return Err(RelayError::InitializationError(format!(
                "Failed to create Opus decoder: error code {}",
                error
            )));
        }

        let max_frame = MAX_FRAME_SAMPLES_48K * sample_rate as usize / 48000;
        Ok(Self {
            decoder,
            sample_rate,
            channels,
            pcm: vec![0.0; max_frame * channels as usize],
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode one Opus packet
    pub fn decode(&mut self, packet: &[u8]) -> Result<AudioFrame, RelayError> {
        if packet.is_empty() {
            return Err(RelayError::DecodeError("empty Opus packet".to_string()));
        }

        let max_frame = self.pcm.len() / self.channels as usize;
        let decoded = unsafe {
            libopus_sys::opus_decode_float(
                self.decoder,
                packet.as_ptr(),
                packet.len() as i32,
                self.pcm.as_mut_ptr(),
                max_frame as i32,
                0,
            )
        };

        if decoded < 0 {
            return Err(RelayError::DecodeError(format!(
                "Opus decoding failed: error code {}",
                decoded
            )));
        }

        let samples = decoded as usize * self.channels as usize;
        Ok(AudioFrame {
            sample_rate: self.sample_rate,
            channels: self.channels,
            layout: SampleLayout::Interleaved,
            data: SampleData::F32(self.pcm[..samples].to_vec()),
        })
    }
}

impl Drop for OpusDecoder {
    fn drop(&mut self) {
        if !self.decoder.is_null() {
            unsafe { libopus_sys::opus_decoder_destroy(self.decoder) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a valid packet by running the encoder once
    fn encode_silence(sample_rate: u32, channels: u16) -> Vec<u8> {
        let frame = 960 * sample_rate as usize / 48000;
        let pcm = vec![0.0f32; frame * channels as usize];
        let mut error = 0;
        unsafe {
            let encoder = libopus_sys::opus_encoder_create(
                sample_rate as i32,
                channels as i32,
                2049,
                &mut error,
            );
            assert!(!encoder.is_null());
            let mut out = vec![0u8; 4000];
            let len = libopus_sys::opus_encode_float(
                encoder,
                pcm.as_ptr(),
                frame as i32,
                out.as_mut_ptr(),
                out.len() as i32,
            );
            libopus_sys::opus_encoder_destroy(encoder);
            assert!(len > 0);
            out.truncate(len as usize);
            out
        }
    }

    #[test]
    fn test_decoder_creation() {
        let decoder = OpusDecoder::new(48000, 1).unwrap();
        assert_eq!(decoder.sample_rate(), 48000);
        assert_eq!(decoder.channels(), 1);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            OpusDecoder::new(44100, 1),
            Err(RelayError::InitializationError(_))
        ));
        assert!(matches!(
            OpusDecoder::new(48000, 3),
            Err(RelayError::InitializationError(_))
        ));
    }

    #[test]
    fn test_decode_one_packet() {
        let packet = encode_silence(48000, 2);
        let mut decoder = OpusDecoder::new(48000, 2).unwrap();
        let frame = decoder.decode(&packet).unwrap();
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.layout, SampleLayout::Interleaved);
        assert_eq!(frame.frame_count(), 960);
    }

    #[test]
    fn test_decode_at_lower_rate() {
        let packet = encode_silence(48000, 1);
        let mut decoder = OpusDecoder::new(16000, 1).unwrap();
        let frame = decoder.decode(&packet).unwrap();
        assert_eq!(frame.frame_count(), 320);
    }

    #[test]
    fn test_empty_packet_rejected() {
        let mut decoder = OpusDecoder::new(48000, 1).unwrap();
        assert!(decoder.decode(&[]).is_err());
    }
}
