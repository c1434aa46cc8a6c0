//! PCM normalization
//!
//! Turns decoder output (float or 16-bit, planar or interleaved, any channel
//! count) into the canonical interleaved `i16` chunk the output device takes.

use crate::errors::RelayError;
use crate::types::{AudioChunk, AudioFrame, SampleData, SampleLayout};

/// Full-scale value for float to 16-bit conversion.
/// Symmetric so that +1.0 and -1.0 map to equal magnitudes.
pub const I16_SCALE: f32 = 32767.0;

/// Clip a float sample to [-1, 1] and scale it to `i16`
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    // NaN casts to 0
    (sample.clamp(-1.0, 1.0) * I16_SCALE).round() as i16
}

/// Convert a decoded frame into an interleaved chunk with `out_channels` channels.
///
/// Matching channel counts are copied through. Mono output from a
/// multi-channel frame averages the channels; extra output channels repeat
/// the last input channel.
pub fn frame_to_chunk(frame: &AudioFrame, out_channels: u16) -> Result<AudioChunk, RelayError> {
    if frame.channels == 0 {
        return Err(RelayError::DecodeError("audio frame has zero channels".to_string()));
    }
    if out_channels == 0 {
        return Err(RelayError::DecodeError("output channel count is zero".to_string()));
    }

    let pcm: Vec<i16> = match &frame.data {
        SampleData::I16(samples) => samples.clone(),
        SampleData::F32(samples) => samples.iter().copied().map(f32_to_i16).collect(),
    };

    let in_channels = frame.channels as usize;
    let frames = pcm.len() / in_channels;
    let out = out_channels as usize;

    let at = |channel: usize, index: usize| -> i16 {
        match frame.layout {
            SampleLayout::Planar => pcm[channel * frames + index],
            SampleLayout::Interleaved => pcm[index * in_channels + channel],
        }
    };

    let mut samples = Vec::with_capacity(frames * out);
    for i in 0..frames {
        if out == in_channels {
            for c in 0..out {
                samples.push(at(c, i));
            }
        } else if out == 1 {
            let sum: i32 = (0..in_channels).map(|c| at(c, i) as i32).sum();
            samples.push((sum / in_channels as i32) as i16);
        } else {
            for c in 0..out {
                samples.push(at(c.min(in_channels - 1), i));
            }
        }
    }

    Ok(AudioChunk {
        channels: out_channels,
        samples,
    })
}
