//! Synthetic media shaped like what a headset browser sends
//!
//! Quest-class headsets publish 1920x1080 or 1280x720 video and 48kHz Opus
//! audio, stereo from the browser's capture path.

use crate::types::{AudioFrame, SampleData, SampleLayout, VideoFrame};

/// RGB frame with a gradient that shifts every frame
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> VideoFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoFrame::new(data, width, height, frame_number as f64 / 30.0)
}

/// Planar stereo 440Hz sine at 48kHz, as a decoder hands it out
pub fn synthetic_audio_frame(frame_number: u64, samples_per_frame: usize) -> AudioFrame {
    let sample_rate = 48000.0;
    let frequency = 440.0;
    let channels = 2;

    let mut samples = vec![0.0f32; samples_per_frame * channels];
    for i in 0..samples_per_frame {
        let t = (frame_number as f64 * samples_per_frame as f64 + i as f64) / sample_rate;
        let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.3;
        samples[i] = value;
        samples[samples_per_frame + i] = value;
    }

    AudioFrame {
        sample_rate: 48000,
        channels: channels as u16,
        layout: SampleLayout::Planar,
        data: SampleData::F32(samples),
    }
}

/// Properties of the media a headset browser publishes
pub struct HeadsetCharacteristics {
    pub video_resolution: (u32, u32),
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Samples per channel in one 20ms Opus frame
    pub opus_frame_samples: usize,
}

impl HeadsetCharacteristics {
    pub fn quest() -> Self {
        Self {
            video_resolution: (1920, 1080),
            audio_sample_rate: 48000,
            audio_channels: 2,
            opus_frame_samples: 960,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_changes_per_frame() {
        let a = synthetic_video_frame(0, 16, 8);
        let b = synthetic_video_frame(1, 16, 8);
        assert!(a.is_well_formed());
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_audio_frame_in_range() {
        let chars = HeadsetCharacteristics::quest();
        let frame = synthetic_audio_frame(0, chars.opus_frame_samples);
        assert_eq!(frame.frame_count(), 960);
        let SampleData::F32(samples) = &frame.data else {
            panic!("expected float samples");
        };
        assert!(samples.iter().all(|s| s.abs() <= 0.3));
    }
}
