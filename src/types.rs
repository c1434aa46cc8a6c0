//! Media types shared by the tracks, pumps and sinks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A decoded video frame, interleaved RGB24
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major
    pub data: Vec<u8>,
    /// Producer timestamp in seconds
    pub timestamp: f64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: f64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the buffer length agrees with the dimensions
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }
}

/// Raw samples as produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    F32(Vec<f32>),
    I16(Vec<i16>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::F32(v) => v.len(),
            SampleData::I16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory order of multi-channel samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleLayout {
    /// All samples of channel 0, then channel 1, ...
    Planar,
    /// Frame by frame: c0 c1 c0 c1 ...
    Interleaved,
}

/// A decoded audio frame
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: SampleLayout,
    pub data: SampleData,
}

impl AudioFrame {
    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels as usize
        }
    }
}

/// Canonical PCM chunk handed to the audio output: interleaved `i16`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Outcome of reading one frame from a track
#[derive(Debug)]
pub enum TrackRead<F> {
    Frame(F),
    EndOfTrack,
    DecodeError(String),
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A lazy, non-restartable sequence of decoded frames
#[async_trait]
pub trait TrackSource<F>: Send {
    async fn next_frame(&mut self) -> TrackRead<F>;
}

/// Track delivered by a peer connection, ready to be pumped
pub enum IncomingTrack {
    Video(Box<dyn TrackSource<VideoFrame>>),
    Audio(Box<dyn TrackSource<AudioFrame>>),
}

impl IncomingTrack {
    pub fn kind(&self) -> TrackKind {
        match self {
            IncomingTrack::Video(_) => TrackKind::Video,
            IncomingTrack::Audio(_) => TrackKind::Audio,
        }
    }
}

impl std::fmt::Debug for IncomingTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IncomingTrack({:?})", self.kind())
    }
}
