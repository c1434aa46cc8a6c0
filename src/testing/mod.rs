//! Testing utilities for relaycam
//!
//! Synthetic media plus in-memory peers, tracks and devices, so sessions
//! and the signaling endpoint can be exercised without a browser, network
//! media or virtual device drivers.

pub mod fakes;
pub mod synthetic_data;

pub use fakes::{
    inactive_sinks, FakePeer, FakePeerFactory, RecordingAudioSink, RecordingCamera, ScriptedTrack,
    FAKE_ANSWER_SDP,
};
pub use synthetic_data::{synthetic_audio_frame, synthetic_video_frame, HeadsetCharacteristics};
