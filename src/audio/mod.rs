//! Audio path for relaycam
//!
//! Remote Opus audio becomes local microphone input:
//! - `decoder`: Opus RTP payload decoding (libopus)
//! - `convert`: float/planar frames to interleaved `i16` chunks
//! - `queue`: bounded, drop-on-full FIFO between pump and writer
//! - `pump`: track -> queue
//! - `writer`: queue -> output device on the blocking pool
//! - `output`: cpal-backed virtual microphone sink
//! - `device`: output device enumeration

mod convert;
mod decoder;
mod device;
mod output;
mod pump;
mod queue;
mod writer;

pub use convert::{f32_to_i16, frame_to_chunk, I16_SCALE};
pub use decoder::OpusDecoder;
pub use device::{list_output_devices, match_device_hint, AudioOutputDevice};
pub use output::{AudioSink, CpalAudioOutput};
pub use pump::{run_audio_pump, AudioPumpStats};
pub use queue::{bounded, AudioQueueConsumer, AudioQueueProducer, DEFAULT_QUEUE_CAPACITY};
pub use writer::run_audio_writer;
