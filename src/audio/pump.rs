//! Audio pump: track -> canonical chunks -> bounded queue
//!
//! Never blocks on the queue. When the writer falls behind, chunks are
//! dropped at enqueue time so the track keeps being drained at network rate.

use super::convert::frame_to_chunk;
use super::queue::AudioQueueProducer;
use crate::types::{AudioFrame, TrackRead, TrackSource};

/// Counters reported when the pump ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioPumpStats {
    pub frames: u64,
    pub enqueued: u64,
    pub dropped: u64,
}

/// Drain `source` until it ends, converting each frame for `out_channels` output
pub async fn run_audio_pump(
    mut source: Box<dyn TrackSource<AudioFrame>>,
    producer: AudioQueueProducer,
    out_channels: u16,
) -> AudioPumpStats {
    let mut stats = AudioPumpStats::default();
    log::info!("Audio pump started ({} output channel(s))", out_channels);

    loop {
        let frame = match source.next_frame().await {
            TrackRead::Frame(frame) => frame,
            TrackRead::EndOfTrack => {
                log::info!("Audio track ended");
                break;
            }
            TrackRead::DecodeError(reason) => {
                log::warn!("Audio track decode error, stopping pump: {}", reason);
                break;
            }
        };
        stats.frames += 1;

        let chunk = match frame_to_chunk(&frame, out_channels) {
            Ok(chunk) => chunk,
            Err(e) => {
                log::debug!("Skipping unusable audio frame: {}", e);
                continue;
            }
        };

        if producer.enqueue(chunk) {
            stats.enqueued += 1;
        } else {
            stats.dropped += 1;
        }
    }

    log::info!(
        "Audio pump stopped: {} frames, {} queued, {} dropped",
        stats.frames,
        stats.enqueued,
        stats.dropped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue;
    use crate::testing::ScriptedTrack;
    use crate::types::{SampleData, SampleLayout};

    fn stereo_float(value: f32) -> AudioFrame {
        AudioFrame {
            sample_rate: 48000,
            channels: 2,
            layout: SampleLayout::Planar,
            data: SampleData::F32(vec![value; 960 * 2]),
        }
    }

    #[tokio::test]
    async fn test_pump_converts_and_enqueues() {
        let (producer, mut consumer) = queue::bounded(4);
        let track = ScriptedTrack::new(vec![
            TrackRead::Frame(stereo_float(0.5)),
            TrackRead::Frame(stereo_float(-0.5)),
        ]);

        let stats = run_audio_pump(Box::new(track), producer, 1).await;
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.enqueued, 2);

        let first = consumer.dequeue().await.unwrap();
        assert_eq!(first.channels, 1);
        assert_eq!(first.samples.len(), 960);
        assert!(first.samples.iter().all(|&s| s == 16384));
        let second = consumer.dequeue().await.unwrap();
        assert!(second.samples.iter().all(|&s| s == -16384));
    }

    #[tokio::test]
    async fn test_pump_drops_when_full() {
        let (producer, consumer) = queue::bounded(2);
        let frames = (0..5).map(|_| TrackRead::Frame(stereo_float(0.1))).collect();

        let stats = run_audio_pump(Box::new(ScriptedTrack::new(frames)), producer, 2).await;
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(consumer.len(), 2);
        assert_eq!(consumer.dropped(), 3);
    }

    #[tokio::test]
    async fn test_pump_stops_on_decode_error() {
        let (producer, consumer) = queue::bounded(4);
        let track = ScriptedTrack::new(vec![
            TrackRead::Frame(stereo_float(0.0)),
            TrackRead::DecodeError("corrupt packet".to_string()),
            TrackRead::Frame(stereo_float(0.0)),
        ]);

        let stats = run_audio_pump(Box::new(track), producer, 1).await;
        assert_eq!(stats.frames, 1);
        assert_eq!(consumer.len(), 1);
    }
}
