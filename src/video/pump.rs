//! Video pump: track -> resize -> virtual camera, paced by the camera

use super::camera::SharedCamera;
use super::resize::normalize_frame;
use crate::types::{TrackRead, TrackSource, VideoFrame};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoPumpStats {
    pub frames: u64,
    pub resized: u64,
    pub sent: u64,
    pub discarded: u64,
}

/// Drain `source` into the shared camera until the track ends.
///
/// Holds the camera lock for the pump's lifetime. With an inactive camera
/// the track is still drained so the peer's receive buffers do not back up.
pub async fn run_video_pump(
    mut source: Box<dyn TrackSource<VideoFrame>>,
    camera: SharedCamera,
) -> VideoPumpStats {
    let mut stats = VideoPumpStats::default();
    let mut guard = camera.lock().await;
    log::info!("Video pump started");

    loop {
        let frame = match source.next_frame().await {
            TrackRead::Frame(frame) => frame,
            TrackRead::EndOfTrack => {
                log::info!("Video track ended");
                break;
            }
            TrackRead::DecodeError(reason) => {
                log::warn!("Video track decode error, stopping pump: {}", reason);
                break;
            }
        };
        stats.frames += 1;

        let Some(sink) = guard.as_mut() else {
            stats.discarded += 1;
            continue;
        };

        let (width, height) = sink.resolution();
        let frame = match normalize_frame(frame, width, height) {
            Ok((frame, resized)) => {
                if resized {
                    stats.resized += 1;
                }
                frame
            }
            Err(e) => {
                log::debug!("Skipping malformed video frame: {}", e);
                stats.discarded += 1;
                continue;
            }
        };

        match sink.send(&frame.data) {
            Ok(()) => stats.sent += 1,
            Err(e) => log::warn!("Virtual camera write failed: {}", e),
        }
        sink.pace().await;
    }

    log::info!(
        "Video pump stopped: {} frames, {} resized, {} sent, {} discarded",
        stats.frames,
        stats.resized,
        stats.sent,
        stats.discarded
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{synthetic_video_frame, RecordingCamera, ScriptedTrack};
    use crate::video::camera::CameraSink;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn shared(camera: &RecordingCamera, width: u32, height: u32) -> SharedCamera {
        Arc::new(Mutex::new(Some(CameraSink::with_device(
            Box::new(camera.clone()),
            width,
            height,
            30,
        ))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_resized_to_sink() {
        let camera = RecordingCamera::new();
        let frames = (0..3)
            .map(|n| TrackRead::Frame(synthetic_video_frame(n, 64, 36)))
            .collect();

        let stats = run_video_pump(Box::new(ScriptedTrack::new(frames)), shared(&camera, 32, 18)).await;
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.resized, 3);
        for frame in camera.frames() {
            assert_eq!(frame.len(), 32 * 18 * 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_frames_pass_through() {
        let camera = RecordingCamera::new();
        let frame = synthetic_video_frame(7, 32, 18);
        let expected = frame.data.clone();

        let stats = run_video_pump(
            Box::new(ScriptedTrack::new(vec![TrackRead::Frame(frame)])),
            shared(&camera, 32, 18),
        )
        .await;
        assert_eq!(stats.resized, 0);
        assert_eq!(camera.frames(), vec![expected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_is_paced() {
        let camera = RecordingCamera::new();
        let frames = (0..11)
            .map(|n| TrackRead::Frame(synthetic_video_frame(n, 8, 8)))
            .collect();

        let start = tokio::time::Instant::now();
        run_video_pump(Box::new(ScriptedTrack::new(frames)), shared(&camera, 8, 8)).await;
        // 30 fps: ten full periods after the first immediate slot
        assert!(start.elapsed() >= std::time::Duration::from_millis(333));
    }

    #[tokio::test]
    async fn test_inactive_camera_drains_track() {
        let frames = (0..4)
            .map(|n| TrackRead::Frame(synthetic_video_frame(n, 8, 8)))
            .collect();
        let stats = run_video_pump(
            Box::new(ScriptedTrack::new(frames)),
            Arc::new(Mutex::new(None)),
        )
        .await;
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.discarded, 4);
        assert_eq!(stats.sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_stops_pump() {
        let camera = RecordingCamera::new();
        let track = ScriptedTrack::new(vec![
            TrackRead::Frame(synthetic_video_frame(0, 8, 8)),
            TrackRead::DecodeError("bad NAL".to_string()),
            TrackRead::Frame(synthetic_video_frame(1, 8, 8)),
        ]);
        let stats = run_video_pump(Box::new(track), shared(&camera, 8, 8)).await;
        assert_eq!(stats.frames, 1);
        assert_eq!(camera.frames().len(), 1);
    }
}
