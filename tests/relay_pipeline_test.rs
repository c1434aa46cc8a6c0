//! Media path integration tests
//!
//! Synthetic headset media through the pumps, the bounded audio queue and
//! the session teardown, with recording devices standing in for the
//! virtual camera and the virtual microphone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use relaycam::audio::{self, AudioSink};
use relaycam::errors::RelayError;
use relaycam::session::{MediaSinks, Session, SessionOutcome};
use relaycam::status::{ServerStatus, StatusNotifier};
use relaycam::testing::{
    synthetic_audio_frame, synthetic_video_frame, FakePeerFactory, HeadsetCharacteristics,
    RecordingAudioSink, RecordingCamera, ScriptedTrack,
};
use relaycam::types::{AudioChunk, AudioFrame, IncomingTrack, SampleData, SampleLayout, TrackRead};
use relaycam::video::{self, CameraSink};
use relaycam::webrtc::{ConnectionState, PeerEvent};

fn tagged_chunk(tag: i16) -> AudioChunk {
    AudioChunk {
        channels: 1,
        samples: vec![tag; 480],
    }
}

fn tagged_frame(tag: i16) -> AudioFrame {
    AudioFrame {
        sample_rate: 48000,
        channels: 1,
        layout: SampleLayout::Interleaved,
        data: SampleData::I16(vec![tag; 960]),
    }
}

/// 25 chunks into a queue of 20: 20 kept, the rest dropped, order preserved
#[tokio::test]
async fn test_full_queue_drops_and_writer_sees_order() {
    let (producer, consumer) = audio::bounded(20);
    let accepted: Vec<bool> = (0..25).map(|tag| producer.enqueue(tagged_chunk(tag))).collect();

    assert_eq!(producer.len(), 20);
    assert!(producer.dropped() >= 5);
    assert!(accepted[..20].iter().all(|ok| *ok));
    assert!(accepted[20..].iter().all(|ok| !*ok));

    let sink = Arc::new(RecordingAudioSink::new());
    drop(producer);
    let written = audio::run_audio_writer(consumer, Some(sink.clone() as Arc<dyn AudioSink>)).await;

    assert_eq!(written, 20);
    assert_eq!(sink.tags(), (0..20).collect::<Vec<i16>>());
}

#[tokio::test]
async fn test_audio_pump_never_blocks_on_full_queue() {
    let (producer, consumer) = audio::bounded(20);
    let frames = (0..25).map(|tag| TrackRead::Frame(tagged_frame(tag))).collect();

    let stats = tokio::time::timeout(
        Duration::from_secs(2),
        audio::run_audio_pump(Box::new(ScriptedTrack::new(frames)), producer, 1),
    )
    .await
    .expect("pump drains the track without waiting on the queue");

    assert_eq!(stats.frames, 25);
    assert_eq!(stats.enqueued, 20);
    assert_eq!(stats.dropped, 5);
    assert_eq!(consumer.len(), 20);
}

#[tokio::test]
async fn test_headset_stereo_reaches_mono_microphone() {
    let chars = HeadsetCharacteristics::quest();
    let (producer, consumer) = audio::bounded(20);
    let frames = (0..10)
        .map(|n| TrackRead::Frame(synthetic_audio_frame(n, chars.opus_frame_samples)))
        .collect();

    let sink = Arc::new(RecordingAudioSink::new());
    let writer = tokio::spawn(audio::run_audio_writer(
        consumer,
        Some(sink.clone() as Arc<dyn AudioSink>),
    ));
    let stats = audio::run_audio_pump(Box::new(ScriptedTrack::new(frames)), producer, 1).await;
    let written = writer.await.unwrap();

    assert_eq!(stats.frames, 10);
    assert_eq!(written, stats.enqueued);
    assert_eq!(sink.tags().len() as u64, written);
}

#[tokio::test]
async fn test_audio_write_failure_is_not_fatal() {
    let (producer, consumer) = audio::bounded(20);
    for tag in 0..5 {
        producer.enqueue(tagged_chunk(tag));
    }
    drop(producer);

    let sink = Arc::new(RecordingAudioSink::failing_on(vec![2]));
    let written = audio::run_audio_writer(consumer, Some(sink.clone() as Arc<dyn AudioSink>)).await;
    assert_eq!(written, 4);
    assert_eq!(sink.tags(), vec![0, 1, 3, 4]);
}

/// Device whose writes block the calling thread like a real sound card
#[derive(Default)]
struct SlowAudioSink {
    writes: AtomicUsize,
}

impl AudioSink for SlowAudioSink {
    fn write(&self, _chunk: AudioChunk) -> Result<(), RelayError> {
        std::thread::sleep(Duration::from_millis(200));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "slow-sink"
    }
}

/// A write in flight must not hold up the audio pump on the same runtime
#[tokio::test(flavor = "current_thread")]
async fn test_blocking_write_does_not_stall_pump() {
    let (producer, consumer) = audio::bounded(20);
    let sink = Arc::new(SlowAudioSink::default());
    producer.enqueue(tagged_chunk(1));
    let writer = tokio::spawn(audio::run_audio_writer(
        consumer,
        Some(sink.clone() as Arc<dyn AudioSink>),
    ));
    tokio::task::yield_now().await;

    let frames = (0..10).map(|tag| TrackRead::Frame(tagged_frame(tag))).collect();
    let started = Instant::now();
    let stats = audio::run_audio_pump(Box::new(ScriptedTrack::new(frames)), producer, 1).await;
    let elapsed = started.elapsed();

    assert_eq!(stats.frames, 10);
    assert!(
        elapsed < Duration::from_millis(150),
        "pump stalled for {:?} behind a device write",
        elapsed
    );
    assert_eq!(sink.writes.load(Ordering::SeqCst), 0);
    writer.abort();
}

/// 1920x1080 headset video into a 1280x720 camera
#[tokio::test(start_paused = true)]
async fn test_oversized_video_is_resized_for_camera() {
    let camera = RecordingCamera::new();
    let shared = Arc::new(Mutex::new(Some(CameraSink::with_device(
        Box::new(camera.clone()),
        1280,
        720,
        30,
    ))));

    let (width, height) = HeadsetCharacteristics::quest().video_resolution;
    let frames = (0..3)
        .map(|n| TrackRead::Frame(synthetic_video_frame(n, width, height)))
        .collect();
    let stats = video::run_video_pump(Box::new(ScriptedTrack::new(frames)), shared.clone()).await;

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.resized, 3);
    assert_eq!(stats.sent, 3);
    let sent = camera.frames();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|frame| frame.len() == 1280 * 720 * 3));
    assert_eq!(shared.lock().await.as_ref().unwrap().frames_sent(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_matching_video_is_not_resized() {
    let camera = RecordingCamera::new();
    let shared = Arc::new(Mutex::new(Some(CameraSink::with_device(
        Box::new(camera.clone()),
        64,
        48,
        30,
    ))));

    let first = synthetic_video_frame(0, 64, 48);
    let expected = first.data.clone();
    let frames = vec![TrackRead::Frame(first), TrackRead::Frame(synthetic_video_frame(1, 64, 48))];
    let stats = video::run_video_pump(Box::new(ScriptedTrack::new(frames)), shared).await;

    assert_eq!(stats.resized, 0);
    assert_eq!(camera.frames()[0], expected);
}

fn sinks_with(camera: &RecordingCamera, audio: Arc<RecordingAudioSink>) -> MediaSinks {
    MediaSinks {
        camera: Arc::new(Mutex::new(Some(CameraSink::with_device(
            Box::new(camera.clone()),
            64,
            48,
            30,
        )))),
        audio: Some(audio as Arc<dyn AudioSink>),
        audio_channels: 1,
        queue_capacity: audio::DEFAULT_QUEUE_CAPACITY,
    }
}

/// `failed` closes the peer once, cancels every task and notifies once
#[tokio::test]
async fn test_failed_connection_tears_down_session() {
    let factory = FakePeerFactory::new();
    let (notifier, mut status_rx) = StatusNotifier::channel();
    let camera = RecordingCamera::new();
    let sinks = sinks_with(&camera, Arc::new(RecordingAudioSink::new()));
    let mut session = Session::start(&factory, &sinks, &notifier).await.unwrap();
    let peer = factory.last_peer().unwrap();

    session.handle_offer("v=0\r\n".to_string()).await.unwrap();
    peer.emit_track(IncomingTrack::Video(Box::new(
        ScriptedTrack::new(vec![TrackRead::Frame(synthetic_video_frame(0, 64, 48))]).then_hang(),
    )));
    peer.emit_track(IncomingTrack::Audio(Box::new(
        ScriptedTrack::new(vec![TrackRead::Frame(tagged_frame(7))]).then_hang(),
    )));
    peer.emit_state(ConnectionState::Connected);

    // Connecting (from the offer), two tracks, connected
    for _ in 0..4 {
        let event = session.next_event().await;
        assert_eq!(session.handle_event(event).await, SessionOutcome::Continue);
    }
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.task_count(), 3);

    // The video pump holds the camera while it runs
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sinks.camera.try_lock().is_err());

    peer.emit_state(ConnectionState::Failed);
    let event = session.next_event().await;
    assert_eq!(
        session.handle_event(event).await,
        SessionOutcome::Ended(ConnectionState::Failed)
    );

    assert_eq!(session.task_count(), 0);
    assert!(session.is_terminated());
    assert_eq!(peer.close_count(), 1);
    // Cancelled pumps released the camera
    assert!(sinks.camera.try_lock().is_ok());

    // Nothing more after the failure
    session.shutdown().await;
    assert_eq!(peer.close_count(), 1);

    let mut statuses = Vec::new();
    while let Ok(event) = status_rx.try_recv() {
        statuses.push(event.status);
    }
    assert_eq!(statuses, vec![ServerStatus::Connected, ServerStatus::Failed]);
    assert_eq!(
        statuses.iter().filter(|s| **s == ServerStatus::Failed).count(),
        1
    );
}

#[tokio::test]
async fn test_offer_moves_session_to_connecting() {
    let factory = FakePeerFactory::new();
    let (notifier, _status_rx) = StatusNotifier::channel();
    let mut session = Session::start(&factory, &relaycam::testing::inactive_sinks(), &notifier)
        .await
        .unwrap();

    let answer = session.handle_offer("v=0\r\n".to_string()).await.unwrap();
    assert!(!answer.is_empty());
    assert!(session.is_negotiated());

    let event = session.next_event().await;
    assert!(matches!(event, PeerEvent::State(ConnectionState::Connecting)));
    session.handle_event(event).await;
    assert_eq!(session.state(), ConnectionState::Connecting);
    session.shutdown().await;
}

#[tokio::test]
async fn test_pending_event_stays_pending() {
    let factory = FakePeerFactory::new();
    let (notifier, _status_rx) = StatusNotifier::channel();
    let mut session = Session::start(&factory, &relaycam::testing::inactive_sinks(), &notifier)
        .await
        .unwrap();

    let mut next = tokio_test::task::spawn(session.next_event());
    tokio_test::assert_pending!(next.poll());
}
