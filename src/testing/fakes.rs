//! In-memory stand-ins for the peer connection, tracks and devices

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioSink;
use crate::errors::RelayError;
use crate::session::MediaSinks;
use crate::types::{AudioChunk, IncomingTrack, TrackRead, TrackSource};
use crate::video::VirtualCamera;
use crate::webrtc::{ConnectionState, IceCandidate, PeerConnection, PeerEvent, PeerEvents, PeerFactory};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Track that replays a fixed script, then ends (or hangs, if asked)
pub struct ScriptedTrack<F> {
    script: VecDeque<TrackRead<F>>,
    hang_at_end: bool,
}

impl<F> ScriptedTrack<F> {
    pub fn new(script: Vec<TrackRead<F>>) -> Self {
        Self {
            script: script.into(),
            hang_at_end: false,
        }
    }

    /// Stay pending after the script instead of reporting end of track
    pub fn then_hang(mut self) -> Self {
        self.hang_at_end = true;
        self
    }
}

#[async_trait]
impl<F: Send> TrackSource<F> for ScriptedTrack<F> {
    async fn next_frame(&mut self) -> TrackRead<F> {
        tokio::task::yield_now().await;
        match self.script.pop_front() {
            Some(read) => read,
            None if self.hang_at_end => std::future::pending().await,
            None => TrackRead::EndOfTrack,
        }
    }
}

/// Camera that keeps every frame it is sent
#[derive(Clone, Default)]
pub struct RecordingCamera {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.frames).clone()
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

impl VirtualCamera for RecordingCamera {
    fn name(&self) -> &str {
        "recording-camera"
    }

    fn send(&mut self, rgb: &[u8]) -> Result<(), RelayError> {
        lock(&self.frames).push(rgb.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        *lock(&self.closed) = true;
    }
}

/// Audio sink that records the first sample of each chunk as its tag
#[derive(Default)]
pub struct RecordingAudioSink {
    tags: Mutex<Vec<i16>>,
    fail_tags: Vec<i16>,
}

impl RecordingAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose writes fail for chunks tagged with any of `tags`
    pub fn failing_on(tags: Vec<i16>) -> Self {
        Self {
            tags: Mutex::new(Vec::new()),
            fail_tags: tags,
        }
    }

    pub fn tags(&self) -> Vec<i16> {
        lock(&self.tags).clone()
    }
}

impl AudioSink for RecordingAudioSink {
    fn write(&self, chunk: AudioChunk) -> Result<(), RelayError> {
        let tag = chunk.samples.first().copied().unwrap_or_default();
        if self.fail_tags.contains(&tag) {
            return Err(RelayError::DeviceError(format!("scripted failure for chunk {}", tag)));
        }
        lock(&self.tags).push(tag);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-sink"
    }
}

/// Sinks with no devices behind them
pub fn inactive_sinks() -> MediaSinks {
    MediaSinks {
        camera: Arc::new(tokio::sync::Mutex::new(None)),
        audio: None,
        audio_channels: 1,
        queue_capacity: crate::audio::DEFAULT_QUEUE_CAPACITY,
    }
}

/// Answer returned for every valid offer
pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=relaycam-fake\r\nt=0 0\r\n";

/// Peer connection that records calls and emits scripted events
pub struct FakePeer {
    id: String,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    offers: Mutex<Vec<String>>,
    candidates: Mutex<Vec<IceCandidate>>,
    close_count: Mutex<usize>,
    on_offer: Vec<ConnectionState>,
}

impl FakePeer {
    pub fn offers(&self) -> Vec<String> {
        lock(&self.offers).clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        lock(&self.candidates).clone()
    }

    pub fn close_count(&self) -> usize {
        *lock(&self.close_count)
    }

    /// Deliver an event as if an observer fired
    pub fn emit(&self, event: PeerEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn emit_state(&self, state: ConnectionState) {
        self.emit(PeerEvent::State(state));
    }

    pub fn emit_track(&self, track: IncomingTrack) {
        self.emit(PeerEvent::Track(track));
    }

    /// Drop the event sender, ending the event stream
    pub fn end_events(&self) {
        lock(&self.events).take();
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn accept_offer(&self, sdp: String) -> Result<String, RelayError> {
        if !sdp.starts_with("v=0") {
            return Err(RelayError::PeerError("invalid SDP offer".to_string()));
        }
        lock(&self.offers).push(sdp);
        for state in &self.on_offer {
            self.emit_state(*state);
        }
        Ok(FAKE_ANSWER_SDP.to_string())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RelayError> {
        lock(&self.candidates).push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), RelayError> {
        *lock(&self.close_count) += 1;
        self.emit_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Factory handing out `FakePeer`s; clones share the created peers
#[derive(Clone)]
pub struct FakePeerFactory {
    peers: Arc<Mutex<Vec<Arc<FakePeer>>>>,
    on_offer: Vec<ConnectionState>,
}

impl FakePeerFactory {
    /// Peers move to `connecting` when they accept an offer
    pub fn new() -> Self {
        Self::with_offer_states(vec![ConnectionState::Connecting])
    }

    /// Peers emit `states` when they accept an offer
    pub fn with_offer_states(states: Vec<ConnectionState>) -> Self {
        Self {
            peers: Arc::new(Mutex::new(Vec::new())),
            on_offer: states,
        }
    }

    pub fn created(&self) -> usize {
        lock(&self.peers).len()
    }

    pub fn peer(&self, index: usize) -> Option<Arc<FakePeer>> {
        lock(&self.peers).get(index).cloned()
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        lock(&self.peers).last().cloned()
    }
}

impl Default for FakePeerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    async fn create(&self) -> Result<(Arc<dyn PeerConnection>, PeerEvents), RelayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(FakePeer {
            id: uuid::Uuid::new_v4().to_string(),
            events: Mutex::new(Some(tx)),
            offers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            close_count: Mutex::new(0),
            on_offer: self.on_offer.clone(),
        });
        lock(&self.peers).push(peer.clone());
        Ok((peer, rx))
    }
}
