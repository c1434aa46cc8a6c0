//! One client's relay session
//!
//! A session owns exactly one peer connection, the current connection state,
//! and the video pump, audio pump and audio writer tasks. It is owned by the
//! signaling endpoint task that created it.
//!
//! Teardown happens once: the peer connection is closed, every task is
//! aborted and joined, and at most one status is published. After that the
//! session is inert.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::audio::{self, AudioQueueProducer, AudioSink};
use crate::errors::RelayError;
use crate::status::{ServerStatus, StatusNotifier};
use crate::types::IncomingTrack;
use crate::video::{self, SharedCamera};
use crate::webrtc::{ConnectionState, IceCandidate, PeerConnection, PeerEvent, PeerEvents, PeerFactory};

/// Device handles shared by successive sessions
#[derive(Clone)]
pub struct MediaSinks {
    pub camera: SharedCamera,
    /// `None` when the output device could not be opened
    pub audio: Option<Arc<dyn AudioSink>>,
    pub audio_channels: u16,
    pub queue_capacity: usize,
}

/// What the endpoint should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Continue,
    /// The session tore itself down after reaching this state
    Ended(ConnectionState),
}

pub struct Session {
    id: String,
    peer: Arc<dyn PeerConnection>,
    events: Option<PeerEvents>,
    state: ConnectionState,
    negotiated: bool,
    sinks: MediaSinks,
    notifier: StatusNotifier,
    audio_producer: Option<AudioQueueProducer>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    terminated: bool,
}

impl Session {
    /// Create the peer connection (observers included) and start the audio writer
    pub async fn start(
        factory: &dyn PeerFactory,
        sinks: &MediaSinks,
        notifier: &StatusNotifier,
    ) -> Result<Self, RelayError> {
        let (peer, events) = factory.create().await?;
        let id = peer.id().to_string();

        let (producer, consumer) = audio::bounded(sinks.queue_capacity);
        let writer = tokio::spawn({
            let sink = sinks.audio.clone();
            async move {
                audio::run_audio_writer(consumer, sink).await;
            }
        });

        log::info!("Session {} started", id);
        Ok(Self {
            id,
            peer,
            events: Some(events),
            state: ConnectionState::Idle,
            negotiated: false,
            sinks: sinks.clone(),
            notifier: notifier.clone(),
            audio_producer: Some(producer),
            tasks: vec![("audio writer", writer)],
            terminated: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether an offer has already been answered on this session
    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Tasks still owned by the session
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub async fn handle_offer(&mut self, sdp: String) -> Result<String, RelayError> {
        if self.terminated {
            return Err(RelayError::PeerError(format!("session {} is closed", self.id)));
        }
        let answer = self.peer.accept_offer(sdp).await?;
        self.negotiated = true;
        Ok(answer)
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RelayError> {
        self.peer.add_ice_candidate(candidate).await
    }

    /// Next observer event. Never resolves once the peer's event stream is gone.
    pub async fn next_event(&mut self) -> PeerEvent {
        if let Some(events) = self.events.as_mut() {
            if let Some(event) = events.recv().await {
                return event;
            }
            self.events = None;
        }
        std::future::pending().await
    }

    pub async fn handle_event(&mut self, event: PeerEvent) -> SessionOutcome {
        match event {
            PeerEvent::Track(track) => {
                self.start_pump(track);
                SessionOutcome::Continue
            }
            PeerEvent::State(state) => self.apply_state(state).await,
        }
    }

    async fn apply_state(&mut self, next: ConnectionState) -> SessionOutcome {
        if self.terminated {
            return SessionOutcome::Ended(self.state);
        }
        if next == self.state {
            return SessionOutcome::Continue;
        }
        if !self.state.can_transition_to(next) {
            log::warn!(
                "Session {}: ignoring invalid transition {} -> {}",
                self.id,
                self.state,
                next
            );
            return SessionOutcome::Continue;
        }

        log::info!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;

        if next.is_terminal() {
            self.teardown(ServerStatus::from_connection_state(next)).await;
            return SessionOutcome::Ended(next);
        }
        if let Some(status) = ServerStatus::from_connection_state(next) {
            self.notifier.notify(status, Some(&self.id));
        }
        SessionOutcome::Continue
    }

    fn start_pump(&mut self, track: IncomingTrack) {
        if self.terminated {
            return;
        }
        match track {
            IncomingTrack::Video(source) => {
                let camera = self.sinks.camera.clone();
                let handle = tokio::spawn(async move {
                    video::run_video_pump(source, camera).await;
                });
                self.tasks.push(("video pump", handle));
            }
            IncomingTrack::Audio(source) => {
                let Some(producer) = self.audio_producer.clone() else {
                    return;
                };
                let channels = self.sinks.audio_channels;
                let handle = tokio::spawn(async move {
                    audio::run_audio_pump(source, producer, channels).await;
                });
                self.tasks.push(("audio pump", handle));
            }
        }
    }

    /// Tear down because the signaling channel went away.
    ///
    /// Publishes `closed` unless the session never left `idle` or already ended.
    pub async fn shutdown(&mut self) {
        let status = (self.state != ConnectionState::Idle).then_some(ServerStatus::Closed);
        self.teardown(status).await;
    }

    async fn teardown(&mut self, status: Option<ServerStatus>) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.events = None;

        if let Err(e) = self.peer.close().await {
            log::warn!("Session {}: closing peer connection failed: {}", self.id, e);
        }

        self.audio_producer = None;
        for (name, handle) in self.tasks.drain(..) {
            handle.abort();
            match handle.await {
                Ok(()) => log::debug!("Session {}: {} already finished", self.id, name),
                Err(e) if e.is_cancelled() => log::debug!("Session {}: {} cancelled", self.id, name),
                Err(e) => log::warn!("Session {}: {} panicked: {}", self.id, name, e),
            }
        }

        if let Some(status) = status {
            self.notifier.notify(status, Some(&self.id));
        }
        log::info!("Session {} torn down", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
