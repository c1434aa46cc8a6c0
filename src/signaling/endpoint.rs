//! Per-client signaling loop
//!
//! The endpoint owns the client's `Session`. It turns text frames into peer
//! connection operations, forwards peer events to the session, and tears the
//! session down when the channel closes or a newer client takes over.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};

use super::protocol::SignalMessage;
use crate::session::{MediaSinks, Session, SessionOutcome};
use crate::status::StatusNotifier;
use crate::webrtc::{PeerEvent, PeerFactory};

/// Transport-neutral inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(String),
    /// Binary, ping or pong; ignored
    Other,
    Close,
    Error(String),
}

/// Admits one client at a time; admitting a new one preempts the previous
#[derive(Debug, Clone, Default)]
pub struct ClientGate {
    inner: Arc<Mutex<GateState>>,
}

#[derive(Debug, Default)]
struct GateState {
    current: Option<oneshot::Sender<()>>,
    closed: bool,
}

impl ClientGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new client. The returned receiver fires when it must leave.
    ///
    /// Once the gate is closed the receiver is already resolved.
    pub fn admit(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state();
        if state.closed {
            let _ = tx.send(());
            return rx;
        }
        if let Some(previous) = state.current.replace(tx) {
            if previous.send(()).is_ok() {
                log::info!("New client connected, closing the previous one");
            }
        }
        rx
    }

    /// Ask the current client, if any, to leave and turn away later ones
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        if let Some(current) = state.current.take() {
            let _ = current.send(());
        }
    }
}

/// Counts live signaling clients so shutdown can wait for their sessions
#[derive(Debug, Clone)]
pub struct ClientTracker {
    active: Arc<watch::Sender<usize>>,
}

/// Held by one client for as long as it may touch the session or the sinks
#[derive(Debug)]
pub struct ClientSlot {
    active: Arc<watch::Sender<usize>>,
}

impl ClientTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    pub fn register(&self) -> ClientSlot {
        self.active.send_modify(|n| *n += 1);
        ClientSlot {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Resolve once every slot has been dropped
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ClientTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

pub struct SignalingEndpoint {
    factory: Arc<dyn PeerFactory>,
    sinks: MediaSinks,
    notifier: StatusNotifier,
}

impl SignalingEndpoint {
    pub fn new(factory: Arc<dyn PeerFactory>, sinks: MediaSinks, notifier: StatusNotifier) -> Self {
        Self {
            factory,
            sinks,
            notifier,
        }
    }

    /// Serve one client until its channel closes or it is preempted.
    ///
    /// Replies are pushed to `outbound` as JSON text.
    pub async fn run<S>(&self, mut inbound: S, outbound: mpsc::Sender<String>, mut preempted: oneshot::Receiver<()>)
    where
        S: Stream<Item = InboundMessage> + Unpin + Send,
    {
        // Observers are registered at creation, before the first message is read
        let Some(first) = self.new_session().await else {
            return;
        };
        let mut session = Some(first);

        loop {
            tokio::select! {
                message = inbound.next() => match message {
                    Some(InboundMessage::Text(text)) => {
                        self.handle_text(&mut session, &text, &outbound).await;
                    }
                    Some(InboundMessage::Other) => {}
                    Some(InboundMessage::Error(e)) => {
                        log::warn!("Signaling channel error: {}", e);
                        break;
                    }
                    Some(InboundMessage::Close) | None => {
                        log::info!("Signaling channel closed by client");
                        break;
                    }
                },
                event = next_session_event(&mut session) => {
                    if let Some(current) = session.as_mut() {
                        if let SessionOutcome::Ended(state) = current.handle_event(event).await {
                            log::info!("Session {} ended ({}), waiting for a new offer", current.id(), state);
                            session = None;
                        }
                    }
                },
                _ = &mut preempted => {
                    log::info!("Signaling channel closed by server");
                    break;
                }
            }
        }

        if let Some(mut current) = session.take() {
            current.shutdown().await;
        }
    }

    async fn new_session(&self) -> Option<Session> {
        match Session::start(self.factory.as_ref(), &self.sinks, &self.notifier).await {
            Ok(session) => Some(session),
            Err(e) => {
                log::error!("Failed to create peer connection: {}", e);
                None
            }
        }
    }

    async fn handle_text(&self, session: &mut Option<Session>, text: &str, outbound: &mpsc::Sender<String>) {
        let message = match SignalMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Discarding signaling message: {}", e);
                return;
            }
        };

        match message {
            SignalMessage::Offer { sdp } => {
                let reusable = session.as_ref().is_some_and(|s| !s.is_negotiated() && !s.is_terminated());
                if !reusable {
                    if let Some(mut previous) = session.take() {
                        log::info!("New offer on a used connection, replacing session {}", previous.id());
                        previous.shutdown().await;
                    }
                    *session = self.new_session().await;
                }
                let Some(current) = session.as_mut() else {
                    return;
                };

                let answer = match current.handle_offer(sdp).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        log::warn!("Offer rejected: {}", e);
                        return;
                    }
                };
                match (SignalMessage::Answer { sdp: answer }).to_json() {
                    Ok(reply) => {
                        if outbound.send(reply).await.is_err() {
                            log::debug!("Client went away before the answer was sent");
                        } else {
                            log::info!("Answer sent for session {}", current.id());
                        }
                    }
                    Err(e) => log::error!("Failed to encode answer: {}", e),
                }
            }
            SignalMessage::Ice { candidate } => {
                if candidate.candidate.is_empty() {
                    log::debug!("Ignoring end-of-candidates marker");
                    return;
                }
                let Some(current) = session.as_ref() else {
                    log::debug!("No session for ICE candidate, dropping it");
                    return;
                };
                if let Err(e) = current.add_ice_candidate(candidate).await {
                    log::warn!("ICE candidate rejected: {}", e);
                }
            }
            SignalMessage::Answer { .. } => {
                log::warn!("Discarding unexpected answer from client");
            }
        }
    }
}

async fn next_session_event(session: &mut Option<Session>) -> PeerEvent {
    match session {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admit_preempts_previous_client() {
        let gate = ClientGate::new();
        let mut first = gate.admit();
        let mut second = gate.admit();
        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_gate_turns_clients_away() {
        let gate = ClientGate::new();
        let mut current = gate.admit();
        gate.close();
        assert!(current.try_recv().is_ok());

        let late = gate.admit();
        assert!(tokio::time::timeout(Duration::from_millis(50), late).await.is_ok());
    }

    #[tokio::test]
    async fn test_tracker_waits_for_every_slot() {
        let tracker = ClientTracker::new();
        let first = tracker.register();
        let second = tracker.register();
        assert_eq!(tracker.active(), 2);

        drop(first);
        let waiting = tokio::time::timeout(Duration::from_millis(50), tracker.wait_idle()).await;
        assert!(waiting.is_err());

        drop(second);
        tokio::time::timeout(Duration::from_millis(50), tracker.wait_idle())
            .await
            .expect("idle once all slots are gone");
        assert_eq!(tracker.active(), 0);
    }
}
