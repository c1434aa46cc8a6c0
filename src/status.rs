//! Server status notifications
//!
//! The notifier is the sending half of a channel; whatever consumes it (a
//! tray UI, the CLI log observer) runs on its own task and never touches the
//! session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::webrtc::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Connected,
    Disconnected,
    Failed,
    Closed,
    Stopped,
}

impl ServerStatus {
    /// Status published for a connection state, if any
    pub fn from_connection_state(state: ConnectionState) -> Option<Self> {
        match state {
            ConnectionState::Connected => Some(ServerStatus::Connected),
            ConnectionState::Disconnected => Some(ServerStatus::Disconnected),
            ConnectionState::Failed => Some(ServerStatus::Failed),
            ConnectionState::Closed => Some(ServerStatus::Closed),
            ConnectionState::Idle | ConnectionState::Connecting => None,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerStatus::Running => "running",
            ServerStatus::Connected => "connected",
            ServerStatus::Disconnected => "disconnected",
            ServerStatus::Failed => "failed",
            ServerStatus::Closed => "closed",
            ServerStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: ServerStatus,
    pub timestamp: DateTime<Utc>,
    /// Session the status belongs to, if any
    pub session_id: Option<String>,
}

/// Sending half handed to sessions and the server
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish a status. A gone observer is not an error.
    pub fn notify(&self, status: ServerStatus, session_id: Option<&str>) {
        let event = StatusEvent {
            status,
            timestamp: Utc::now(),
            session_id: session_id.map(str::to_string),
        };
        if self.tx.send(event).is_err() {
            log::debug!("No status observer for '{}'", status);
        }
    }
}

/// Consumer of status events
#[async_trait]
pub trait StatusObserver: Send {
    async fn on_status(&mut self, event: StatusEvent);
}

/// Observer that writes each status to the log
#[derive(Debug, Default)]
pub struct LogObserver;

#[async_trait]
impl StatusObserver for LogObserver {
    async fn on_status(&mut self, event: StatusEvent) {
        match event.status {
            ServerStatus::Failed => log::warn!(
                "Status: {} at {}",
                event.status,
                event.timestamp.to_rfc3339()
            ),
            _ => log::info!(
                "Status: {} at {}",
                event.status,
                event.timestamp.to_rfc3339()
            ),
        }
    }
}

/// Feed every event to `observer` until all notifiers are dropped
pub async fn run_observer<O: StatusObserver>(
    mut events: mpsc::UnboundedReceiver<StatusEvent>,
    mut observer: O,
) {
    while let Some(event) = events.recv().await {
        observer.on_status(event).await;
    }
}
