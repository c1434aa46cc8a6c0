//! Peer connection state machine
//!
//! ```text
//! idle -> connecting -> connected
//!           |               |
//!           +---------------+--> disconnected | failed | closed
//! ```
//!
//! There is no way back to `connecting`; a new offer means a new session.

use serde::{Deserialize, Serialize};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the state graph
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Connected, Disconnected)
                | (Connected, Failed)
                | (Connected, Closed)
        )
    }

    /// States that end the session
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => ConnectionState::Idle,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 6] = [Idle, Connecting, Connected, Disconnected, Failed, Closed];

    #[test]
    fn test_happy_path() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Failed));
    }

    #[test]
    fn test_connected_only_from_connecting() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Connected), from == Connecting, "{}", from);
        }
    }

    #[test]
    fn test_no_reentry_to_connecting() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Connecting), from == Idle, "{}", from);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_from_rtc_state() {
        assert_eq!(ConnectionState::from(RTCPeerConnectionState::New), Idle);
        assert_eq!(ConnectionState::from(RTCPeerConnectionState::Failed), Failed);
    }

    proptest! {
        /// Walking any sequence of notifications through the guard only ever takes allowed edges
        #[test]
        fn guarded_walk_uses_allowed_edges(steps in proptest::collection::vec(0usize..6, 0..40)) {
            let mut current = Idle;
            for step in steps {
                let next = ALL[step];
                if current.can_transition_to(next) {
                    if next == Connected {
                        prop_assert_eq!(current, Connecting);
                    }
                    current = next;
                }
            }
        }
    }
}
