pub mod peer;
/// Connection state machine driven by peer notifications
pub mod state;
/// RTP tracks decoded into frame sequences
pub mod track;

pub use peer::{IceCandidate, PeerConnection, PeerEvent, PeerEvents, PeerFactory, WebRtcPeer, WebRtcPeerFactory};
pub use state::ConnectionState;
pub use track::{RtpAudioSource, RtpVideoSource};
