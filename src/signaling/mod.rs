//! WebSocket signaling: message schema and the per-client endpoint

mod endpoint;
mod protocol;

pub use endpoint::{ClientGate, ClientSlot, ClientTracker, InboundMessage, SignalingEndpoint};
pub use protocol::SignalMessage;
