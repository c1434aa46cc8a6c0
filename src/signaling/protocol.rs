//! Signaling message schema
//!
//! ```json
//! {"type":"offer","sdp":"v=0..."}
//! {"type":"answer","sdp":"v=0..."}
//! {"type":"ice","candidate":{"candidate":"...","sdpMid":"0","sdpMLineIndex":0}}
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::webrtc::IceCandidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Ice { candidate: IceCandidate },
}

impl SignalMessage {
    /// Parse one text frame. Unknown types and missing fields are errors.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}
