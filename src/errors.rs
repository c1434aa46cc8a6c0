use std::path::Path;

/// Errors surfaced by the relay.
///
/// Most variants carry a human-readable message; callers that only need to
/// log an error can rely on `Display`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Initialization error: {0}")]
    InitializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Signaling error: {0}")]
    SignalingError(String),
    #[error("Peer connection error: {0}")]
    PeerError(String),
    #[error("Decode error: {0}")]
    DecodeError(String),
    #[error("Device error: {0}")]
    DeviceError(String),
    #[error("TLS error: {0}")]
    TlsError(String),
    #[error(
        "Certificate material missing ({cert} / {key}). \
         Generate a certificate first (self-signed or through your tailnet) \
         and place cert.pem and key.pem at the configured paths."
    )]
    MissingCertificate { cert: String, key: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn missing_certificate(cert: &Path, key: &Path) -> Self {
        RelayError::MissingCertificate {
            cert: cert.display().to_string(),
            key: key.display().to_string(),
        }
    }
}

impl From<webrtc::Error> for RelayError {
    fn from(e: webrtc::Error) -> Self {
        RelayError::PeerError(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::SignalingError(e.to_string())
    }
}
