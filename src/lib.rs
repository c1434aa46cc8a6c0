//! relaycam: relay a headset browser's camera and microphone into local virtual devices
//!
//! The headset opens the served page, which publishes its camera and
//! microphone over WebRTC. The relay decodes both tracks and forwards them:
//! video into a virtual camera (v4l2loopback on Linux), audio into a virtual
//! audio cable. Conferencing software then sees an ordinary webcam and mic.
//!
//! # Pieces
//! - [`server::RelayServer`]: HTTPS + WebSocket signaling, one client at a time
//! - [`session::Session`]: one peer connection and its pump tasks
//! - [`video`] / [`audio`]: decode, normalize, pace and write
//! - [`status`]: connection status events for a UI
//!
//! # Usage
//! ```rust,ignore
//! let config = relaycam::config::RelayConfig::load_or_default();
//! let (notifier, events) = relaycam::status::StatusNotifier::channel();
//! tokio::spawn(relaycam::status::run_observer(events, relaycam::status::LogObserver));
//! relaycam::server::RelayServer::new(config, notifier).run().await?;
//! ```
pub mod audio;
pub mod config;
pub mod errors;
pub mod server;
pub mod session;
pub mod signaling;
pub mod status;
pub mod timing;
pub mod types;
pub mod video;
pub mod webrtc;

// Testing utilities - fakes and synthetic media for offline testing
pub mod testing;

pub use config::RelayConfig;
pub use errors::RelayError;
pub use server::RelayServer;
pub use status::{ServerStatus, StatusNotifier};

/// Initialize logging; `RUST_LOG` overrides the default `relaycam=info`
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "relaycam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
