//! Configuration management for relaycam
//!
//! Provides loading, saving and validation of the server configuration:
//! how the server is reached, where the TLS material lives, and the fixed
//! formats of the virtual camera and microphone.

use crate::errors::RelayError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub connection: ConnectionConfig,
    pub tls: TlsConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub webrtc: WebRtcConfig,
    pub server: ServerConfig,
}

/// How the certificate was provisioned, which decides the advertised host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateMode {
    SelfSigned,
    Tailscale,
}

/// Externally visible address of the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub mode: CertificateMode,
    /// Host name issued for the certificate (tailscale mode); empty means LAN IP
    pub hostname: String,
    /// Listening port
    pub port: u16,
}

/// Certificate and private key locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Virtual camera format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Output device node (v4l2loopback on Linux)
    pub device: String,
}

/// Virtual microphone format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per device block
    pub block_size: u32,
    /// Chunks held between the audio pump and the writer
    pub queue_capacity: usize,
    /// Substring of the preferred output device name
    pub device_hint: String,
}

/// Peer connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<String>,
    /// Upper bound on waiting for ICE gathering before sending the answer
    pub gather_timeout_ms: u64,
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    /// Directory holding the client page (index.html)
    pub static_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                mode: CertificateMode::SelfSigned,
                hostname: String::new(),
                port: 8443,
            },
            tls: TlsConfig {
                cert_path: PathBuf::from("cert.pem"),
                key_path: PathBuf::from("key.pem"),
            },
            video: VideoConfig {
                width: 1280,
                height: 720,
                fps: 30,
                device: "/dev/video10".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 48000,
                channels: 1,
                block_size: 2048,
                queue_capacity: 20,
                device_hint: "CABLE Input".to_string(),
            },
            webrtc: WebRtcConfig {
                ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
                gather_timeout_ms: 3000,
            },
            server: ServerConfig {
                bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                static_dir: PathBuf::from("static"),
            },
        }
    }
}

impl RelayConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| RelayError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: RelayConfig = toml::from_str(&contents)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RelayError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RelayError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RelayError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RelayError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("relaycam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.connection.port == 0 {
            return Err("Port must be non-zero".to_string());
        }
        if self.connection.mode == CertificateMode::Tailscale && self.connection.hostname.is_empty()
        {
            return Err("Tailscale mode requires a hostname".to_string());
        }

        if self.video.width == 0 || self.video.height == 0 {
            return Err("Invalid video resolution".to_string());
        }
        if self.video.fps == 0 || self.video.fps > 240 {
            return Err("Invalid video FPS (must be 1-240)".to_string());
        }

        // Opus decodes natively at these rates only
        if ![8000, 12000, 16000, 24000, 48000].contains(&self.audio.sample_rate) {
            return Err("Audio sample rate must be one of 8000, 12000, 16000, 24000, 48000".to_string());
        }
        if self.audio.channels == 0 || self.audio.channels > 2 {
            return Err("Audio channels must be 1 or 2".to_string());
        }
        if self.audio.block_size == 0 {
            return Err("Audio block size must be non-zero".to_string());
        }
        if self.audio.queue_capacity == 0 {
            return Err("Audio queue capacity must be non-zero".to_string());
        }

        Ok(())
    }

    /// URL the headset browser should open
    pub fn advertised_url(&self) -> String {
        // Self-signed certificates are issued for the LAN IP unless a name was given
        let host = if self.connection.hostname.is_empty() {
            local_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "localhost".to_string())
        } else {
            self.connection.hostname.clone()
        };
        format!("https://{}:{}", host, self.connection.port)
    }
}

/// LAN address used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which
/// interface would route to the target.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
