use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_remote::TrackRemote;

use super::state::ConnectionState;
use super::track::{RtpAudioSource, RtpVideoSource};
use crate::config::{AudioConfig, WebRtcConfig};
use crate::errors::RelayError;
use crate::timing::MediaClock;
use crate::types::IncomingTrack;

/// How often a keyframe is requested from the sender
const KEYFRAME_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

/// ICE candidate as exchanged with the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        }
    }
}

/// Notifications from a peer connection's observers
#[derive(Debug)]
pub enum PeerEvent {
    Track(IncomingTrack),
    State(ConnectionState),
}

pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// Answer-side peer connection capability
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn id(&self) -> &str;

    /// Apply a remote offer and return the local answer SDP, with candidates
    async fn accept_offer(&self, sdp: String) -> Result<String, RelayError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RelayError>;

    async fn close(&self) -> Result<(), RelayError>;
}

/// Creates peer connections with their observers already registered
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self) -> Result<(Arc<dyn PeerConnection>, PeerEvents), RelayError>;
}

/// Peer connection backed by the `webrtc` crate
pub struct WebRtcPeer {
    id: String,
    peer_connection: Arc<RTCPeerConnection>,
    gather_timeout: Duration,
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn accept_offer(&self, sdp: String) -> Result<String, RelayError> {
        log::info!("Applying remote offer for peer {}", self.id);

        let offer = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(offer).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        let mut gathering_complete = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(answer).await?;

        // The answer is sent once; it must carry the candidates
        if tokio::time::timeout(self.gather_timeout, gathering_complete.recv())
            .await
            .is_err()
        {
            log::warn!(
                "ICE gathering for peer {} did not finish within {:?}, answering with partial candidates",
                self.id,
                self.gather_timeout
            );
        }

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| RelayError::PeerError("local description unavailable".to_string()))?;
        Ok(local.sdp)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), RelayError> {
        log::debug!("Adding ICE candidate for peer {}: {}", self.id, candidate.candidate);
        self.peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(RelayError::from)
    }

    async fn close(&self) -> Result<(), RelayError> {
        log::info!("Closing peer connection {}", self.id);
        self.peer_connection.close().await.map_err(RelayError::from)
    }
}

/// Builds `WebRtcPeer`s that decode incoming media for the local sinks
pub struct WebRtcPeerFactory {
    ice_servers: Vec<String>,
    gather_timeout: Duration,
    audio_sample_rate: u32,
    audio_channels: u16,
    clock: MediaClock,
}

impl WebRtcPeerFactory {
    pub fn new(webrtc: &WebRtcConfig, audio: &AudioConfig) -> Self {
        Self {
            ice_servers: webrtc.ice_servers.clone(),
            gather_timeout: Duration::from_millis(webrtc.gather_timeout_ms),
            audio_sample_rate: audio.sample_rate,
            audio_channels: audio.channels,
            clock: MediaClock::new(),
        }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self) -> Result<(Arc<dyn PeerConnection>, PeerEvents), RelayError> {
        let api = build_api()?;

        let rtc_config = RTCConfiguration {
            ice_servers: if self.ice_servers.is_empty() {
                Vec::new()
            } else {
                vec![RTCIceServer {
                    urls: self.ice_servers.clone(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let id = uuid::Uuid::new_v4().to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Observers go in before the connection is handed out
        let state_tx = events_tx.clone();
        let peer_id = id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                log::debug!("Peer {} reported state {}", peer_id, state);
                let _ = state_tx.send(PeerEvent::State(state.into()));
                Box::pin(async {})
            },
        ));

        let track_tx = events_tx;
        let weak_pc = Arc::downgrade(&peer_connection);
        let clock = self.clock.clone();
        let (sample_rate, channels) = (self.audio_sample_rate, self.audio_channels);
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let track_tx = track_tx.clone();
            let weak_pc = weak_pc.clone();
            let clock = clock.clone();
            Box::pin(async move {
                log::info!(
                    "Track received: kind={} codec={} ssrc={}",
                    track.kind(),
                    track.codec().capability.mime_type,
                    track.ssrc()
                );

                let incoming = match track.kind() {
                    RTPCodecType::Video => {
                        spawn_keyframe_requests(weak_pc, track.ssrc());
                        RtpVideoSource::new(track, clock)
                            .map(|source| IncomingTrack::Video(Box::new(source)))
                    }
                    RTPCodecType::Audio => RtpAudioSource::new(track, sample_rate, channels)
                        .map(|source| IncomingTrack::Audio(Box::new(source))),
                    _ => return,
                };

                match incoming {
                    Ok(incoming) => {
                        let _ = track_tx.send(PeerEvent::Track(incoming));
                    }
                    Err(e) => log::warn!("Ignoring track without a usable decoder: {}", e),
                }
            })
        }));

        log::info!("Created peer connection {}", id);
        let peer = WebRtcPeer {
            id,
            peer_connection,
            gather_timeout: self.gather_timeout,
        };
        Ok((Arc::new(peer), events_rx))
    }
}

/// Media engine limited to the codecs the relay can decode
fn build_api() -> Result<API, RelayError> {
    let mut media_engine = MediaEngine::default();

    for (payload_type, profile) in [(102u8, "42001f"), (125u8, "42e01f")] {
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: format!(
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id={}",
                        profile
                    ),
                    rtcp_feedback: vec![],
                },
                payload_type,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;
    }

    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            payload_type: 111,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Periodic PLI so the decoder can resync after loss; stops with the connection
fn spawn_keyframe_requests(peer_connection: Weak<RTCPeerConnection>, media_ssrc: u32) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(KEYFRAME_REQUEST_INTERVAL);
        loop {
            ticker.tick().await;
            let Some(pc) = peer_connection.upgrade() else {
                break;
            };
            if pc.connection_state() == RTCPeerConnectionState::Closed {
                break;
            }
            let pli = PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            };
            if pc.write_rtcp(&[Box::new(pli)]).await.is_err() {
                break;
            }
        }
    });
}
