//! Remote RTP tracks as decoded frame sequences

use std::sync::Arc;

use async_trait::async_trait;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::track::track_remote::TrackRemote;

use crate::audio::OpusDecoder;
use crate::errors::RelayError;
use crate::timing::MediaClock;
use crate::types::{AudioFrame, TrackRead, TrackSource, VideoFrame};
use crate::video::{H264Decoder, ResyncingDecoder};

/// Packets the sample builder may hold while reordering
const MAX_LATE_PACKETS: u16 = 256;
const H264_CLOCK_RATE: u32 = 90_000;

/// H.264 RTP track decoded to RGB frames
pub struct RtpVideoSource {
    track: Arc<TrackRemote>,
    builder: SampleBuilder<H264Packet>,
    decoder: ResyncingDecoder,
}

impl RtpVideoSource {
    pub fn new(track: Arc<TrackRemote>, clock: MediaClock) -> Result<Self, RelayError> {
        Ok(Self {
            track,
            builder: SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), H264_CLOCK_RATE),
            decoder: ResyncingDecoder::new(H264Decoder::new(clock)?),
        })
    }
}

#[async_trait]
impl TrackSource<VideoFrame> for RtpVideoSource {
    async fn next_frame(&mut self) -> TrackRead<VideoFrame> {
        loop {
            while let Some(sample) = self.builder.pop() {
                match self.decoder.push(&sample.data) {
                    Ok(Some(frame)) => return TrackRead::Frame(frame),
                    Ok(None) => {}
                    Err(e) => return TrackRead::DecodeError(e.to_string()),
                }
            }

            match self.track.read_rtp().await {
                Ok((packet, _)) => self.builder.push(packet),
                Err(e) => {
                    log::debug!(
                        "Video track {} read ended ({} damaged access unit(s) skipped): {}",
                        self.track.ssrc(),
                        self.decoder.skipped(),
                        e
                    );
                    return TrackRead::EndOfTrack;
                }
            }
        }
    }
}

/// Opus RTP track decoded to PCM frames
pub struct RtpAudioSource {
    track: Arc<TrackRemote>,
    decoder: OpusDecoder,
}

impl RtpAudioSource {
    pub fn new(track: Arc<TrackRemote>, sample_rate: u32, channels: u16) -> Result<Self, RelayError> {
        Ok(Self {
            track,
            decoder: OpusDecoder::new(sample_rate, channels)?,
        })
    }
}

#[async_trait]
impl TrackSource<AudioFrame> for RtpAudioSource {
    async fn next_frame(&mut self) -> TrackRead<AudioFrame> {
        loop {
            let packet = match self.track.read_rtp().await {
                Ok((packet, _)) => packet,
                Err(e) => {
                    log::debug!("Audio track {} read ended: {}", self.track.ssrc(), e);
                    return TrackRead::EndOfTrack;
                }
            };
            // Padding-only packets carry no audio
            if packet.payload.is_empty() {
                continue;
            }
            return match self.decoder.decode(&packet.payload) {
                Ok(frame) => TrackRead::Frame(frame),
                Err(e) => TrackRead::DecodeError(e.to_string()),
            };
        }
    }
}
