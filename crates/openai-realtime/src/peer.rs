//! Abstractions over the WebRTC peer connection and its control data channel.
//!
//! The negotiator only speaks to these traits; `crate::rtc` provides the
//! `webrtc-rs` implementation.

use crate::error::Result;
use crate::media::AudioFrame;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// An SDP payload exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An audio track sent by the remote peer, delivered as decoded frames.
pub struct RemoteTrack {
    pub id: String,
    pub frames: mpsc::Receiver<AudioFrame>,
}

/// Something that happened on a data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed,
}

/// Creates peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Creates a new peer connection.
    ///
    /// Remote tracks negotiated on the connection are delivered on the returned
    /// receiver as they arrive.
    async fn connect(&self) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<RemoteTrack>)>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Sends the frames from `frames` on a new outgoing audio track.
    async fn add_local_audio(&self, frames: broadcast::Receiver<AudioFrame>) -> Result<()>;

    /// Opens a bidirectional data channel. Its events arrive on the receiver.
    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn DataChannel>, mpsc::Receiver<ChannelEvent>)>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Applies the local description and returns the description to signal,
    /// including any candidates gathered while applying it.
    async fn set_local_description(&self, description: SessionDescription)
    -> Result<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
