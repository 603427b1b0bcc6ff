//! `webrtc-rs` implementation of the peer connection traits.
//!
//! Local frames are resampled to 48kHz and Opus-encoded onto a static sample
//! track; remote Opus packets are decoded back into mono frames.

use crate::error::{NegotiationError, Result};
use crate::media::{AudioFrame, MIX_SAMPLE_RATE};
use crate::peer::{
    ChannelEvent, DataChannel, PeerConnection, PeerConnector, RemoteTrack, SdpKind,
    SessionDescription,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// 20ms of audio at 48kHz.
const OPUS_FRAME_SAMPLES: usize = 960;
const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);
const MAX_OPUS_PACKET: usize = 4000;
/// 120ms at 48kHz, the longest frame Opus can produce.
const MAX_DECODED_SAMPLES: usize = 5760;

impl From<webrtc::Error> for NegotiationError {
    fn from(e: webrtc::Error) -> Self {
        NegotiationError::Peer(e.to_string())
    }
}

impl From<opus::Error> for NegotiationError {
    fn from(e: opus::Error) -> Self {
        NegotiationError::Peer(format!("opus: {e}"))
    }
}

/// Builds `webrtc-rs` peer connections.
#[derive(Debug, Clone, Default)]
pub struct WebRtcConnector {
    /// STUN/TURN urls; none are needed to reach the realtime API directly.
    pub ice_servers: Vec<String>,
}

impl WebRtcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ice_servers(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(&self) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<RemoteTrack>)> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

        pc.on_peer_connection_state_change(Box::new(|state| {
            info!(?state, "Peer connection state changed");
            Box::pin(async {})
        }));

        let (tracks_tx, tracks_rx) = mpsc::channel::<RemoteTrack>(4);
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tracks_tx = tracks_tx.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    return;
                }
                let (frames_tx, frames_rx) = mpsc::channel(64);
                let remote = RemoteTrack {
                    id: track.id(),
                    frames: frames_rx,
                };
                if tracks_tx.send(remote).await.is_err() {
                    debug!("Remote track receiver dropped");
                    return;
                }
                tokio::spawn(receive_remote_audio(track, frames_tx));
            })
        }));

        let peer = WebRtcPeer {
            pc,
            tasks: Mutex::new(Vec::new()),
        };
        Ok((Arc::new(peer), tracks_rx))
    }
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebRtcPeer {
    fn track_task(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_local_audio(&self, frames: broadcast::Receiver<AudioFrame>) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: MIX_SAMPLE_RATE,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "s2s-chat".to_owned(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP has to be drained for the interceptors to work.
        self.track_task(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        }));

        let encoder = opus::Encoder::new(
            MIX_SAMPLE_RATE,
            opus::Channels::Mono,
            opus::Application::Voip,
        )?;
        self.track_task(tokio::spawn(send_local_audio(frames, track, encoder)));
        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn DataChannel>, mpsc::Receiver<ChannelEvent>)> {
        let dc = self.pc.create_data_channel(label, None).await?;
        let (events_tx, events_rx) = mpsc::channel(64);

        let open_tx = events_tx.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = open_tx.send(ChannelEvent::Open).await;
            })
        }));

        let message_tx = events_tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let message_tx = message_tx.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = message_tx.send(ChannelEvent::Message(text)).await;
                    }
                    Err(e) => debug!(error = %e, "Ignoring non-UTF-8 data channel message"),
                }
            })
        }));

        dc.on_close(Box::new(move || {
            let close_tx = events_tx.clone();
            Box::pin(async move {
                let _ = close_tx.send(ChannelEvent::Closed).await;
            })
        }));

        Ok((Arc::new(WebRtcDataChannel { dc }), events_rx))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<SessionDescription> {
        let local = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };

        // The realtime API does not trickle; signal the offer once gathering is done.
        let mut gathering_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(local).await?;
        let _ = gathering_complete.recv().await;

        let gathered = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| NegotiationError::Peer("local description missing".into()))?;
        Ok(SessionDescription {
            kind: description.kind,
            sdp: gathered.sdp,
        })
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let remote = match description.kind {
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        }
        .map_err(|e| NegotiationError::MalformedRemoteDescription(e.to_string()))?;

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| NegotiationError::MalformedRemoteDescription(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for task in tasks {
            task.abort();
        }
        self.pc.close().await?;
        Ok(())
    }
}

struct WebRtcDataChannel {
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    async fn send_text(&self, text: String) -> Result<()> {
        self.dc.send_text(text).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }
}

async fn send_local_audio(
    mut frames: broadcast::Receiver<AudioFrame>,
    track: Arc<TrackLocalStaticSample>,
    mut encoder: opus::Encoder,
) {
    let mut pending: Vec<f32> = Vec::with_capacity(OPUS_FRAME_SAMPLES * 2);
    loop {
        match frames.recv().await {
            Ok(frame) => {
                pending.extend(frame.resampled(MIX_SAMPLE_RATE));
                while pending.len() >= OPUS_FRAME_SAMPLES {
                    let chunk: Vec<f32> = pending.drain(..OPUS_FRAME_SAMPLES).collect();
                    let packet = match encoder.encode_vec_float(&chunk, MAX_OPUS_PACKET) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!(error = %e, "Opus encoding failed");
                            continue;
                        }
                    };
                    let sample = Sample {
                        data: Bytes::from(packet),
                        duration: OPUS_FRAME_DURATION,
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        debug!(error = %e, "Failed to write local audio sample");
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Local audio sender fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Local audio sender stopped");
}

async fn receive_remote_audio(track: Arc<TrackRemote>, frames: mpsc::Sender<AudioFrame>) {
    let mut decoder = match opus::Decoder::new(MIX_SAMPLE_RATE, opus::Channels::Mono) {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!(error = %e, "Failed to create Opus decoder");
            return;
        }
    };
    info!(
        codec = %track.codec().capability.mime_type,
        "Receiving remote audio"
    );

    let mut pcm = vec![0f32; MAX_DECODED_SAMPLES];
    loop {
        let packet = match track.read_rtp().await {
            Ok((packet, _attributes)) => packet,
            Err(e) => {
                debug!(error = %e, "Remote track read ended");
                break;
            }
        };
        if packet.payload.is_empty() {
            continue;
        }
        match decoder.decode_float(&packet.payload, &mut pcm, false) {
            Ok(decoded) => {
                let frame = AudioFrame::new(pcm[..decoded].to_vec(), MIX_SAMPLE_RATE);
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "Dropping undecodable remote packet"),
        }
    }
}
