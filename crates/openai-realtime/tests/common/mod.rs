#![allow(dead_code)]

use async_trait::async_trait;
use openai_realtime::{
    AudioFrame, AudioOutput, ChannelEvent, DataChannel, FrameStream, HttpSignaling,
    HttpTokenProvider, LocalStream, MediaSource, NegotiationError, PeerConnection, PeerConnector,
    RemoteTrack, Result, SessionBackends, SessionDescription,
};
use s2s_core::SessionEvent;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 3 4 IN IP4 10.0.0.1\r\ns=-\r\n";
pub const GATHERED_CANDIDATE: &str = "a=candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host\r\n";
pub const EPHEMERAL_KEY: &str = "ek_test";

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_secret": {"value": EPHEMERAL_KEY, "expires_at": 1_700_000_000}
        })))
        .mount(server)
        .await;
}

pub async fn mount_answer(server: &MockServer, status: u16) {
    let body = if (200..300).contains(&status) {
        ANSWER_SDP
    } else {
        "internal error"
    };
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Microphone that hands out `FrameStream`s, or refuses access.
#[derive(Default)]
pub struct FakeMedia {
    deny: bool,
    acquired: AtomicUsize,
    streams: Mutex<Vec<Arc<FrameStream>>>,
}

impl FakeMedia {
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Default::default()
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Option<Arc<FrameStream>> {
        self.streams.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire_microphone(&self) -> Result<Arc<dyn LocalStream>> {
        if self.deny {
            return Err(NegotiationError::MediaAccessDenied(
                "permission denied".to_string(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::new(FrameStream::new(16));
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream as Arc<dyn LocalStream>)
    }
}

#[derive(Default)]
pub struct FakeConnector {
    connects: AtomicUsize,
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(&self) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<RemoteTrack>)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tracks_tx, tracks_rx) = mpsc::channel(4);
        let peer = Arc::new(FakePeer {
            tracks: tracks_tx,
            ..Default::default()
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok((peer as Arc<dyn PeerConnection>, tracks_rx))
    }
}

/// Records what the negotiator does to a peer connection.
pub struct FakePeer {
    tracks: mpsc::Sender<RemoteTrack>,
    local_audio: Mutex<Option<broadcast::Receiver<AudioFrame>>>,
    channel_events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    channel_label: Mutex<Option<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    channel_closed: Arc<AtomicBool>,
    remote: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
}

impl Default for FakePeer {
    fn default() -> Self {
        let (tracks, _) = mpsc::channel(1);
        Self {
            tracks,
            local_audio: Mutex::new(None),
            channel_events: Mutex::new(None),
            channel_label: Mutex::new(None),
            sent: Arc::new(Mutex::new(Vec::new())),
            channel_closed: Arc::new(AtomicBool::new(false)),
            remote: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }
}

impl FakePeer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_channel_closed(&self) -> bool {
        self.channel_closed.load(Ordering::SeqCst)
    }

    pub fn has_local_audio(&self) -> bool {
        self.local_audio.lock().unwrap().is_some()
    }

    pub fn channel_label(&self) -> Option<String> {
        self.channel_label.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivers an event as if it arrived on the data channel.
    pub async fn channel_event(&self, event: ChannelEvent) {
        let sender = self.channel_events.lock().unwrap().clone();
        sender
            .expect("data channel was never created")
            .send(event)
            .await
            .expect("channel event pump stopped");
    }

    /// Announces a remote audio track and returns the sender feeding it.
    pub async fn remote_track(&self, id: &str) -> mpsc::Sender<AudioFrame> {
        let (frames_tx, frames_rx) = mpsc::channel(16);
        self.tracks
            .send(RemoteTrack {
                id: id.to_string(),
                frames: frames_rx,
            })
            .await
            .expect("remote track router stopped");
        frames_tx
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_local_audio(&self, frames: broadcast::Receiver<AudioFrame>) -> Result<()> {
        *self.local_audio.lock().unwrap() = Some(frames);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn DataChannel>, mpsc::Receiver<ChannelEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(16);
        *self.channel_events.lock().unwrap() = Some(events_tx);
        *self.channel_label.lock().unwrap() = Some(label.to_string());
        let channel = FakeChannel {
            sent: self.sent.clone(),
            closed: self.channel_closed.clone(),
        };
        Ok((Arc::new(channel) as Arc<dyn DataChannel>, events_rx))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<SessionDescription> {
        Ok(SessionDescription {
            kind: description.kind,
            sdp: format!("{}{GATHERED_CANDIDATE}", description.sdp),
        })
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeChannel {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DataChannel for FakeChannel {
    async fn send_text(&self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOutput {
    played: Mutex<Vec<AudioFrame>>,
}

impl FakeOutput {
    pub fn played(&self) -> Vec<AudioFrame> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, frame: &AudioFrame) {
        self.played.lock().unwrap().push(frame.clone());
    }
}

/// Fake devices plus real HTTP clients pointed at a mock server.
pub struct Harness {
    pub media: Arc<FakeMedia>,
    pub connector: Arc<FakeConnector>,
    pub output: Arc<FakeOutput>,
    pub tokens: Arc<HttpTokenProvider>,
    pub signaling: Arc<HttpSignaling>,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        Self::with_media(server, FakeMedia::default())
    }

    pub fn with_media(server: &MockServer, media: FakeMedia) -> Self {
        let client = reqwest::Client::new();
        Self {
            media: Arc::new(media),
            connector: Arc::new(FakeConnector::default()),
            output: Arc::new(FakeOutput::default()),
            tokens: Arc::new(HttpTokenProvider::new(
                client.clone(),
                format!("{}/api/token", server.uri()),
            )),
            signaling: Arc::new(HttpSignaling::new(
                client,
                format!("{}/v1/realtime", server.uri()),
            )),
        }
    }

    pub fn backends(&self) -> SessionBackends {
        SessionBackends {
            media: self.media.clone(),
            peers: self.connector.clone(),
            tokens: self.tokens.clone(),
            signaling: self.signaling.clone(),
            output: self.output.clone(),
        }
    }

    pub fn peer(&self) -> Arc<FakePeer> {
        self.connector.last_peer().expect("no peer connection was made")
    }
}

pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session event channel closed")
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
