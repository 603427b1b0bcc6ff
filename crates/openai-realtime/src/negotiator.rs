//! Session Negotiator
//!
//! Establishes and tears down one realtime voice conversation: microphone
//! capture, peer connection, control data channel, credential issuance and the
//! offer/answer exchange. All connection handles are owned here and released
//! together by `stop`.

use crate::error::Result;
use crate::events::{ClientEvent, EVENTS_CHANNEL_LABEL, ServerEvent, SessionUpdate};
use crate::media::{AudioOutput, LocalStream, MediaSource, MixRecorder};
use crate::peer::{ChannelEvent, DataChannel, PeerConnection, PeerConnector, RemoteTrack};
use crate::signaling::Signaling;
use crate::token::TokenProvider;
use s2s_core::{AppConfig, SessionEvent, SessionStatus};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Chat-log text shown for any negotiation failure.
pub const FAILURE_MESSAGE: &str = "Failed to initialize WebRTC.";

/// The external collaborators a negotiator drives.
#[derive(Clone)]
pub struct SessionBackends {
    pub media: Arc<dyn MediaSource>,
    pub peers: Arc<dyn PeerConnector>,
    pub tokens: Arc<dyn TokenProvider>,
    pub signaling: Arc<dyn Signaling>,
    pub output: Arc<dyn AudioOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorState {
    Idle,
    Initializing,
    Active,
}

#[derive(Default)]
struct SessionHandles {
    local: Option<Arc<dyn LocalStream>>,
    peer: Option<Arc<dyn PeerConnection>>,
    channel: Option<Arc<dyn DataChannel>>,
    recorder: Option<Arc<MixRecorder>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandles {
    fn is_empty(&self) -> bool {
        self.local.is_none()
            && self.peer.is_none()
            && self.channel.is_none()
            && self.recorder.is_none()
            && self.tasks.is_empty()
    }
}

pub struct SessionNegotiator {
    backends: SessionBackends,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: NegotiatorState,
    handles: SessionHandles,
}

impl SessionNegotiator {
    /// Creates an idle negotiator that reports to `events`.
    pub fn new(backends: SessionBackends, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            backends,
            events,
            state: NegotiatorState::Idle,
            handles: SessionHandles::default(),
        }
    }

    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// True while a session is being set up or running.
    pub fn is_active(&self) -> bool {
        self.state != NegotiatorState::Idle
    }

    /// Whether any connection handle is currently held.
    pub fn has_handles(&self) -> bool {
        !self.handles.is_empty()
    }

    /// The recorder mixing the current session's audio, if one is running.
    pub fn recorder(&self) -> Option<Arc<MixRecorder>> {
        self.handles.recorder.clone()
    }

    /// Starts a conversation with the settings in `config`.
    ///
    /// Does nothing unless idle. On failure the error is logged, reported once
    /// as a `SessionEvent::Failed`, and the session is torn down before the
    /// error is returned. Handles are stored as soon as they exist, so `stop`
    /// also releases a start that was cancelled midway.
    #[instrument(skip_all, fields(model = %config.s2s.model, voice = %config.s2s.voice))]
    pub async fn start(&mut self, config: &AppConfig) -> Result<()> {
        if self.state != NegotiatorState::Idle {
            debug!(state = ?self.state, "Session already running, ignoring start");
            return Ok(());
        }
        self.state = NegotiatorState::Initializing;
        self.emit(SessionEvent::Status(SessionStatus::Initializing));

        match self.negotiate(config).await {
            Ok(()) => {
                self.state = NegotiatorState::Active;
                info!("Conversation started via WebRTC");
                self.emit(SessionEvent::Status(SessionStatus::Active));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "WebRTC negotiation failed");
                self.emit(SessionEvent::Failed(FAILURE_MESSAGE.to_string()));
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&mut self, config: &AppConfig) -> Result<()> {
        let local = self.backends.media.acquire_microphone().await?;
        self.handles.local = Some(local.clone());

        let (peer, remote_tracks) = self.backends.peers.connect().await?;
        self.handles.peer = Some(peer.clone());
        peer.add_local_audio(local.subscribe()).await?;

        let recorder = Arc::new(MixRecorder::new());
        self.handles.recorder = Some(recorder.clone());
        self.handles.tasks.push(tokio::spawn(route_remote_tracks(
            remote_tracks,
            local,
            self.backends.output.clone(),
            recorder,
        )));

        let (channel, channel_events) = peer.create_data_channel(EVENTS_CHANNEL_LABEL).await?;
        self.handles.channel = Some(channel.clone());
        let update = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: config.prompt.clone(),
                voice: config.s2s.voice.clone(),
            },
        };
        self.handles.tasks.push(tokio::spawn(pump_channel_events(
            channel_events,
            channel,
            update,
            self.events.clone(),
        )));

        let model = config.s2s.model;
        let key = self.backends.tokens.issue(model).await?;

        let offer = peer.create_offer().await?;
        let offer = peer.set_local_description(offer).await?;

        let answer = self.backends.signaling.exchange(model, &key, &offer).await?;
        peer.set_remote_description(answer).await?;
        Ok(())
    }

    /// Ends the conversation and releases every handle. Does nothing when idle.
    pub async fn stop(&mut self) {
        if self.state == NegotiatorState::Idle {
            return;
        }

        let handles = std::mem::take(&mut self.handles);
        for task in handles.tasks {
            task.abort();
        }
        if let Some(local) = handles.local {
            local.stop();
        }
        if let Some(channel) = handles.channel {
            if let Err(e) = channel.close().await {
                warn!(error = %e, "Failed to close data channel");
            }
        }
        if let Some(peer) = handles.peer {
            if let Err(e) = peer.close().await {
                warn!(error = %e, "Failed to close peer connection");
            }
        }
        if let Some(recorder) = handles.recorder {
            recorder.stop();
        }

        self.state = NegotiatorState::Idle;
        info!("Conversation ended");
        self.emit(SessionEvent::Status(SessionStatus::Ended));
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            warn!("Failed to report session event: receiver dropped.");
        }
    }
}

/// Plays each remote track and records it mixed with the local capture.
async fn route_remote_tracks(
    mut tracks: mpsc::Receiver<RemoteTrack>,
    local: Arc<dyn LocalStream>,
    output: Arc<dyn AudioOutput>,
    recorder: Arc<MixRecorder>,
) {
    while let Some(mut track) = tracks.recv().await {
        info!(track = %track.id, "Remote audio track received");
        recorder.start();
        let mut local_frames = local.subscribe();
        let mut local_open = true;

        loop {
            tokio::select! {
                remote = track.frames.recv() => match remote {
                    Some(frame) => {
                        output.play(&frame);
                        recorder.push_remote(&frame);
                    }
                    None => break,
                },
                captured = local_frames.recv(), if local_open => match captured {
                    Ok(frame) => recorder.push_local(&frame),
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Recorder fell behind local capture"),
                    Err(RecvError::Closed) => local_open = false,
                },
            }
        }
        debug!(track = %track.id, "Remote audio track ended");
    }
}

/// Handles data channel traffic: configures the session once the channel opens
/// and reports completed transcripts.
async fn pump_channel_events(
    mut events: mpsc::Receiver<ChannelEvent>,
    channel: Arc<dyn DataChannel>,
    update: ClientEvent,
    sink: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Open => {
                let sent = match serde_json::to_string(&update) {
                    Ok(text) => channel.send_text(text).await,
                    Err(e) => Err(anyhow::Error::from(e).into()),
                };
                match sent {
                    Ok(()) => debug!("Sent session.update"),
                    Err(e) => warn!(error = %e, "Failed to send session.update"),
                }
            }
            ChannelEvent::Message(text) => match ServerEvent::parse(&text) {
                Ok(ServerEvent::ResponseAudioTranscriptDone { transcript }) => {
                    if sink.send(SessionEvent::Transcript(transcript)).is_err() {
                        warn!("Failed to report transcript: receiver dropped.");
                    }
                }
                Ok(ServerEvent::Error { error }) => {
                    warn!(message = %error.message, code = ?error.code, "Realtime API reported an error");
                }
                Ok(ServerEvent::Unknown) => {}
                Err(e) => debug!(error = %e, "Ignoring unparsable data channel message"),
            },
            ChannelEvent::Closed => {
                debug!("Data channel closed");
                break;
            }
        }
    }
}
