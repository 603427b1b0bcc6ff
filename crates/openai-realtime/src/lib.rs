//! WebRTC session plumbing for the OpenAI realtime speech-to-speech API.

pub mod error;
pub mod events;
pub mod media;
pub mod negotiator;
pub mod peer;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod signaling;
pub mod token;

pub use error::{NegotiationError, Result};
pub use media::{AudioFrame, AudioOutput, FrameStream, LocalStream, MediaSource, MixRecorder};
pub use negotiator::{FAILURE_MESSAGE, NegotiatorState, SessionBackends, SessionNegotiator};
pub use peer::{
    ChannelEvent, DataChannel, PeerConnection, PeerConnector, RemoteTrack, SdpKind,
    SessionDescription,
};
#[cfg(feature = "webrtc")]
pub use rtc::WebRtcConnector;
pub use signaling::{DEFAULT_REALTIME_URL, HttpSignaling, Signaling};
pub use token::{EphemeralKey, HttpTokenProvider, TokenProvider};
