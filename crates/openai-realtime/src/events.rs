//! JSON messages exchanged with the realtime API over the `oai-events` data channel.

use serde::{Deserialize, Serialize};

/// Label of the control data channel the realtime API listens on.
pub const EVENTS_CHANNEL_LABEL: &str = "oai-events";

/// Session parameters sent once the data channel opens.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub instructions: String,
    pub voice: String,
}

/// Messages sent from the client to the realtime API.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
}

/// Error details carried by a server `error` event.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Messages received from the realtime API.
///
/// Only the variants the client acts on are modelled; every other `type`
/// deserializes to `Unknown`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The AI finished an audio response; carries its full transcript.
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone { transcript: String },
    #[serde(rename = "error")]
    Error { error: ServerError },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_update_wire_format() {
        let event = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: "Be kind.".into(),
                voice: "sage".into(),
            },
        };

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "session.update",
                "session": {"instructions": "Be kind.", "voice": "sage"}
            })
        );
    }

    #[test]
    fn test_parse_transcript_done() {
        let event = ServerEvent::parse(
            r#"{"type":"response.audio_transcript.done","event_id":"e1","response_id":"r1","transcript":"hello"}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ServerEvent::ResponseAudioTranscriptDone {
                transcript: "hello".into()
            }
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        let event = ServerEvent::parse(r#"{"type":"response.audio.delta","delta":"AAAA"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_parse_error_event() {
        let event = ServerEvent::parse(
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad voice"}}"#,
        )
        .unwrap();

        match event {
            ServerEvent::Error { error } => assert_eq!(error.message, "bad voice"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_untyped_payloads() {
        assert!(ServerEvent::parse(r#"{"transcript":"hello"}"#).is_err());
        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"type":"response.audio_transcript.done"}"#).is_err());
    }
}
