/// Failures that can end a session negotiation attempt.
///
/// Every variant is reported to the user the same way; the kind only matters
/// for logs and for callers that inspect the returned error.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("Microphone access failed: {0}")]
    MediaAccessDenied(String),
    #[error("Token endpoint error: {status}")]
    TokenEndpoint { status: u16 },
    #[error("Token endpoint returned no usable credential: {0}")]
    MalformedToken(String),
    #[error("Signaling server error: {status}")]
    Signaling { status: u16 },
    #[error("Malformed remote description: {0}")]
    MalformedRemoteDescription(String),
    #[error("Peer connection error: {0}")]
    Peer(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = NegotiationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            NegotiationError::Signaling { status: 500 }.to_string(),
            "Signaling server error: 500"
        );
        assert_eq!(
            NegotiationError::MediaAccessDenied("no input device".into()).to_string(),
            "Microphone access failed: no input device"
        );
        assert_eq!(
            NegotiationError::Other(anyhow::anyhow!("something broke")).to_string(),
            "something broke"
        );
    }
}
