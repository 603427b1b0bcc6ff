use std::fmt;

/// The user-visible status of the voice session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Ready,
    Initializing,
    Active,
    Ended,
}

impl SessionStatus {
    /// Whether a conversation is running or being set up.
    pub fn is_engaged(&self) -> bool {
        matches!(self, SessionStatus::Initializing | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionStatus::Ready => "Ready",
            SessionStatus::Initializing => "Initializing...",
            SessionStatus::Active => "Conversation started via WebRTC",
            SessionStatus::Ended => "Conversation ended.",
        };
        f.write_str(text)
    }
}

/// Events the session negotiator reports back to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new status.
    Status(SessionStatus),
    /// The AI finished speaking; carries the transcript of its reply.
    Transcript(String),
    /// Negotiation failed; carries the message to show the user.
    Failed(String),
}
