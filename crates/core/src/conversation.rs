//! Conversation View-Model
//!
//! Holds the ordered chat log, the pending input line, the session status and
//! the working copy of the configuration. The log is append-only and lives for
//! one run of the client.

use crate::config::{AppConfig, S2sModel, is_known_voice};
use crate::events::{SessionEvent, SessionStatus};
use serde::Serialize;
use tracing::debug;

/// Who produced a chat-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    Error,
}

/// One chat-log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Milliseconds since the epoch at creation, bumped to stay increasing.
    pub id: i64,
    pub text: String,
    pub sender: Sender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Reasons a configuration edit is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigEditError {
    #[error("Settings cannot be changed while a conversation is running")]
    SessionActive,
    #[error("Unknown voice '{0}'")]
    UnknownVoice(String),
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    input: String,
    status: SessionStatus,
    config: AppConfig,
    last_id: i64,
}

impl Conversation {
    /// Creates an empty conversation around the configuration loaded at startup.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_session_active(&self) -> bool {
        self.status.is_engaged()
    }

    /// Appends an entry to the log.
    pub fn append_message(
        &mut self,
        text: impl Into<String>,
        sender: Sender,
        time: Option<f64>,
        price: Option<f64>,
    ) {
        let id = self.next_id();
        self.messages.push(Message {
            id,
            text: text.into(),
            sender,
            time,
            price,
        });
    }

    /// Appends `text` as a user message and clears the input buffer.
    ///
    /// Blank or whitespace-only text is ignored. Returns whether a message was
    /// appended.
    pub fn submit_user_text(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.append_message(text, Sender::User, None, None);
        self.input.clear();
        true
    }

    /// Submits the current input buffer.
    pub fn submit_input(&mut self) -> bool {
        let text = std::mem::take(&mut self.input);
        let submitted = self.submit_user_text(&text);
        if !submitted {
            self.input = text;
        }
        submitted
    }

    pub fn set_model(&mut self, model: S2sModel) -> Result<(), ConfigEditError> {
        self.ensure_editable()?;
        self.config = self.config.with_model(model);
        Ok(())
    }

    pub fn set_voice(&mut self, voice: &str) -> Result<(), ConfigEditError> {
        self.ensure_editable()?;
        if !is_known_voice(voice) {
            return Err(ConfigEditError::UnknownVoice(voice.to_string()));
        }
        self.config = self.config.with_voice(voice);
        Ok(())
    }

    pub fn set_prompt(&mut self, prompt: &str) -> Result<(), ConfigEditError> {
        self.ensure_editable()?;
        self.config = self.config.with_prompt(prompt);
        Ok(())
    }

    /// Applies an event reported by the session negotiator.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status(status) => {
                debug!(%status, "Session status changed");
                self.status = status;
            }
            SessionEvent::Transcript(text) => self.append_message(text, Sender::Bot, None, None),
            SessionEvent::Failed(text) => self.append_message(text, Sender::Error, None, None),
        }
    }

    fn ensure_editable(&self) -> Result<(), ConfigEditError> {
        if self.is_session_active() {
            Err(ConfigEditError::SessionActive)
        } else {
            Ok(())
        }
    }

    fn next_id(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_id = now.max(self.last_id + 1);
        self.last_id
    }
}
