//! The terminal front end: applies commands to the conversation, drives the
//! negotiator and prints whatever changed.

use crate::commands::{Command, HELP};
use openai_realtime::{SessionBackends, SessionNegotiator};
use s2s_core::config::voice_catalog;
use s2s_core::{
    AppConfig, ConfigStore, Conversation, Message, S2sModel, Sender, SessionEvent, SessionStatus,
};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const SAVED_NOTICE: &str = "Saved the setting!";
pub const CHAT_DISABLED_NOTICE: &str = "Chat is disabled while a conversation is running.";

/// What the input loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<W: Write> {
    conversation: Conversation,
    negotiator: SessionNegotiator,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    store: Arc<dyn ConfigStore>,
    out: W,
    printed: usize,
    shown_status: Option<SessionStatus>,
}

impl<W: Write> App<W> {
    /// Loads the saved settings from `store` and prints the initial status.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        backends: SessionBackends,
        out: W,
    ) -> std::io::Result<Self> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let config = store.load();
        info!(model = %config.s2s.model, voice = %config.s2s.voice, "Loaded settings");

        let mut app = Self {
            conversation: Conversation::new(config),
            negotiator: SessionNegotiator::new(backends, events_tx),
            events,
            store,
            out,
            printed: 0,
            shown_status: None,
        };
        app.render()?;
        Ok(app)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn config(&self) -> &AppConfig {
        self.conversation.config()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Whether handling `command` would begin a session.
    pub fn starts_session(&self, command: &Command) -> bool {
        match command {
            Command::Start => !self.negotiator.is_active(),
            Command::ToggleMic => !self.negotiator.is_active(),
            _ => false,
        }
    }

    pub async fn handle(&mut self, command: Command) -> std::io::Result<Flow> {
        debug!(?command, "Handling command");
        match command {
            Command::Chat(text) if self.conversation.is_session_active() => {
                if !text.trim().is_empty() {
                    self.notice(CHAT_DISABLED_NOTICE)?;
                }
            }
            Command::Chat(text) => {
                self.conversation.submit_user_text(&text);
            }
            Command::Start => self.start_session().await,
            Command::Stop => self.stop_session().await,
            Command::ToggleMic => {
                if self.negotiator.is_active() {
                    self.stop_session().await;
                } else {
                    self.start_session().await;
                }
            }
            Command::Model(id) => match id.parse::<S2sModel>() {
                Ok(model) => match self.conversation.set_model(model) {
                    Ok(()) => self.notice(&format!("Model set to {model}"))?,
                    Err(e) => self.notice(&e.to_string())?,
                },
                Err(e) => {
                    let known: Vec<&str> = S2sModel::ALL.iter().map(|m| m.as_str()).collect();
                    self.notice(&format!("{e}. Available: {}", known.join(", ")))?;
                }
            },
            Command::Voice(id) => match self.conversation.set_voice(&id) {
                Ok(()) => self.notice(&format!("Voice set to {id}"))?,
                Err(e) => self.notice(&e.to_string())?,
            },
            Command::Voices => self.print_voices()?,
            Command::Prompt(text) => match self.conversation.set_prompt(&text) {
                Ok(()) => self.notice("Prompt updated")?,
                Err(e) => self.notice(&e.to_string())?,
            },
            Command::Save => {
                self.store.save(self.conversation.config());
                self.notice(SAVED_NOTICE)?;
            }
            Command::ShowConfig => self.print_config()?,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(name) => {
                self.notice(&format!("Unknown command /{name}. Type /help for a list."))?
            }
        }
        self.render()?;
        Ok(Flow::Continue)
    }

    /// Waits for the next event reported by a running session.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn apply(&mut self, event: SessionEvent) -> std::io::Result<()> {
        self.conversation.apply(event);
        self.render()
    }

    /// Ends any running session, including one whose start was interrupted.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.stop_session().await;
        self.render()
    }

    async fn start_session(&mut self) {
        if let Err(e) = self.negotiator.start(self.conversation.config()).await {
            debug!(error = %e, "Session did not start");
        }
        self.drain_events();
    }

    async fn stop_session(&mut self) {
        self.negotiator.stop().await;
        self.drain_events();
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.conversation.apply(event);
        }
    }

    fn render(&mut self) -> std::io::Result<()> {
        let status = self.conversation.status();
        if self.shown_status != Some(status) {
            writeln!(self.out, "-- {status} --")?;
            self.shown_status = Some(status);
        }
        let fresh: Vec<Message> = self.conversation.messages()[self.printed..].to_vec();
        for message in &fresh {
            writeln!(self.out, "{}", format_message(message))?;
        }
        self.printed += fresh.len();
        self.out.flush()
    }

    fn notice(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.out, "* {text}")
    }

    fn print_voices(&mut self) -> std::io::Result<()> {
        let current = self.conversation.config().s2s.voice.clone();
        for (id, name) in voice_catalog() {
            let marker = if *id == current { '*' } else { ' ' };
            writeln!(self.out, "{marker} {id:<8} {name}")?;
        }
        Ok(())
    }

    fn print_config(&mut self) -> std::io::Result<()> {
        let config = self.conversation.config().clone();
        writeln!(self.out, "prompt: {}", config.prompt)?;
        writeln!(self.out, "model:  {}", config.s2s.model)?;
        writeln!(self.out, "voice:  {}", config.s2s.voice)
    }
}

pub fn format_message(message: &Message) -> String {
    let label = match message.sender {
        Sender::User => "you",
        Sender::Bot => "ai",
        Sender::Error => "error",
    };
    format!("[{label}] {}", message.text)
}
