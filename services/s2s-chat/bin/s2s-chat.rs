//! Main Entrypoint for the s2s-chat terminal client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Initializing logging to stderr.
//! 3. Opening the audio devices and the HTTP clients a session needs.
//! 4. Running the input loop until the user quits or presses Ctrl+C.

use anyhow::Context;
use clap::Parser;
use openai_realtime::{
    AudioOutput, HttpSignaling, HttpTokenProvider, MediaSource, SessionBackends, WebRtcConnector,
};
use s2s_chat::app::{App, Flow};
use s2s_chat::audio::NullOutput;
use s2s_chat::commands::Command;
use s2s_chat::config::Config;
use s2s_core::{ConfigStore, JsonFileStore, SessionEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Talk to the OpenAI realtime speech-to-speech API from the terminal.
#[derive(Parser, Debug)]
#[command(name = "s2s-chat", version, about)]
struct Cli {
    /// Settings file to load and save (overrides SETTINGS_PATH).
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Start a conversation right away.
    #[arg(long)]
    start: bool,
}

enum Input {
    Line(Option<String>),
    Event(Option<SessionEvent>),
    Interrupt,
}

#[cfg(feature = "native-audio")]
fn audio_devices() -> (Arc<dyn MediaSource>, Arc<dyn AudioOutput>) {
    use s2s_chat::audio::{CpalMicrophone, CpalSpeaker};

    let output: Arc<dyn AudioOutput> = match CpalSpeaker::open() {
        Ok(speaker) => Arc::new(speaker),
        Err(e) => {
            warn!(error = %e, "No audio output available, remote audio will not be played");
            Arc::new(NullOutput)
        }
    };
    (Arc::new(CpalMicrophone), output)
}

#[cfg(not(feature = "native-audio"))]
fn audio_devices() -> (Arc<dyn MediaSource>, Arc<dyn AudioOutput>) {
    warn!("Built without native-audio: sending silence and discarding remote audio");
    (
        Arc::new(s2s_chat::audio::SilentMicrophone),
        Arc::new(NullOutput),
    )
}

/// Runs `command`, letting Ctrl+C abandon it if it starts a session.
async fn dispatch<W: std::io::Write>(app: &mut App<W>, command: Command) -> anyhow::Result<Flow> {
    if !app.starts_session(&command) {
        return Ok(app.handle(command).await?);
    }

    let finished = tokio::select! {
        flow = app.handle(command) => Some(flow),
        _ = tokio::signal::ctrl_c() => None,
    };
    match finished {
        Some(flow) => Ok(flow?),
        None => {
            info!("Received Ctrl+C while starting. Cancelling the conversation...");
            app.shutdown().await?;
            Ok(Flow::Continue)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let store = match cli.settings.or(config.settings_path.clone()) {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::default_location(),
    };
    match store.path() {
        Some(path) => info!(path = %path.display(), "Using settings file"),
        None => warn!("No settings location available; settings will not be saved"),
    }
    let store: Arc<dyn ConfigStore> = Arc::new(store);

    // --- 3. Initialize Session Backends ---
    let (media, output) = audio_devices();
    let client = reqwest::Client::new();
    let backends = SessionBackends {
        media,
        peers: Arc::new(WebRtcConnector::new()),
        tokens: Arc::new(HttpTokenProvider::new(client.clone(), &config.token_url)),
        signaling: Arc::new(HttpSignaling::new(client, &config.realtime_url)),
        output,
    };
    info!(
        token_url = %config.token_url,
        realtime_url = %config.realtime_url,
        "Service configured. Starting client..."
    );

    let mut app = App::new(store, backends, std::io::stdout())?;
    println!("Type /help for commands.");

    if cli.start {
        dispatch(&mut app, Command::Start).await?;
    }

    // --- 4. Input Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            event = app.next_event() => Input::Event(event),
            _ = tokio::signal::ctrl_c() => Input::Interrupt,
        };

        match input {
            Input::Line(Some(line)) => {
                if dispatch(&mut app, Command::parse(&line)).await? == Flow::Quit {
                    break;
                }
            }
            Input::Line(None) => break,
            Input::Event(Some(event)) => app.apply(event)?,
            Input::Event(None) => break,
            Input::Interrupt => {
                info!("Received shutdown signal. Shutting down gracefully...");
                break;
            }
        }
    }

    app.shutdown().await?;
    info!("Client has shut down.");
    Ok(())
}
