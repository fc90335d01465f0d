//! love-agent: interactive client for the Love AI Agent generation service
//!
//! Reads typed prompts from the terminal, or records a (simulated) voice
//! clip, and sends each one to the service's `/api/generate` endpoint:
//! - Retrying HTTP client with exponential backoff and jitter
//! - Explicit state machine arbitrating typed and voice input
//! - Append-only conversation transcript rendered on stdout
//!
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity.

mod capture;
mod client;
mod config;
mod conversation;
mod events;
mod lifecycle;
mod pipeline;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::{FixedTranscriber, SimulatedMicrophone, SimulatedTranscriber, Transcriber};
use crate::client::{HttpTransport, RetryingRequestClient};
use crate::config::Config;
use crate::conversation::{Conversation, ConversationStore, GREETING};
use crate::events::ControllerEvent;
use crate::lifecycle::ShutdownSignal;
use crate::pipeline::SubmissionPipeline;
use crate::state::{ControllerInput, InputModeController, State};

const HELP: &str = "Type a message and press Enter to send it.
  /mic      start or stop voice recording
  /fail     simulate a microphone failure while recording
  /reset    discard the draft, recording and playback
  /history  print the conversation
  /quit     exit";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "love-agent starting");

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    info!(
        base_url = %config.base_url,
        max_retries = config.max_retries,
        "configuration loaded"
    );

    // Controller and pipeline -> presentation
    let (event_tx, _) = broadcast::channel::<ControllerEvent>(128);
    // Terminal -> controller
    let (input_tx, input_rx) = mpsc::channel::<ControllerInput>(32);

    let transport = HttpTransport::new(&config.base_url, config.request_timeout)
        .context("failed to build HTTP client")?;
    info!(url = transport.url(), "generation endpoint");

    let client = RetryingRequestClient::new(Arc::new(transport), config.max_retries);
    let conversation = Conversation::new(ConversationStore::with_greeting(GREETING), event_tx.clone());
    let pipeline = SubmissionPipeline::new(client, conversation.clone());

    let transcriber: Box<dyn Transcriber> = match config.fixed_transcript {
        Some(transcript) => Box::new(FixedTranscriber::new(transcript)),
        None => Box::new(SimulatedTranscriber),
    };
    let controller = InputModeController::new(
        pipeline,
        Box::new(SimulatedMicrophone::new(config.microphone_enabled)),
        transcriber,
        event_tx.clone(),
    );

    print_history(&conversation).await;
    println!("{HELP}");

    let renderer = tokio::spawn(render(event_tx.subscribe()));
    let controller_task = tokio::spawn(controller.run(input_rx));
    let shutdown = ShutdownSignal::new();

    tokio::select! {
        result = read_input(input_tx, conversation.clone()) => {
            if let Err(e) = result {
                error!(?e, "terminal input error");
            }
            // Input sender is dropped here; the controller finishes any
            // in-flight submission and stops.
            if let Err(e) = controller_task.await {
                error!(?e, "controller task failed");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
            controller_task.abort();
        }
    }

    renderer.abort();
    info!("love-agent stopped");

    Ok(())
}

/// Translate terminal lines into controller inputs until `/quit` or EOF
async fn read_input(input_tx: mpsc::Sender<ControllerInput>, conversation: Conversation) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let inputs = match line.trim() {
            "/quit" => break,
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/history" => {
                print_history(&conversation).await;
                continue;
            }
            "/mic" => vec![ControllerInput::MicToggle],
            "/fail" => vec![ControllerInput::CaptureFailure],
            "/reset" => vec![ControllerInput::Reset],
            _ => vec![
                ControllerInput::DraftChanged(line.clone()),
                ControllerInput::SubmitText(line.clone()),
            ],
        };

        for input in inputs {
            if input_tx.send(input).await.is_err() {
                warn!("controller stopped, ignoring input");
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Presentation layer: print conversation turns and mode changes
async fn render(mut event_rx: broadcast::Receiver<ControllerEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(ControllerEvent::TurnAppended { turn }) => println!("{turn}"),
            Ok(ControllerEvent::StateChanged { to: State::Busy, .. }) => println!("  ..."),
            Ok(ControllerEvent::CaptureStarted) => {
                println!("  Recording... type /mic to stop.");
            }
            Ok(ControllerEvent::PlaybackReady {
                audio_id,
                mime_type,
                bytes,
            }) => {
                println!("  Recorded voice playback ready (#{audio_id}, {mime_type}, {bytes} bytes)");
            }
            Ok(ControllerEvent::InputRejected { state, .. }) => {
                println!("  (input disabled while {state})");
            }
            Ok(event) => debug!(%event, "controller event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "presentation lagged behind events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_history(conversation: &Conversation) {
    for turn in conversation.snapshot().await {
        println!("{turn}");
    }
}
