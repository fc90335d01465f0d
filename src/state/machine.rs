//! Input mode controller
//!
//! Arbitrates between typed input and voice capture and serializes both
//! into the submission pipeline. Only one capture session and one
//! submission can exist at a time; while a submission is in flight every
//! input is rejected until the pipeline reports completion.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::capture::{
    wrap_voice_transcript, AudioHandle, CaptureBackend, CaptureError, CaptureSession, Transcriber,
};
use crate::conversation::Turn;
use crate::events::ControllerEvent;
use crate::pipeline::{SubmissionOutcome, SubmissionPipeline};

/// Diagnostic appended when the microphone cannot be used
pub const CAPTURE_FAILED_MESSAGE: &str =
    "Microphone access denied or failed. Please check permissions.";

/// The four input modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Nothing typed, nothing recording
    #[default]
    Idle,
    /// A non-empty draft is being typed
    TextComposing,
    /// Voice capture is running; typed input is disabled
    Capturing,
    /// A submission is in flight; all input is disabled
    Busy,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::TextComposing => write!(f, "TextComposing"),
            State::Capturing => write!(f, "Capturing"),
            State::Busy => write!(f, "Busy"),
        }
    }
}

/// Discrete user-side events driving the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerInput {
    /// The text draft was edited
    DraftChanged(String),
    /// Typed text was submitted
    SubmitText(String),
    /// The microphone button was pressed
    MicToggle,
    /// The capture backend reported a failure mid-recording
    CaptureFailure,
    /// Discard draft, capture and playback and return to Idle
    Reset,
}

impl ControllerInput {
    fn name(&self) -> &'static str {
        match self {
            ControllerInput::DraftChanged(_) => "draft_changed",
            ControllerInput::SubmitText(_) => "submit_text",
            ControllerInput::MicToggle => "mic_toggle",
            ControllerInput::CaptureFailure => "capture_failure",
            ControllerInput::Reset => "reset",
        }
    }
}

/// Finite-state machine owning the capture session and the busy overlay
pub struct InputModeController {
    /// Current state
    state: State,
    /// Time when the current non-Idle state was entered
    state_entered_at: Option<Instant>,
    /// Text typed but not yet submitted
    draft: String,
    /// Running capture, present only in `Capturing`
    session: Option<CaptureSession>,
    /// Recording from the last finished capture
    playback: Option<AudioHandle>,
    backend: Box<dyn CaptureBackend>,
    transcriber: Box<dyn Transcriber>,
    pipeline: SubmissionPipeline,
    /// Written only by the in-flight submission task
    completion_tx: mpsc::Sender<SubmissionOutcome>,
    completion_rx: mpsc::Receiver<SubmissionOutcome>,
    event_tx: broadcast::Sender<ControllerEvent>,
}

impl InputModeController {
    pub fn new(
        pipeline: SubmissionPipeline,
        backend: Box<dyn CaptureBackend>,
        transcriber: Box<dyn Transcriber>,
        event_tx: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(1);
        Self {
            state: State::Idle,
            state_entered_at: None,
            draft: String::new(),
            session: None,
            playback: None,
            backend,
            transcriber,
            pipeline,
            completion_tx,
            completion_rx,
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Recording retained from the last capture, if any
    #[cfg(test)]
    pub fn playback(&self) -> Option<&AudioHandle> {
        self.playback.as_ref()
    }

    #[cfg(test)]
    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &crate::conversation::Conversation {
        self.pipeline.conversation()
    }

    /// Process inputs until the input channel closes.
    ///
    /// Completion of an in-flight submission is processed as it arrives, so
    /// inputs received meanwhile are rejected rather than queued.
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<ControllerInput>) {
        info!("input controller started in Idle state");

        loop {
            tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => {
                        self.handle(input).await;
                    }
                    None => break,
                },
                Some(outcome) = self.completion_rx.recv() => {
                    self.complete(outcome);
                }
            }
        }

        if self.state == State::Busy {
            info!("waiting for in-flight submission before stopping");
            self.await_completion().await;
        }
        self.reset();

        info!("input controller stopped");
    }

    /// Apply one input. Returns `false` when the input was rejected or had
    /// no effect.
    pub async fn handle(&mut self, input: ControllerInput) -> bool {
        if self.state == State::Busy || self.pipeline.is_busy() {
            self.reject(&input);
            return false;
        }

        match input {
            ControllerInput::DraftChanged(text) => self.draft_changed(text),
            ControllerInput::SubmitText(text) => self.submit_text(text),
            ControllerInput::MicToggle => self.mic_toggle().await,
            ControllerInput::CaptureFailure => self.capture_failure().await,
            ControllerInput::Reset => {
                self.reset();
                true
            }
        }
    }

    /// Wait for the in-flight submission and apply its completion
    pub async fn await_completion(&mut self) -> Option<SubmissionOutcome> {
        if self.state != State::Busy {
            return None;
        }
        let outcome = self.completion_rx.recv().await?;
        self.complete(outcome.clone());
        Some(outcome)
    }

    fn draft_changed(&mut self, text: String) -> bool {
        if self.state == State::Capturing {
            self.reject(&ControllerInput::DraftChanged(text));
            return false;
        }

        let next = if text.trim().is_empty() {
            State::Idle
        } else {
            State::TextComposing
        };
        self.draft = text;
        if next != self.state {
            self.transition_to(next);
        }
        true
    }

    fn submit_text(&mut self, text: String) -> bool {
        if self.state == State::Capturing {
            self.reject(&ControllerInput::SubmitText(text));
            return false;
        }
        if text.trim().is_empty() {
            debug!("ignoring empty submission");
            return false;
        }

        self.release_playback();
        self.draft.clear();
        self.dispatch(text);
        true
    }

    async fn mic_toggle(&mut self) -> bool {
        match self.session.take() {
            Some(session) => self.finish_capture(session).await,
            None => self.start_capture().await,
        }
    }

    async fn start_capture(&mut self) -> bool {
        self.release_playback();

        match CaptureSession::begin(self.backend.as_mut()) {
            Ok(session) => {
                self.session = Some(session);
                self.draft.clear();
                self.transition_to(State::Capturing);
                let _ = self.event_tx.send(ControllerEvent::CaptureStarted);
                true
            }
            Err(reason) => {
                self.capture_failed(reason).await;
                false
            }
        }
    }

    async fn finish_capture(&mut self, session: CaptureSession) -> bool {
        let result = session.finalize(self.backend.as_mut(), self.transcriber.as_mut());

        match result {
            Ok(output) => {
                let duration_ms = output.duration.as_millis() as u64;
                info!(duration_ms, bytes = output.audio.len(), "capture finalized");
                let _ = self.event_tx.send(ControllerEvent::CaptureStopped {
                    duration_ms,
                    audio_bytes: output.audio.len(),
                });
                let _ = self.event_tx.send(ControllerEvent::PlaybackReady {
                    audio_id: output.audio.id(),
                    mime_type: output.audio.mime_type().to_string(),
                    bytes: output.audio.len(),
                });
                self.playback = Some(output.audio);

                self.dispatch(wrap_voice_transcript(&output.transcript));
                true
            }
            Err(reason) => {
                self.capture_failed(reason).await;
                false
            }
        }
    }

    async fn capture_failure(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                let reason = session.abort(self.backend.as_mut());
                self.capture_failed(reason).await;
                true
            }
            None => {
                self.reject(&ControllerInput::CaptureFailure);
                false
            }
        }
    }

    async fn capture_failed(&mut self, reason: CaptureError) {
        warn!(%reason, "voice capture failed");
        self.pipeline
            .conversation()
            .append(Turn::agent(CAPTURE_FAILED_MESSAGE))
            .await;
        if self.state != State::Idle {
            self.transition_to(State::Idle);
        }
    }

    /// Enter Busy and hand the text to the pipeline on its own task
    fn dispatch(&mut self, text: String) {
        self.transition_to(State::Busy);

        let pipeline = self.pipeline.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = pipeline.submit(&text).await;
            if completion_tx.send(outcome).await.is_err() {
                warn!("controller dropped before submission completed");
            }
        });
    }

    fn complete(&mut self, outcome: SubmissionOutcome) {
        match &outcome {
            SubmissionOutcome::Replied => info!("submission completed"),
            SubmissionOutcome::Failed(e) => info!(kind = e.kind(), "submission completed with error"),
            SubmissionOutcome::Skipped => debug!("submission skipped"),
        }
        if self.state == State::Busy {
            self.transition_to(State::Idle);
        }
    }

    fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort(self.backend.as_mut());
        }
        self.release_playback();
        self.draft.clear();
        if self.state != State::Idle {
            self.transition_to(State::Idle);
        }
    }

    fn release_playback(&mut self) {
        if let Some(audio) = self.playback.take() {
            debug!(audio_id = audio.id(), "releasing playback");
            let _ = self.event_tx.send(ControllerEvent::PlaybackReleased {
                audio_id: audio.id(),
            });
        }
    }

    fn reject(&self, input: &ControllerInput) {
        debug!(input = input.name(), state = %self.state, "input rejected");
        let _ = self.event_tx.send(ControllerEvent::InputRejected {
            input: input.name().to_string(),
            state: self.state,
        });
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: State) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != State::Idle {
            Some(Instant::now())
        } else {
            None
        };

        let _ = self.event_tx.send(ControllerEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }
}
