//! Speech-to-text
//!
//! No real recognizer ships with the client. [`SimulatedTranscriber`] stands
//! in for one and can be swapped for any [`Transcriber`] implementation.

use rand::seq::SliceRandom;
use tracing::debug;

use super::microphone::CaptureError;
use super::session::AudioHandle;

/// Phrases the simulated transcriber picks from
pub const SIMULATED_PHRASES: [&str; 5] = [
    "Write me a beautiful poem about stars and destiny.",
    "I need a short, flirty message for my partner before a date tonight.",
    "Give me advice on how to express my feelings better.",
    "Draft a heartfelt apology note for a small mistake I made.",
    "Tell me a romantic fun fact about the universe.",
];

/// Converts a recorded clip to text
pub trait Transcriber: Send {
    /// Produce a transcript; must be non-empty on success
    fn transcribe(&mut self, audio: &AudioHandle) -> Result<String, CaptureError>;
}

/// Picks one of [`SIMULATED_PHRASES`] uniformly at random
#[derive(Debug, Default)]
pub struct SimulatedTranscriber;

impl Transcriber for SimulatedTranscriber {
    fn transcribe(&mut self, audio: &AudioHandle) -> Result<String, CaptureError> {
        let phrase = SIMULATED_PHRASES
            .choose(&mut rand::thread_rng())
            .ok_or(CaptureError::EmptyTranscript)?;
        debug!(audio_id = audio.id(), bytes = audio.len(), "simulated transcription");
        Ok((*phrase).to_string())
    }
}

/// Always returns the same transcript
#[derive(Debug, Clone)]
pub struct FixedTranscriber {
    transcript: String,
}

impl FixedTranscriber {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl Transcriber for FixedTranscriber {
    fn transcribe(&mut self, _audio: &AudioHandle) -> Result<String, CaptureError> {
        Ok(self.transcript.clone())
    }
}
