//! Voice capture
//!
//! The microphone and the speech-to-text step are both pluggable: the
//! controller only sees [`CaptureBackend`], [`Transcriber`] and the
//! [`CaptureSession`] that ties them together.

mod microphone;
mod session;
mod transcriber;

pub use microphone::{CaptureBackend, CaptureError, SimulatedMicrophone};
pub use session::{AudioHandle, CaptureSession};
pub use transcriber::{FixedTranscriber, SimulatedTranscriber, Transcriber};

/// Marks a transcript as voice-sourced before it is submitted
pub fn wrap_voice_transcript(transcript: &str) -> String {
    format!("[VOICE INPUT] \"{}\" (Playback Ready)", transcript.trim())
}
