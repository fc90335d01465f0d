//! Notifications emitted by the controller and pipeline
//!
//! Presentation layers subscribe to these on a broadcast channel; the
//! controller itself never renders anything.

use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::state::State;

/// Events broadcast to presentation subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// The input mode changed
    StateChanged { from: State, to: State },

    /// A turn was appended to the conversation
    TurnAppended { turn: Turn },

    /// Microphone acquired, capture running
    CaptureStarted,

    /// Capture finalized and microphone released
    CaptureStopped {
        /// Duration in milliseconds that capture was active
        duration_ms: u64,
        /// Size of the recorded audio artifact
        audio_bytes: usize,
    },

    /// A recorded clip is available for playback
    PlaybackReady {
        audio_id: u64,
        mime_type: String,
        bytes: usize,
    },

    /// The retained clip was released
    PlaybackReleased { audio_id: u64 },

    /// An input was ignored because the current state does not allow it
    InputRejected { input: String, state: State },
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({} -> {})", from, to)
            }
            ControllerEvent::TurnAppended { turn } => write!(f, "TURN_APPENDED ({})", turn.role()),
            ControllerEvent::CaptureStarted => write!(f, "CAPTURE_STARTED"),
            ControllerEvent::CaptureStopped { duration_ms, .. } => {
                write!(f, "CAPTURE_STOPPED ({}ms)", duration_ms)
            }
            ControllerEvent::PlaybackReady {
                audio_id, mime_type, ..
            } => {
                write!(f, "PLAYBACK_READY (#{} {})", audio_id, mime_type)
            }
            ControllerEvent::PlaybackReleased { audio_id } => {
                write!(f, "PLAYBACK_RELEASED (#{})", audio_id)
            }
            ControllerEvent::InputRejected { input, state } => {
                write!(f, "INPUT_REJECTED ({} in {})", input, state)
            }
        }
    }
}
