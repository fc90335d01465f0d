//! Input mode state machine
//!
//! Provides an explicit state machine with four states:
//! - Idle: Nothing typed, no capture running
//! - TextComposing: A non-empty draft is being typed
//! - Capturing: Voice capture running, typed input disabled
//! - Busy: A submission is in flight, all input disabled

mod machine;

pub use machine::{ControllerInput, InputModeController, State};
