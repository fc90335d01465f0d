//! Microphone capture backends
//!
//! A backend owns the audio device. The device is acquired by
//! [`CaptureBackend::begin_capture`] and released by either
//! [`CaptureBackend::end_capture`] or [`CaptureBackend::on_capture_error`],
//! whichever ends the capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Sample rate of the simulated recording (16kHz)
const SAMPLE_RATE: u32 = 16_000;

/// Bytes per 16-bit mono sample
const BYTES_PER_SAMPLE: usize = 2;

/// Length of each emitted fragment
const FRAGMENT_DURATION: Duration = Duration::from_millis(100);

/// Recordings longer than this are truncated
const MAX_RECORDING: Duration = Duration::from_secs(30);

/// Errors that can occur while capturing voice input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone access denied")]
    Denied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture produced an empty transcript")]
    EmptyTranscript,

    #[error("capture handle #{0} is not active")]
    NotCapturing(u64),
}

/// Token for one running capture; consumed when the capture ends
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureHandle {
    id: u64,
}

impl CaptureHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Opaque blob of recorded audio
pub type AudioFragment = Vec<u8>;

/// Source of raw audio for a capture session
pub trait CaptureBackend: Send {
    /// Acquire the device and start recording
    fn begin_capture(&mut self) -> Result<CaptureHandle, CaptureError>;

    /// Stop recording, release the device and return the remaining fragments
    fn end_capture(&mut self, handle: CaptureHandle) -> Result<Vec<AudioFragment>, CaptureError>;

    /// Abandon a failed capture, release the device and report why it failed
    fn on_capture_error(&mut self, handle: CaptureHandle) -> CaptureError;

    /// MIME type of the fragments this backend produces
    fn mime_type(&self) -> &'static str;
}

/// Stand-in microphone producing silent 16kHz PCM for the time it was open
pub struct SimulatedMicrophone {
    permitted: bool,
    next_id: u64,
    active: Option<(u64, Instant)>,
    device_open: Arc<AtomicBool>,
}

impl SimulatedMicrophone {
    /// Create a microphone; `permitted = false` denies every capture
    pub fn new(permitted: bool) -> Self {
        Self {
            permitted,
            next_id: 1,
            active: None,
            device_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the device is currently held
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.device_open.load(Ordering::SeqCst)
    }

    /// Shared view of the device flag
    #[cfg(test)]
    pub fn device_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.device_open)
    }

    fn release(&mut self) {
        self.active = None;
        self.device_open.store(false, Ordering::SeqCst);
        debug!("microphone released");
    }

    fn take_active(&mut self, handle: &CaptureHandle) -> Result<Instant, CaptureError> {
        match self.active {
            Some((id, started)) if id == handle.id() => Ok(started),
            _ => Err(CaptureError::NotCapturing(handle.id())),
        }
    }
}

impl CaptureBackend for SimulatedMicrophone {
    fn begin_capture(&mut self) -> Result<CaptureHandle, CaptureError> {
        if !self.permitted {
            warn!("microphone permission denied");
            return Err(CaptureError::Denied);
        }
        if self.device_open.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("device already in use".into()));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.active = Some((id, Instant::now()));

        info!(capture_id = id, "microphone acquired");
        Ok(CaptureHandle::new(id))
    }

    fn end_capture(&mut self, handle: CaptureHandle) -> Result<Vec<AudioFragment>, CaptureError> {
        let started = self.take_active(&handle)?;
        self.release();

        let recorded = started.elapsed().min(MAX_RECORDING);
        Ok(silent_fragments(recorded))
    }

    fn on_capture_error(&mut self, handle: CaptureHandle) -> CaptureError {
        let reason = match self.take_active(&handle) {
            Ok(_) => CaptureError::DeviceUnavailable("capture interrupted".into()),
            Err(e) => e,
        };
        self.release();
        reason
    }

    fn mime_type(&self) -> &'static str {
        "audio/L16;rate=16000"
    }
}

/// Silence split into fixed-length fragments; always at least one fragment
fn silent_fragments(duration: Duration) -> Vec<AudioFragment> {
    let fragment_bytes =
        (SAMPLE_RATE as u128 * FRAGMENT_DURATION.as_millis() / 1000) as usize * BYTES_PER_SAMPLE;
    let count = (duration.as_millis() / FRAGMENT_DURATION.as_millis()).max(1) as usize;
    vec![vec![0u8; fragment_bytes]; count]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_microphone() {
        let mut mic = SimulatedMicrophone::new(false);
        assert_eq!(mic.begin_capture(), Err(CaptureError::Denied));
        assert!(!mic.is_open());
    }

    #[test]
    fn test_capture_acquires_and_releases_device() {
        let mut mic = SimulatedMicrophone::new(true);
        let handle = mic.begin_capture().unwrap();
        assert!(mic.is_open());

        let fragments = mic.end_capture(handle).unwrap();
        assert!(!mic.is_open());
        assert!(!fragments.is_empty());
        assert_eq!(fragments[0].len(), 3200);
        assert_eq!(mic.mime_type(), "audio/L16;rate=16000");
    }

    #[test]
    fn test_second_capture_rejected_while_open() {
        let mut mic = SimulatedMicrophone::new(true);
        let _handle = mic.begin_capture().unwrap();
        assert!(matches!(
            mic.begin_capture(),
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_error_releases_device() {
        let mut mic = SimulatedMicrophone::new(true);
        let handle = mic.begin_capture().unwrap();

        let reason = mic.on_capture_error(handle);
        assert!(matches!(reason, CaptureError::DeviceUnavailable(_)));
        assert!(!mic.is_open());
    }

    #[test]
    fn test_stale_handle() {
        let mut mic = SimulatedMicrophone::new(true);
        let handle = mic.begin_capture().unwrap();
        mic.end_capture(handle).unwrap();

        let result = mic.end_capture(CaptureHandle::new(1));
        assert_eq!(result, Err(CaptureError::NotCapturing(1)));
    }

    #[test]
    fn test_silent_fragments_length() {
        assert_eq!(silent_fragments(Duration::ZERO).len(), 1);
        assert_eq!(silent_fragments(Duration::from_millis(1050)).len(), 10);
    }
}
