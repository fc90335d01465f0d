//! Capture session lifecycle
//!
//! A session lives from microphone acquisition until it is finalized or
//! aborted. Both paths consume the session, so the device is released
//! exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::microphone::{AudioFragment, CaptureBackend, CaptureError, CaptureHandle};
use super::transcriber::Transcriber;

/// Playable recording retained after a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    id: u64,
    mime_type: &'static str,
    bytes: Arc<[u8]>,
}

impl AudioHandle {
    pub fn new(id: u64, mime_type: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            id,
            mime_type,
            bytes: bytes.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a finalized capture
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    pub transcript: String,
    pub audio: AudioHandle,
    pub duration: Duration,
}

/// One in-progress voice capture
#[derive(Debug)]
pub struct CaptureSession {
    handle: CaptureHandle,
    fragments: Vec<AudioFragment>,
    started_at: Instant,
}

impl CaptureSession {
    /// Acquire the microphone and start a session
    pub fn begin(backend: &mut dyn CaptureBackend) -> Result<Self, CaptureError> {
        let handle = backend.begin_capture()?;
        info!(capture_id = handle.id(), "capture session started");

        Ok(Self {
            handle,
            fragments: Vec::new(),
            started_at: Instant::now(),
        })
    }

    #[cfg(test)]
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Stop recording and produce the transcript and playable audio
    pub fn finalize(
        self,
        backend: &mut dyn CaptureBackend,
        transcriber: &mut dyn Transcriber,
    ) -> Result<CaptureOutput, CaptureError> {
        let Self {
            handle,
            mut fragments,
            started_at,
        } = self;
        let id = handle.id();
        let duration = started_at.elapsed();

        fragments.extend(backend.end_capture(handle)?);
        let bytes = fragments.concat();
        debug!(
            capture_id = id,
            fragments = fragments.len(),
            bytes = bytes.len(),
            "capture stopped"
        );

        let audio = AudioHandle::new(id, backend.mime_type(), bytes);
        let transcript = transcriber.transcribe(&audio)?;
        if transcript.trim().is_empty() {
            return Err(CaptureError::EmptyTranscript);
        }

        Ok(CaptureOutput {
            transcript,
            audio,
            duration,
        })
    }

    /// Abandon the session after a failure, releasing the microphone
    pub fn abort(self, backend: &mut dyn CaptureBackend) -> CaptureError {
        let reason = backend.on_capture_error(self.handle);
        info!(%reason, "capture session aborted");
        reason
    }
}
