//! `StubRecorder` — deterministic capture backend without a microphone.
//!
//! Produces silent artifacts of a configurable length so the full session
//! loop (record → transcribe → draft) can be exercised end-to-end on
//! machines with no input device, and so tests can steer the controller's
//! silence guard precisely.

use tracing::debug;

use super::{encode_wav_pcm16, AudioArtifact, AudioRecorder, ARTIFACT_SAMPLE_RATE};
use crate::error::{AttestError, Result};

/// In-process recorder emitting silent PCM16 WAV artifacts.
pub struct StubRecorder {
    sample_count: usize,
    recording: bool,
}

impl StubRecorder {
    /// Recorder whose artifacts contain `sample_count` silent samples
    /// (44-byte WAV header + 2 bytes per sample).
    pub fn new(sample_count: usize) -> Self {
        Self {
            sample_count,
            recording: false,
        }
    }

    /// One second of silence — always clears the controller's silence guard.
    pub fn speaking() -> Self {
        Self::new(ARTIFACT_SAMPLE_RATE as usize)
    }

    /// A 50-byte artifact — always discarded as too short.
    pub fn silent() -> Self {
        Self::new(3)
    }
}

impl AudioRecorder for StubRecorder {
    fn start(&mut self) -> Result<()> {
        if self.recording {
            return Err(AttestError::AlreadyRecording);
        }
        self.recording = true;
        debug!("StubRecorder::start");
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioArtifact> {
        if !self.recording {
            return Err(AttestError::NotRecording);
        }
        self.recording = false;

        let samples = vec![0f32; self.sample_count];
        let bytes = encode_wav_pcm16(&samples, ARTIFACT_SAMPLE_RATE)?;
        debug!(bytes = bytes.len(), "StubRecorder::stop — artifact emitted");
        Ok(AudioArtifact::new(bytes))
    }

    fn cancel(&mut self) {
        self.recording = false;
        debug!("StubRecorder::cancel");
    }
}
