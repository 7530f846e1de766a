//! Audio capture unit — owns the microphone and produces finite artifacts.
//!
//! ## Lifecycle
//!
//! ```text
//! start()  → microphone acquired, capture thread spawned
//! stop()   → stream dropped (mic released), take resampled to 16 kHz,
//!            WAV-encoded → AudioArtifact
//! cancel() → stream dropped (mic released), take discarded
//! ```
//!
//! The microphone is held exclusively between `start()` and the matching
//! `stop()`/`cancel()`. Release is guaranteed on every exit path because the
//! `cpal::Stream` lives inside the capture thread and drops when the thread
//! returns — including error returns.

pub mod resample;
pub mod stub;

#[cfg(feature = "audio-cpal")]
pub mod capture;

use std::io::Cursor;

use crate::error::{AttestError, Result};

/// MIME descriptor attached to every finished artifact.
pub const ARTIFACT_MIME: &str = "audio/wav";

/// Sample rate of finished artifacts (Hz). Captures at other device rates
/// are resampled before encoding.
pub const ARTIFACT_SAMPLE_RATE: u32 = 16_000;

/// A finished recording: immutable bytes plus MIME descriptor.
///
/// Produced once per recording session and consumed exactly once by the
/// transcription request (moved, never cloned).
#[derive(Debug)]
pub struct AudioArtifact {
    /// Encoded audio (16 kHz mono PCM16 WAV).
    pub bytes: Vec<u8>,
    /// MIME descriptor, e.g. `"audio/wav"`.
    pub mime: &'static str,
}

impl AudioArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: ARTIFACT_MIME,
        }
    }

    /// Size of the encoded artifact in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Contract for microphone capture backends.
///
/// `&mut self` expresses that a recorder is a stateful resource owner:
/// at most one capture is active per recorder.
pub trait AudioRecorder: Send + 'static {
    /// Acquire the microphone and begin capturing.
    ///
    /// # Errors
    /// - `AttestError::PermissionDenied` if the OS refuses microphone access.
    /// - `AttestError::AlreadyRecording` if a capture is already active.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing, release the microphone and finalize the artifact.
    ///
    /// # Errors
    /// - `AttestError::NotRecording` if no capture is active.
    fn stop(&mut self) -> Result<AudioArtifact>;

    /// Stop capturing, release the microphone and discard partial audio.
    ///
    /// Idempotent: calling with no active capture is a no-op.
    fn cancel(&mut self);
}

/// Encode mono f32 samples as an in-memory PCM16 WAV file.
pub(crate) fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AttestError::AudioStream(format!("wav encode: {e}")))?;
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| AttestError::AudioStream(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| AttestError::AudioStream(format!("wav finalize: {e}")))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_wav_has_header_and_pcm16_payload() {
        let samples = vec![0.0f32; 160];
        let bytes = encode_wav_pcm16(&samples, ARTIFACT_SAMPLE_RATE).expect("encode wav");

        // 44-byte canonical header + 2 bytes per sample
        assert_eq!(bytes.len(), 44 + samples.len() * 2);
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn encoder_clamps_out_of_range_samples() {
        let bytes = encode_wav_pcm16(&[2.0, -2.0], 16_000).expect("encode wav");
        let first = i16::from_le_bytes([bytes[44], bytes[45]]);
        let second = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }
}
