//! Sample-rate conversion for finished captures.
//!
//! cpal captures at the device's native rate (commonly 48 kHz on Windows).
//! The transcription backend wants compact 16 kHz mono WAV. Conversion runs
//! once per take, on the capture thread, after the stream has been dropped —
//! allocation and CPU cost are fine there.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{AttestError, Result};

/// Input frames fed to rubato per process call.
const CHUNK_SIZE: usize = 1024;

/// Convert a finished mono take from `capture_rate` to `target_rate`.
///
/// Passthrough (no rubato session) when the rates already match. The tail
/// shorter than one chunk is zero-padded through the resampler and the
/// output is trimmed back to the expected length, so no audio is lost at
/// the end of the take.
pub fn convert(samples: &[f32], capture_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if capture_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / capture_rate as f64;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio — no dynamic adjustment
        PolynomialDegree::Cubic,
        CHUNK_SIZE,
        1, // mono
    )
    .map_err(|e| AttestError::AudioStream(format!("resampler init: {e}")))?;

    let max_out = resampler.output_frames_max();
    let mut output_buf = vec![vec![0f32; max_out]; 1];

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(expected + max_out);

    let mut padded = vec![0f32; CHUNK_SIZE];
    for block in samples.chunks(CHUNK_SIZE) {
        let input: &[f32] = if block.len() == CHUNK_SIZE {
            block
        } else {
            padded[..block.len()].copy_from_slice(block);
            padded[block.len()..].fill(0.0);
            &padded
        };

        let (_consumed, produced) = resampler
            .process_into_buffer(&[input], &mut output_buf, None)
            .map_err(|e| AttestError::AudioStream(format!("resampler process: {e}")))?;
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn passthrough_when_rates_match() {
        let samples = vec![0.25f32; 4800];
        let out = convert(&samples, 16_000, 16_000).expect("convert");
        assert_eq!(out, samples);
    }

    #[test]
    fn downsample_48k_to_16k_keeps_length_ratio() {
        let samples: Vec<f32> = (0..48_000)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();

        let out = convert(&samples, 48_000, 16_000).expect("convert");
        assert_relative_eq!(
            out.len() as f64 / samples.len() as f64,
            1.0 / 3.0,
            epsilon = 0.01
        );
    }

    #[test]
    fn downsample_preserves_amplitude_envelope() {
        // Constant signal should stay roughly constant through cubic interpolation.
        let samples = vec![0.4f32; 48_000];
        let out = convert(&samples, 48_000, 16_000).expect("convert");

        // Skip the filter warm-up at the head of the take.
        let steady = &out[out.len() / 4..];
        let mean: f32 = steady.iter().sum::<f32>() / steady.len() as f32;
        assert_relative_eq!(mean, 0.4f32, epsilon = 0.02f32);
    }

    #[test]
    fn empty_input_stays_empty() {
        let out = convert(&[], 48_000, 16_000).expect("convert");
        assert!(out.is_empty());
    }
}
