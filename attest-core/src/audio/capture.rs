//! Microphone capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block on a mutex, or perform I/O. The callback
//! therefore writes directly into an SPSC ring buffer producer whose
//! `push_slice` is lock-free and allocation-free; the capture thread drains
//! the consumer side on a timer tick.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). The stream is therefore created, held, and dropped entirely inside
//! one dedicated capture thread. Dropping the stream is what releases the
//! microphone, and it happens on every exit path of that thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{encode_wav_pcm16, resample, AudioArtifact, AudioRecorder, ARTIFACT_SAMPLE_RATE};
use crate::error::{AttestError, Result};

/// Ring capacity: 2^20 f32 samples ≈ 21.8 s at 48 kHz — enough headroom for
/// the 50 ms drain tick to hiccup badly without dropping audio.
const RING_CAPACITY: usize = 1 << 20;

/// How often the capture thread drains the ring into the take buffer.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for `CpalRecorder`.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Input device name to prefer; `None` selects the system default.
    pub preferred_device: Option<String>,
    /// Hard cap on capture length. Samples past the cap are dropped with a
    /// warning rather than growing the take without bound.
    pub max_capture_secs: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            preferred_device: None,
            max_capture_secs: 300,
        }
    }
}

enum CaptureCommand {
    /// Finalize the take into an artifact.
    Finish,
    /// Release the microphone and discard the take.
    Discard,
}

struct ActiveCapture {
    command_tx: Sender<CaptureCommand>,
    artifact_rx: Receiver<Result<AudioArtifact>>,
    thread: Option<JoinHandle<()>>,
}

/// Microphone recorder producing one finite artifact per start/stop cycle.
pub struct CpalRecorder {
    config: RecorderConfig,
    active: Option<ActiveCapture>,
}

impl CpalRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    fn join_thread(active: &mut ActiveCapture) {
        if let Some(thread) = active.thread.take() {
            let _ = thread.join();
        }
    }
}

impl AudioRecorder for CpalRecorder {
    fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(AttestError::AlreadyRecording);
        }

        let (open_tx, open_rx) = bounded::<Result<u32>>(1);
        let (command_tx, command_rx) = bounded::<CaptureCommand>(1);
        let (artifact_tx, artifact_rx) = bounded::<Result<AudioArtifact>>(1);

        let preferred = self.config.preferred_device.clone();
        let max_capture_secs = self.config.max_capture_secs;

        let thread = std::thread::Builder::new()
            .name("attest-capture".into())
            .spawn(move || {
                capture_thread(preferred, max_capture_secs, open_tx, command_rx, artifact_tx)
            })
            .map_err(|e| AttestError::AudioDevice(format!("capture thread spawn: {e}")))?;

        // Block until the device is confirmed open (or refused).
        match open_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!(sample_rate, "recording started");
                self.active = Some(ActiveCapture {
                    command_tx,
                    artifact_rx,
                    thread: Some(thread),
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AttestError::AudioDevice(
                    "capture thread died before opening the device".into(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<AudioArtifact> {
        let mut active = self.active.take().ok_or(AttestError::NotRecording)?;

        let _ = active.command_tx.send(CaptureCommand::Finish);
        let artifact = active.artifact_rx.recv().map_err(|_| {
            AttestError::AudioStream("capture thread exited before finalizing".into())
        })?;
        Self::join_thread(&mut active);
        artifact
    }

    fn cancel(&mut self) {
        if let Some(mut active) = self.active.take() {
            let _ = active.command_tx.send(CaptureCommand::Discard);
            Self::join_thread(&mut active);
            info!("recording cancelled — take discarded");
        }
    }
}

impl Drop for CpalRecorder {
    fn drop(&mut self) {
        // Microphone must not outlive its owner.
        self.cancel();
    }
}

/// Body of the dedicated capture thread. The stream never leaves this scope.
fn capture_thread(
    preferred: Option<String>,
    max_capture_secs: u32,
    open_tx: Sender<Result<u32>>,
    command_rx: Receiver<CaptureCommand>,
    artifact_tx: Sender<Result<AudioArtifact>>,
) {
    let (producer, mut consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
    let running = Arc::new(AtomicBool::new(true));

    let (stream, capture_rate) = match open_stream(preferred.as_deref(), producer, &running) {
        Ok(opened) => {
            let _ = open_tx.send(Ok(opened.1));
            opened
        }
        Err(e) => {
            let _ = open_tx.send(Err(e));
            return;
        }
    };

    let cap_samples = capture_rate as usize * max_capture_secs as usize;
    let mut take: Vec<f32> = Vec::new();
    let mut scratch = vec![0f32; 8192];
    let mut dropped_at_cap = 0usize;

    let tick = crossbeam_channel::tick(DRAIN_INTERVAL);
    let command = loop {
        crossbeam_channel::select! {
            recv(command_rx) -> cmd => break cmd.unwrap_or(CaptureCommand::Discard),
            recv(tick) -> _ => {
                drain_ring(&mut consumer, &mut take, cap_samples, &mut scratch, &mut dropped_at_cap);
            }
        }
    };

    // Silence the callback, then release the microphone before any heavy work.
    running.store(false, Ordering::Release);
    drop(stream);

    match command {
        CaptureCommand::Discard => {
            debug!(samples = take.len(), "take discarded");
        }
        CaptureCommand::Finish => {
            drain_ring(
                &mut consumer,
                &mut take,
                cap_samples,
                &mut scratch,
                &mut dropped_at_cap,
            );
            if dropped_at_cap > 0 {
                warn!(
                    dropped = dropped_at_cap,
                    max_capture_secs, "capture cap reached — tail dropped"
                );
            }
            let _ = artifact_tx.send(finalize_take(&take, capture_rate));
        }
    }
}

fn finalize_take(take: &[f32], capture_rate: u32) -> Result<AudioArtifact> {
    let resampled = resample::convert(take, capture_rate, ARTIFACT_SAMPLE_RATE)?;
    let bytes = encode_wav_pcm16(&resampled, ARTIFACT_SAMPLE_RATE)?;
    info!(
        captured_samples = take.len(),
        artifact_bytes = bytes.len(),
        "artifact finalized"
    );
    Ok(AudioArtifact::new(bytes))
}

fn drain_ring(
    consumer: &mut HeapCons<f32>,
    take: &mut Vec<f32>,
    cap_samples: usize,
    scratch: &mut [f32],
    dropped_at_cap: &mut usize,
) {
    loop {
        let n = consumer.pop_slice(scratch);
        if n == 0 {
            break;
        }
        let room = cap_samples.saturating_sub(take.len());
        let kept = n.min(room);
        take.extend_from_slice(&scratch[..kept]);
        *dropped_at_cap += n - kept;
    }
}

/// Open an input stream on the preferred device, falling back to the system
/// default and then the first available input.
fn open_stream(
    preferred: Option<&str>,
    mut producer: HeapProd<f32>,
    running: &Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let mut selected_device = None;

    if let Some(preferred_name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                selected_device = devices.find(|device| {
                    device
                        .name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                });
                if selected_device.is_none() {
                    warn!(
                        "preferred input device '{}' not found, falling back",
                        preferred_name
                    );
                }
            }
            Err(e) => {
                warn!("failed to list input devices while resolving preference: {e}");
            }
        }
    }

    let device = if let Some(device) = selected_device {
        device
    } else if let Some(default) = host.default_input_device() {
        default
    } else {
        let mut devices = host
            .input_devices()
            .map_err(|e| AttestError::AudioDevice(e.to_string()))?;
        let fallback = devices.next().ok_or(AttestError::NoDefaultInputDevice)?;
        warn!("no default input device, falling back to first available input");
        fallback
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening input device"
    );

    let supported = device
        .default_input_config()
        .map_err(classify_config_error)?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();

    info!(sample_rate, channels, "capture config selected");

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let running_f32 = Arc::clone(running);
    let running_i16 = Arc::clone(running);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let ch = channels as usize;
            let mut mix_buf: Vec<f32> = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !running_f32.load(Ordering::Relaxed) {
                        return;
                    }
                    if ch == 1 {
                        push_frames(&mut producer, data);
                        return;
                    }
                    let frames = data.len() / ch;
                    mix_buf.resize(frames, 0.0);
                    for f in 0..frames {
                        let base = f * ch;
                        let mut sum = 0f32;
                        for c in 0..ch {
                            sum += data[base + c];
                        }
                        mix_buf[f] = sum / ch as f32;
                    }
                    push_frames(&mut producer, &mix_buf);
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
        }

        SampleFormat::I16 => {
            let ch = channels as usize;
            let mut mix_buf: Vec<f32> = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !running_i16.load(Ordering::Relaxed) {
                        return;
                    }
                    let frames = data.len() / ch;
                    mix_buf.resize(frames, 0.0);
                    for f in 0..frames {
                        let base = f * ch;
                        let mut sum = 0f32;
                        for c in 0..ch {
                            sum += data[base + c] as f32 / 32768.0;
                        }
                        mix_buf[f] = sum / ch as f32;
                    }
                    push_frames(&mut producer, &mix_buf);
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
        }

        fmt => {
            return Err(AttestError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }
    .map_err(classify_build_error)?;

    stream
        .play()
        .map_err(|e| AttestError::AudioStream(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn push_frames(producer: &mut HeapProd<f32>, frames: &[f32]) {
    let written = producer.push_slice(frames);
    if written < frames.len() {
        warn!("ring buffer full: dropped {} frames", frames.len() - written);
    }
}

/// OS privacy blocks (Windows/macOS microphone consent) surface as an
/// unavailable device rather than a distinct permission code.
fn classify_build_error(e: cpal::BuildStreamError) -> AttestError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => AttestError::PermissionDenied(
            "input device unavailable — check system microphone permissions".into(),
        ),
        other => AttestError::AudioStream(other.to_string()),
    }
}

fn classify_config_error(e: cpal::DefaultStreamConfigError) -> AttestError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => AttestError::PermissionDenied(
            "input device unavailable — check system microphone permissions".into(),
        ),
        other => AttestError::AudioDevice(other.to_string()),
    }
}

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if no devices exist or enumeration fails.
pub fn list_input_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}
