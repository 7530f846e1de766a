//! `SessionController` — the session state machine.
//!
//! ## States and transitions
//!
//! ```text
//! idle ──submit-text──► processing ──completion──► idle
//! idle ──start-record─► recording ──stop-record──► transcribing ──► idle
//!                         │  └─cancel-record──► idle
//!                         └─(artifact below floor: straight back to idle)
//! processing|transcribing ──cancel-request──► idle (token invalidated)
//! any ──reset──► idle (entries, draft, report cleared)
//! ```
//!
//! `submit-text` and `start-record` are silently rejected unless the mode
//! is `idle`, which is what enforces at-most-one concurrent operation.
//!
//! ## Event admission
//!
//! The controller is driven by discrete events from one queue — user
//! gestures and request completions — and applies each to completion before
//! admitting the next. Transport calls run in `spawn_blocking`; their
//! results re-enter the queue tagged with a [`events::RequestToken`]. A
//! completion whose token no longer matches the active slot is dropped, so
//! a slow late response can never clobber state set by a later gesture.

pub mod events;
pub mod report;
pub mod state;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    audio::AudioRecorder,
    error::AttestError,
    transport::{HistoryEntry, ProcessOutcome, ProcessReply, TranscribeReply, TransportClient},
};
use events::{RequestToken, SessionEvent, SessionHandle};
use report::FinalReport;
use state::{ConversationEntry, Mode, SessionSnapshot, SessionState};

/// Entry appended when an in-flight request is abandoned.
const REQUEST_CANCELLED_NOTE: &str = "Request cancelled.";
/// Entry appended when a recording is abandoned before transcription.
const RECORDING_CANCELLED_NOTE: &str = "Recording cancelled.";
/// Entry appended alongside a stored report.
const REPORT_READY_NOTE: &str = "Report generated successfully.";
/// Substitute prompt when an incomplete reply carries none.
const MISSING_PROMPT_NOTE: &str =
    "I need more information, but I'm unable to formulate a question.";
/// Apology for a domain-level rejection without a server message.
const UNSUPPORTED_NOTE: &str =
    "I'm sorry, I can't help with that. Please provide a traffic offence or investigation report.";
/// Notice appended when microphone access is refused.
const MIC_PERMISSION_NOTE: &str =
    "Microphone access is required for the voice feature. Please check system permissions.";
/// Generic entry for replies that violate their declared status.
const MALFORMED_REPLY_NOTE: &str =
    "The service returned an unexpected response. Please try again.";
/// Fallback transport detail for text turns.
const CONNECT_FAILURE_DETAIL: &str = "Could not connect to server.";
/// Fallback transport detail for transcription.
const AUDIO_FAILURE_DETAIL: &str = "Could not process audio.";

/// Configuration for `SessionController`.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Artifacts smaller than this many bytes are treated as silence and
    /// discarded without a transcription request.
    pub min_artifact_bytes: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_artifact_bytes: 1024,
        }
    }
}

/// Shared controller counters for observability.
#[derive(Debug, Default)]
pub struct ControllerDiagnostics {
    pub gestures_rejected: AtomicUsize,
    pub requests_started: AtomicUsize,
    pub requests_cancelled: AtomicUsize,
    pub stale_completions: AtomicUsize,
    pub artifacts_discarded: AtomicUsize,
}

impl ControllerDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            gestures_rejected: self.gestures_rejected.load(Ordering::Relaxed),
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
            stale_completions: self.stale_completions.load(Ordering::Relaxed),
            artifacts_discarded: self.artifacts_discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub gestures_rejected: usize,
    pub requests_started: usize,
    pub requests_cancelled: usize,
    pub stale_completions: usize,
    pub artifacts_discarded: usize,
}

/// The session state machine. Exclusively owns the session aggregate;
/// presentation layers interact through a [`SessionHandle`] and a
/// `watch::Receiver<SessionSnapshot>`.
pub struct SessionController {
    config: ControllerConfig,
    transport: Arc<dyn TransportClient>,
    recorder: Box<dyn AudioRecorder>,
    state: SessionState,
    /// The single active-request slot: `Some` ⇔ mode ∈ {transcribing, processing}.
    active: Option<RequestToken>,
    next_token: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    diagnostics: Arc<ControllerDiagnostics>,
}

impl SessionController {
    /// Create a controller plus its gesture handle and snapshot receiver.
    pub fn new(
        transport: Arc<dyn TransportClient>,
        recorder: Box<dyn AudioRecorder>,
        config: ControllerConfig,
    ) -> (Self, SessionHandle, watch::Receiver<SessionSnapshot>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = SessionState::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let handle = SessionHandle::new(events_tx.clone());

        let controller = Self {
            config,
            transport,
            recorder,
            state,
            active: None,
            next_token: 0,
            events_tx,
            events_rx,
            snapshot_tx,
            diagnostics: Arc::new(ControllerDiagnostics::default()),
        };

        (controller, handle, snapshot_rx)
    }

    /// Shared counters; grab a clone before handing the controller to `run`.
    pub fn diagnostics(&self) -> Arc<ControllerDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Current read view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Run the admission loop until every `SessionHandle` is dropped.
    pub async fn run(mut self) {
        info!("session controller running");
        while let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
        info!("session controller stopped — all handles dropped");
    }

    /// Apply one admitted event. Runs to completion before the next event.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SubmitText(text) => self.on_submit_text(text),
            SessionEvent::StartRecord => self.on_start_record(),
            SessionEvent::StopRecord => self.on_stop_record(),
            SessionEvent::CancelRecord => self.on_cancel_record(),
            SessionEvent::CancelRequest => self.on_cancel_request(),
            SessionEvent::Reset => self.on_reset(),
            SessionEvent::ProcessFinished { token, reply } => {
                self.on_process_finished(token, reply)
            }
            SessionEvent::TranscribeFinished { token, reply } => {
                self.on_transcribe_finished(token, reply)
            }
        }

        // mode and the active-request slot move together; divergence is a
        // defect, not a recoverable condition.
        debug_assert_eq!(self.active.is_some(), self.state.mode.has_active_request());

        self.publish();
    }

    // ── Gestures ─────────────────────────────────────────────────────────

    fn on_submit_text(&mut self, text: String) {
        if self.state.mode != Mode::Idle {
            self.reject_gesture("submit-text");
            return;
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            self.reject_gesture("submit-text(empty)");
            return;
        }

        self.state.entries.push(ConversationEntry::user(text.clone()));
        self.state.draft.clear();
        self.state.report = None;

        let history = self.history_excluding_last();
        let token = self.issue_token();
        self.state.mode = Mode::Processing;
        info!(chars = text.len(), "text turn submitted");

        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();
        tokio::task::spawn_blocking(move || {
            let reply = transport.process_text(&text, &history);
            // Receiver gone means the controller shut down; nothing to deliver.
            let _ = tx.send(SessionEvent::ProcessFinished { token, reply });
        });
    }

    fn on_start_record(&mut self) {
        if self.state.mode != Mode::Idle {
            self.reject_gesture("start-record");
            return;
        }

        match self.recorder.start() {
            Ok(()) => {
                self.state.mode = Mode::Recording;
            }
            Err(AttestError::PermissionDenied(reason)) => {
                warn!(%reason, "microphone permission denied");
                self.state.entries.push(ConversationEntry::error(MIC_PERMISSION_NOTE));
            }
            Err(e) => {
                warn!(error = %e, "failed to start recording");
                self.state
                    .entries
                    .push(ConversationEntry::error(format!("Could not start recording: {e}")));
            }
        }
    }

    fn on_stop_record(&mut self) {
        if self.state.mode != Mode::Recording {
            self.reject_gesture("stop-record");
            return;
        }

        let artifact = match self.recorder.stop() {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(error = %e, "failed to finalize recording");
                self.state
                    .entries
                    .push(ConversationEntry::error(format!("Recording failed: {e}")));
                self.state.mode = Mode::Idle;
                return;
            }
        };

        if artifact.len() < self.config.min_artifact_bytes {
            debug!(
                bytes = artifact.len(),
                floor = self.config.min_artifact_bytes,
                "recording too short or silent — discarded"
            );
            self.diagnostics
                .artifacts_discarded
                .fetch_add(1, Ordering::Relaxed);
            self.state.mode = Mode::Idle;
            return;
        }

        let token = self.issue_token();
        self.state.mode = Mode::Transcribing;
        info!(bytes = artifact.len(), "artifact submitted for transcription");

        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();
        tokio::task::spawn_blocking(move || {
            let reply = transport.transcribe_audio(artifact);
            let _ = tx.send(SessionEvent::TranscribeFinished { token, reply });
        });
    }

    fn on_cancel_record(&mut self) {
        if self.state.mode != Mode::Recording {
            self.reject_gesture("cancel-record");
            return;
        }

        self.recorder.cancel();
        self.state.mode = Mode::Idle;
        self.state
            .entries
            .push(ConversationEntry::assistant(RECORDING_CANCELLED_NOTE));
    }

    fn on_cancel_request(&mut self) {
        if self.active.take().is_none() {
            self.reject_gesture("cancel-request");
            return;
        }

        self.diagnostics
            .requests_cancelled
            .fetch_add(1, Ordering::Relaxed);
        info!(mode = ?self.state.mode, "in-flight request cancelled");

        self.state.mode = Mode::Idle;
        self.state
            .entries
            .push(ConversationEntry::assistant(REQUEST_CANCELLED_NOTE));
    }

    fn on_reset(&mut self) {
        info!("session reset");
        if self.state.mode == Mode::Recording {
            self.recorder.cancel();
        }
        if self.active.take().is_some() {
            self.diagnostics
                .requests_cancelled
                .fetch_add(1, Ordering::Relaxed);
        }
        self.state = SessionState::new();
    }

    // ── Completions ──────────────────────────────────────────────────────

    fn on_process_finished(
        &mut self,
        token: RequestToken,
        reply: crate::error::Result<ProcessReply>,
    ) {
        if self.active != Some(token) {
            self.drop_stale("process", token);
            return;
        }
        self.active = None;
        self.state.mode = Mode::Idle;

        match reply.and_then(ProcessOutcome::from_reply) {
            Ok(ProcessOutcome::Complete { intent, data }) => {
                let report = FinalReport::new(intent, data);
                info!(intent = %report.intent, title = %report.title, "report generated");
                self.state.report = Some(report);
                self.state
                    .entries
                    .push(ConversationEntry::assistant(REPORT_READY_NOTE));
            }
            Ok(ProcessOutcome::Incomplete { prompt }) => {
                self.state.entries.push(ConversationEntry::assistant(
                    prompt.unwrap_or_else(|| MISSING_PROMPT_NOTE.to_string()),
                ));
            }
            Ok(ProcessOutcome::Unsupported { message }) => {
                self.state.entries.push(ConversationEntry::error(
                    message.unwrap_or_else(|| UNSUPPORTED_NOTE.to_string()),
                ));
            }
            Err(AttestError::MalformedResponse(reason)) => {
                warn!(%reason, "malformed process reply");
                self.state
                    .entries
                    .push(ConversationEntry::error(MALFORMED_REPLY_NOTE));
            }
            Err(e) => {
                self.state.entries.push(ConversationEntry::error(format!(
                    "Error: {}",
                    transport_detail(&e, CONNECT_FAILURE_DETAIL)
                )));
            }
        }
    }

    fn on_transcribe_finished(
        &mut self,
        token: RequestToken,
        reply: crate::error::Result<TranscribeReply>,
    ) {
        if self.active != Some(token) {
            self.drop_stale("transcribe", token);
            return;
        }
        self.active = None;
        self.state.mode = Mode::Idle;

        match reply {
            Ok(reply) => {
                info!(chars = reply.transcript.len(), "transcription ready");
                self.state.draft = reply.transcript;
            }
            Err(e) => {
                warn!(error = %e, "transcription failed");
                self.state.entries.push(ConversationEntry::error(format!(
                    "Error during transcription: {}",
                    transport_detail(&e, AUDIO_FAILURE_DETAIL)
                )));
            }
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.active = Some(token);
        self.diagnostics
            .requests_started
            .fetch_add(1, Ordering::Relaxed);
        token
    }

    fn history_excluding_last(&self) -> Vec<HistoryEntry> {
        let end = self.state.entries.len().saturating_sub(1);
        self.state.entries[..end]
            .iter()
            .map(|entry| HistoryEntry {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect()
    }

    fn reject_gesture(&self, gesture: &str) {
        self.diagnostics
            .gestures_rejected
            .fetch_add(1, Ordering::Relaxed);
        debug!(gesture, mode = ?self.state.mode, "gesture rejected by mode guard");
    }

    fn drop_stale(&self, kind: &str, token: RequestToken) {
        self.diagnostics
            .stale_completions
            .fetch_add(1, Ordering::Relaxed);
        debug!(kind, ?token, active = ?self.active, "stale completion dropped");
    }

    fn publish(&self) {
        // send_replace publishes even while no receiver is subscribed.
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}

/// Extract the server-provided detail from a transport failure, or fall
/// back to the context-appropriate generic message.
fn transport_detail(error: &AttestError, fallback: &str) -> String {
    match error {
        AttestError::Transport {
            detail: Some(detail),
        } => detail.clone(),
        _ => fallback.to_string(),
    }
}
