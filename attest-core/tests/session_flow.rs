//! End-to-end session scenarios driven through the public surface:
//! gestures in via `SessionHandle`, state out via the snapshot watch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;

use attest_core::error::Result;
use attest_core::transport::HistoryEntry;
use attest_core::{
    AttestError, AudioArtifact, ControllerConfig, Mode, ProcessReply, Role, SessionController,
    SessionSnapshot, StubRecorder, TranscribeReply, TransportClient,
};

const WAIT: Duration = Duration::from_secs(5);

/// Scripted backend: pops one reply per text turn; optionally holds each
/// call on a gate so tests can cancel before settlement.
struct ScriptedBackend {
    replies: Mutex<Vec<Result<ProcessReply>>>,
    gate: Option<crossbeam_channel::Receiver<()>>,
    transcribe_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<ProcessReply>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            gate: None,
            transcribe_calls: AtomicUsize::new(0),
        })
    }

    fn gated(
        replies: Vec<Result<ProcessReply>>,
        gate: crossbeam_channel::Receiver<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            gate: Some(gate),
            transcribe_calls: AtomicUsize::new(0),
        })
    }
}

impl TransportClient for ScriptedBackend {
    fn process_text(&self, _text: &str, _history: &[HistoryEntry]) -> Result<ProcessReply> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        self.replies.lock().remove(0)
    }

    fn transcribe_audio(&self, _artifact: AudioArtifact) -> Result<TranscribeReply> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TranscribeReply {
            transcript: "red sedan heading north".into(),
        })
    }
}

async fn wait_until<F>(rx: &mut watch::Receiver<SessionSnapshot>, pred: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for snapshot")
        .expect("controller dropped")
        .clone()
}

#[tokio::test]
async fn incomplete_reply_lands_as_assistant_prompt() {
    let backend = ScriptedBackend::new(vec![Ok(ProcessReply::Incomplete {
        prompt: Some("What was the speed recorded?".into()),
    })]);
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    tokio::spawn(controller.run());

    handle.submit_text("speeding on Main St");

    let snap = wait_until(&mut snapshots, |s| s.entries.len() == 2).await;
    assert_eq!(snap.mode, Mode::Idle);
    assert_eq!(snap.entries[0].role, Role::User);
    assert_eq!(snap.entries[0].content, "speeding on Main St");
    assert_eq!(snap.entries[1].role, Role::Assistant);
    assert_eq!(snap.entries[1].content, "What was the speed recorded?");
    assert!(!snap.entries[1].is_error);
}

#[tokio::test]
async fn complete_reply_stores_titled_report() {
    let backend = ScriptedBackend::new(vec![Ok(ProcessReply::Complete {
        intent: Some("create_traffic_offence_report".into()),
        data: Some(json!({ "speed": "60 mph", "location": "Main St" })),
    })]);
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    tokio::spawn(controller.run());

    handle.submit_text("caught a driver doing 60 in a 30 on Main St");

    let snap = wait_until(&mut snapshots, |s| s.report.is_some()).await;
    assert_eq!(snap.mode, Mode::Idle);

    let report = snap.report.expect("report");
    assert_eq!(report.title, "Traffic Offence Report");
    assert_eq!(report.intent, "create_traffic_offence_report");
    assert_eq!(report.data["location"], "Main St");
    assert_eq!(
        snap.entries.last().expect("entry").content,
        "Report generated successfully."
    );
}

#[tokio::test]
async fn short_artifact_never_reaches_the_backend() {
    let backend = ScriptedBackend::new(vec![]);
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::silent()),
        ControllerConfig::default(),
    );
    tokio::spawn(controller.run());

    handle.start_record();
    wait_until(&mut snapshots, |s| s.mode == Mode::Recording).await;

    handle.stop_record();
    let snap = wait_until(&mut snapshots, |s| s.mode == Mode::Idle).await;

    assert!(snap.entries.is_empty());
    assert!(snap.draft.is_empty());
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_request_ignores_its_late_reply() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded(1);
    let backend = ScriptedBackend::gated(
        vec![Ok(ProcessReply::Incomplete {
            prompt: Some("too late".into()),
        })],
        gate_rx,
    );
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    let diagnostics = controller.diagnostics();
    tokio::spawn(controller.run());

    handle.submit_text("speeding on Main St");
    wait_until(&mut snapshots, |s| s.mode == Mode::Processing).await;

    handle.cancel_request();
    let snap = wait_until(&mut snapshots, |s| s.mode == Mode::Idle).await;
    assert_eq!(snap.entries.len(), 2);
    assert_eq!(snap.entries[1].content, "Request cancelled.");

    // Release the held reply; it arrives with an invalidated token.
    gate_tx.send(()).expect("release gate");
    let deadline = tokio::time::Instant::now() + WAIT;
    while diagnostics.snapshot().stale_completions == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stale completion never admitted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let after = snapshots.borrow().clone();
    assert_eq!(after.mode, Mode::Idle);
    assert_eq!(after.entries.len(), 2);
    assert_eq!(after.entries[1].content, "Request cancelled.");
}

#[tokio::test]
async fn recording_flows_into_draft_then_submission() {
    let backend = ScriptedBackend::new(vec![Ok(ProcessReply::Incomplete {
        prompt: Some("Which direction was it heading?".into()),
    })]);
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    tokio::spawn(controller.run());

    handle.start_record();
    wait_until(&mut snapshots, |s| s.mode == Mode::Recording).await;
    handle.stop_record();

    // Transcript populates the draft and nothing is auto-sent.
    let snap = wait_until(&mut snapshots, |s| !s.draft.is_empty()).await;
    assert_eq!(snap.draft, "red sedan heading north");
    assert_eq!(snap.mode, Mode::Idle);
    assert!(snap.entries.is_empty());

    // The user reviews the draft and submits it as a text turn.
    handle.submit_text(snap.draft.clone());
    let snap = wait_until(&mut snapshots, |s| s.entries.len() == 2).await;
    assert_eq!(snap.entries[0].content, "red sedan heading north");
    assert!(snap.draft.is_empty());
}

#[tokio::test]
async fn transport_failure_surfaces_flagged_entry() {
    let backend = ScriptedBackend::new(vec![Err(AttestError::Transport { detail: None })]);
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    tokio::spawn(controller.run());

    handle.submit_text("speeding on Main St");

    let snap = wait_until(&mut snapshots, |s| s.entries.len() == 2).await;
    assert_eq!(snap.mode, Mode::Idle);
    let last = &snap.entries[1];
    assert!(last.is_error);
    assert_eq!(last.content, "Error: Could not connect to server.");
}

#[tokio::test]
async fn reset_during_processing_clears_and_ignores_late_reply() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded(1);
    let backend = ScriptedBackend::gated(
        vec![Ok(ProcessReply::Incomplete {
            prompt: Some("ghost".into()),
        })],
        gate_rx,
    );
    let (controller, handle, mut snapshots) = SessionController::new(
        backend.clone(),
        Box::new(StubRecorder::speaking()),
        ControllerConfig::default(),
    );
    let diagnostics = controller.diagnostics();
    tokio::spawn(controller.run());

    handle.submit_text("speeding on Main St");
    wait_until(&mut snapshots, |s| s.mode == Mode::Processing).await;

    handle.reset();
    let snap = wait_until(&mut snapshots, |s| s.entries.is_empty() && s.mode == Mode::Idle).await;
    assert!(snap.report.is_none());
    assert!(snap.draft.is_empty());

    gate_tx.send(()).expect("release gate");
    let deadline = tokio::time::Instant::now() + WAIT;
    while diagnostics.snapshot().stale_completions == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stale completion never admitted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let after = snapshots.borrow().clone();
    assert!(after.entries.is_empty());
    assert_eq!(after.mode, Mode::Idle);
}
