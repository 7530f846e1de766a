//! Event admission — gestures and completions funneled through one queue.
//!
//! Everything that can change session state arrives as a [`SessionEvent`]
//! on a single unbounded channel and is applied strictly in admission
//! order. Async completions re-enter the queue tagged with the
//! [`RequestToken`] of the request that produced them.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::transport::{ProcessReply, TranscribeReply};

/// Token bound to exactly one in-flight request.
///
/// Invalidated the instant the request settles or is cancelled. A
/// completion carrying a token that no longer matches the controller's
/// active slot is dropped without touching state — that is the whole
/// stale-response defense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(pub(crate) u64);

/// One admitted unit of work for the session controller.
#[derive(Debug)]
pub enum SessionEvent {
    /// User gesture: submit a text turn.
    SubmitText(String),
    /// User gesture: acquire the microphone and begin capturing.
    StartRecord,
    /// User gesture: finalize the capture and transcribe it.
    StopRecord,
    /// User gesture: discard the capture without transcribing.
    CancelRecord,
    /// User gesture: abandon the in-flight request, if any.
    CancelRequest,
    /// User gesture: clear the whole session.
    Reset,
    /// Completion of a `process_text` call.
    ProcessFinished {
        token: RequestToken,
        reply: Result<ProcessReply>,
    },
    /// Completion of a `transcribe_audio` call.
    TranscribeFinished {
        token: RequestToken,
        reply: Result<TranscribeReply>,
    },
}

/// Cloneable gesture surface handed to the presentation layer.
///
/// Sends are fire-and-forget: events enqueue and are applied one at a time
/// by the controller's run loop, so no two gestures ever race against the
/// same state.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn submit_text(&self, text: impl Into<String>) {
        self.send(SessionEvent::SubmitText(text.into()));
    }

    pub fn start_record(&self) {
        self.send(SessionEvent::StartRecord);
    }

    pub fn stop_record(&self) {
        self.send(SessionEvent::StopRecord);
    }

    pub fn cancel_record(&self) {
        self.send(SessionEvent::CancelRecord);
    }

    pub fn cancel_request(&self) {
        self.send(SessionEvent::CancelRequest);
    }

    pub fn reset(&self) {
        self.send(SessionEvent::Reset);
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            warn!("session controller is gone — gesture dropped");
        }
    }
}
