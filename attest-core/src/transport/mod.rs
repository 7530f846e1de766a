//! Transport client — stateless request/response against the report backend.
//!
//! ## Wire contract (field names normative)
//!
//! | Call | Request | Reply |
//! |------|---------|-------|
//! | `POST /api/process-text` | `{ text, history: [{role, content}] }` | `{ status, intent?, data?, prompt? }` |
//! | `POST /api/transcribe-audio` | multipart field `audio_file` | `{ transcript }` |
//!
//! Non-2xx bodies are probed for a `detail` string, which becomes the
//! user-facing failure message.
//!
//! Implementations are single-shot and side-effect-free on failure — no
//! retry logic lives here. The controller calls them from `spawn_blocking`
//! and drops completions whose request token has been invalidated; that
//! token discipline is what makes cancellation cooperative.

pub mod http;
pub mod stub;

use serde::{Deserialize, Serialize};

use crate::audio::AudioArtifact;
use crate::error::{AttestError, Result};
use crate::session::state::Role;

/// Multipart form field carrying the audio artifact.
pub const AUDIO_FIELD: &str = "audio_file";

/// File name attached to the uploaded artifact.
pub const AUDIO_FILE_NAME: &str = "audio.wav";

/// One `{role, content}` pair of conversation history.
///
/// History excludes the message being submitted and strips the local
/// `isError` flag — the backend never sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/process-text`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequest {
    pub text: String,
    pub history: Vec<HistoryEntry>,
}

/// Reply to `POST /api/process-text`, discriminated by `status`.
///
/// Fields are optional *in the type*; whether they are required for a given
/// status is enforced by [`ProcessOutcome::from_reply`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProcessReply {
    Complete {
        #[serde(default)]
        intent: Option<String>,
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
    Incomplete {
        #[serde(default)]
        prompt: Option<String>,
    },
    Error {
        #[serde(default)]
        intent: Option<String>,
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
}

/// Reply to `POST /api/transcribe-audio`.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeReply {
    pub transcript: String,
}

/// Validated domain outcome the controller routes on.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Terminal: the backend produced a report.
    Complete {
        intent: String,
        data: serde_json::Value,
    },
    /// The backend needs another turn; the prompt may be absent.
    Incomplete { prompt: Option<String> },
    /// Domain-level rejection from the classifier. Recoverable and
    /// user-visible — distinct from a transport failure.
    Unsupported { message: Option<String> },
}

impl ProcessOutcome {
    /// Validate a parsed reply against the requirements of its declared
    /// status.
    ///
    /// # Errors
    /// `AttestError::MalformedResponse` when a `complete` reply lacks an
    /// intent or a non-empty data payload, or an `error` reply carries an
    /// unrecognized intent.
    pub fn from_reply(reply: ProcessReply) -> Result<Self> {
        match reply {
            ProcessReply::Complete { intent, data } => {
                let intent = intent.filter(|i| !i.trim().is_empty()).ok_or_else(|| {
                    AttestError::MalformedResponse("status=complete without an intent".into())
                })?;
                let data = data
                    .filter(|d| !d.is_null() && d.as_object().map_or(true, |o| !o.is_empty()))
                    .ok_or_else(|| {
                        AttestError::MalformedResponse(
                            "status=complete without a data payload".into(),
                        )
                    })?;
                Ok(Self::Complete { intent, data })
            }
            ProcessReply::Incomplete { prompt } => Ok(Self::Incomplete {
                prompt: prompt.filter(|p| !p.trim().is_empty()),
            }),
            ProcessReply::Error { intent, data } => {
                if intent.as_deref() == Some("unsupported") {
                    let message = data
                        .as_ref()
                        .and_then(|d| d.get("errorMessage"))
                        .and_then(|m| m.as_str())
                        .map(str::to_owned);
                    Ok(Self::Unsupported { message })
                } else {
                    Err(AttestError::MalformedResponse(format!(
                        "status=error with unrecognized intent {intent:?}"
                    )))
                }
            }
        }
    }
}

/// Contract for backends handling text turns and audio transcription.
pub trait TransportClient: Send + Sync + 'static {
    /// Submit one text turn with the conversation so far.
    fn process_text(&self, text: &str, history: &[HistoryEntry]) -> Result<ProcessReply>;

    /// Submit a finished audio artifact for transcription. Consumes it.
    fn transcribe_audio(&self, artifact: AudioArtifact) -> Result<TranscribeReply>;
}
