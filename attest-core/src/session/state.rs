//! Session data model — the single mutable aggregate and its read view.

use serde::{Deserialize, Serialize};

use super::report::FinalReport;

/// The controller's current discrete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No capture and no request in flight; gestures are accepted.
    Idle,
    /// Microphone held; audio accumulating.
    Recording,
    /// Artifact submitted for transcription.
    Transcribing,
    /// Text turn submitted for processing.
    Processing,
}

impl Mode {
    /// Whether a network request may be in flight in this mode.
    ///
    /// The controller's active-request slot is `Some` exactly when this
    /// returns `true`.
    pub fn has_active_request(self) -> bool {
        matches!(self, Mode::Transcribing | Mode::Processing)
    }
}

/// Author of a conversation entry (wire-normative casing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One immutable line of the conversation timeline.
///
/// Entries are appended in chronological order and never reordered or
/// removed except by a full reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    /// Flags entries that surface a failure, for distinct styling by hosts.
    #[serde(default)]
    pub is_error: bool,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            is_error: false,
        }
    }

    /// A flagged assistant entry surfacing a failure.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            is_error: true,
        }
    }
}

/// The single mutable aggregate, exclusively owned by the controller.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub mode: Mode,
    pub entries: Vec<ConversationEntry>,
    /// Pending input text. Populated by a successful transcription; never
    /// auto-submitted.
    pub draft: String,
    /// At most one live report per session; replaced wholesale.
    pub report: Option<FinalReport>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            entries: Vec::new(),
            draft: String::new(),
            report: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode,
            entries: self.entries.clone(),
            draft: self.draft.clone(),
            report: self.report.clone(),
        }
    }
}

/// Read-only view of session state, published after every admitted event.
///
/// Presentation layers hold only this — they never touch `SessionState`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub entries: Vec<ConversationEntry>,
    pub draft: String,
    pub report: Option<FinalReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Mode::Transcribing).expect("serialize mode"),
            "transcribing"
        );
        let round_trip: Mode = serde_json::from_str("\"recording\"").expect("deserialize mode");
        assert_eq!(round_trip, Mode::Recording);
    }

    #[test]
    fn entry_serializes_with_camel_case_flag() {
        let entry = ConversationEntry::error("Could not connect to server.");
        let json = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn entry_flag_defaults_to_false_on_decode() {
        let entry: ConversationEntry =
            serde_json::from_str(r#"{"role":"user","content":"hello"}"#)
                .expect("deserialize entry");
        assert!(!entry.is_error);
        assert_eq!(entry.role, Role::User);
    }

    #[test]
    fn only_network_modes_carry_an_active_request() {
        assert!(!Mode::Idle.has_active_request());
        assert!(!Mode::Recording.has_active_request());
        assert!(Mode::Transcribing.has_active_request());
        assert!(Mode::Processing.has_active_request());
    }
}
