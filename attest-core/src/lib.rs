//! # attest-core
//!
//! Reusable session core for a voice/text report assistant.
//!
//! ## Architecture
//!
//! ```text
//! user gesture ─► SessionHandle ─► event queue ─► SessionController::apply
//!                                                     │            │
//!                                     AudioRecorder ◄─┘            └─► TransportClient
//!                                     (cpal thread)                    (spawn_blocking)
//!                                                     │
//!                                        watch::Sender<SessionSnapshot>
//! ```
//!
//! Events are admitted one at a time; transport completions re-enter the
//! queue tagged with a request token, so a cancelled request's late reply
//! is dropped instead of clobbering state set by a later gesture.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod error;
pub mod session;
pub mod transport;

// Convenience re-exports for downstream crates
pub use audio::{stub::StubRecorder, AudioArtifact, AudioRecorder};
pub use error::AttestError;
pub use session::{
    events::{SessionEvent, SessionHandle},
    report::{title_from_intent, FinalReport},
    state::{ConversationEntry, Mode, Role, SessionSnapshot},
    ControllerConfig, SessionController,
};
pub use transport::{
    http::{HttpTransport, HttpTransportConfig},
    stub::StubTransport,
    ProcessOutcome, ProcessReply, TranscribeReply, TransportClient,
};

#[cfg(feature = "audio-cpal")]
pub use audio::capture::{CpalRecorder, RecorderConfig};
