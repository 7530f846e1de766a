use thiserror::Error;

/// All errors produced by attest-core.
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("recorder is already capturing")]
    AlreadyRecording,

    #[error("recorder is not capturing")]
    NotRecording,

    #[error("transport failure: {}", detail.as_deref().unwrap_or("connection error"))]
    Transport {
        /// Server-provided `detail` string, when one was parseable.
        detail: Option<String>,
    },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AttestError>;
