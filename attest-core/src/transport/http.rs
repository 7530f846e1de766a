//! HTTP implementation of the transport contract.
//!
//! Uses the blocking reqwest client on purpose: the controller invokes
//! transport calls inside `tokio::task::spawn_blocking`, so the async
//! executor never stalls, and the client's whole-request timeout doubles as
//! the session's request-timeout policy (expiry surfaces as
//! `AttestError::Transport`).

use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    HistoryEntry, ProcessReply, ProcessRequest, TranscribeReply, TransportClient, AUDIO_FIELD,
    AUDIO_FILE_NAME,
};
use crate::audio::AudioArtifact;
use crate::error::{AttestError, Result};

/// Configuration for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the report backend, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Whole-request timeout applied to both endpoints.
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking HTTP client for the report backend.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AttestError::Transport {
                detail: Some(format!("client build: {e}")),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl TransportClient for HttpTransport {
    fn process_text(&self, text: &str, history: &[HistoryEntry]) -> Result<ProcessReply> {
        let body = ProcessRequest {
            text: text.to_owned(),
            history: history.to_vec(),
        };
        debug!(history_len = history.len(), "submitting text turn");

        let response = self
            .client
            .post(self.endpoint("/api/process-text"))
            .json(&body)
            .send()
            .map_err(request_failure)?;

        if !response.status().is_success() {
            return Err(failure_with_detail(response));
        }
        response
            .json::<ProcessReply>()
            .map_err(|e| AttestError::MalformedResponse(format!("process-text decode: {e}")))
    }

    fn transcribe_audio(&self, artifact: AudioArtifact) -> Result<TranscribeReply> {
        debug!(bytes = artifact.len(), "submitting audio for transcription");

        let part = multipart::Part::bytes(artifact.bytes)
            .file_name(AUDIO_FILE_NAME)
            .mime_str(artifact.mime)
            .map_err(|e| AttestError::Transport {
                detail: Some(format!("multipart part: {e}")),
            })?;
        let form = multipart::Form::new().part(AUDIO_FIELD, part);

        let response = self
            .client
            .post(self.endpoint("/api/transcribe-audio"))
            .multipart(form)
            .send()
            .map_err(request_failure)?;

        if !response.status().is_success() {
            return Err(failure_with_detail(response));
        }
        response
            .json::<TranscribeReply>()
            .map_err(|e| AttestError::MalformedResponse(format!("transcribe decode: {e}")))
    }
}

/// Map a non-2xx response to `Transport`, extracting the server's `detail`.
fn failure_with_detail(response: Response) -> AttestError {
    let status = response.status();
    let detail = response
        .json::<Value>()
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned));
    warn!(%status, ?detail, "backend returned non-success status");
    AttestError::Transport { detail }
}

fn request_failure(e: reqwest::Error) -> AttestError {
    AttestError::Transport {
        detail: if e.is_timeout() {
            Some("request timed out".into())
        } else {
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let transport = HttpTransport::new(HttpTransportConfig {
            base_url: "http://localhost:8000/".into(),
            ..Default::default()
        })
        .expect("build transport");

        assert_eq!(
            transport.endpoint("/api/process-text"),
            "http://localhost:8000/api/process-text"
        );
    }
}
