//! `StubTransport` — scripted backend standing in for the remote service.
//!
//! Lets the host and integration tests exercise the full session loop
//! without a running backend: odd text turns answer `incomplete` with a
//! follow-up question, even turns answer `complete` with a sample
//! traffic-offence report.

use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use super::{HistoryEntry, ProcessReply, TranscribeReply, TransportClient};
use crate::audio::AudioArtifact;
use crate::error::Result;

/// Deterministic in-process backend.
pub struct StubTransport {
    turns: Mutex<u32>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(0),
        }
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient for StubTransport {
    fn process_text(&self, text: &str, history: &[HistoryEntry]) -> Result<ProcessReply> {
        let mut turns = self.turns.lock();
        *turns += 1;
        debug!(
            turn = *turns,
            history_len = history.len(),
            "stub backend handling text turn"
        );

        if *turns % 2 == 1 {
            Ok(ProcessReply::Incomplete {
                prompt: Some("What was the speed recorded?".into()),
            })
        } else {
            Ok(ProcessReply::Complete {
                intent: Some("create_traffic_offence_report".into()),
                data: Some(json!({
                    "offence": "speeding",
                    "location": "Main St",
                    "sourceText": text,
                })),
            })
        }
    }

    fn transcribe_audio(&self, artifact: AudioArtifact) -> Result<TranscribeReply> {
        Ok(TranscribeReply {
            transcript: format!("[stub transcript: {} bytes]", artifact.len()),
        })
    }
}
