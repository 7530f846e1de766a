//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Base URL of the report backend.
    pub backend_url: String,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Input device name to prefer; `None` selects the system default.
    pub preferred_input_device: Option<String>,
    /// Silence-guard floor forwarded to the controller.
    pub min_artifact_bytes: usize,
    /// Answer turns from an in-process stub instead of the backend.
    pub use_stub_backend: bool,
    /// Capture from an in-process stub instead of the microphone.
    pub use_stub_recorder: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".into(),
            request_timeout_secs: 30,
            preferred_input_device: None,
            min_artifact_bytes: 1024,
            use_stub_backend: false,
            use_stub_recorder: false,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let trimmed = self.backend_url.trim().trim_end_matches('/');
        self.backend_url = if trimmed.is_empty() {
            AppSettings::default().backend_url
        } else {
            trimmed.to_string()
        };
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 600);
        self.min_artifact_bytes = self.min_artifact_bytes.min(1 << 20);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Attest")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("attest")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}
