//! Announce response and settings application.
//!
//! The host agent answers a successful announce with the session settings
//! for this process. The discovery core only reads `pid` (for logging); the
//! rest is handed to a [`SettingsApplier`].

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Secret-scrubbing rule pushed by the host agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsMatcher {
    /// Match mode (`contains-ignore-case`, `equals`, `regex`, ...)
    #[serde(default)]
    pub matcher: String,

    /// Patterns the matcher applies to
    #[serde(default)]
    pub list: Vec<String>,
}

/// Settings payload returned by the announce exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnounceResponse {
    /// Process id as seen by the host agent
    pub pid: u32,

    /// Host agent identifier
    pub agent_uuid: String,

    /// Secret-scrubbing configuration
    pub secrets: Option<SecretsMatcher>,

    /// HTTP headers to capture on instrumented requests
    pub extra_headers: Vec<String>,
}

/// Consumes the announce response.
pub trait SettingsApplier: Send + Sync {
    /// Apply the collector-supplied settings.
    fn apply(&self, response: &AnnounceResponse);
}

/// Keeps the last applied settings for the rest of the agent to read.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Option<AnnounceResponse>>>,
}

impl SharedSettings {
    /// Create an empty settings store
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings from the most recent successful announce
    pub fn current(&self) -> Option<AnnounceResponse> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

impl SettingsApplier for SharedSettings {
    fn apply(&self, response: &AnnounceResponse) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(response.clone()),
            Err(_) => tracing::warn!("settings lock poisoned, dropping announce response"),
        }
    }
}
