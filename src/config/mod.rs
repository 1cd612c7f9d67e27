//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the probe binary)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};

/// Well-known host agent port
pub const DEFAULT_AGENT_PORT: u16 = 42699;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host agent discovery configuration
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DiscoveryError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| DiscoveryError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("INSTANA_AGENT_HOST") {
            if !host.is_empty() {
                config.agent.host = host;
            }
        }
        if let Ok(port) = std::env::var("INSTANA_AGENT_PORT") {
            if let Ok(port) = port.parse() {
                config.agent.port = port;
            }
        }
        if let Ok(millis) = std::env::var("HOSTAGENT_RETRY_PERIOD_MS") {
            if let Ok(millis) = millis.parse() {
                config.agent.retry_period_ms = millis;
            }
        }

        config
    }

    /// Merge with another config.
    ///
    /// Fields `other` leaves at their defaults keep the value from `self`.
    pub fn merge(self, other: Self) -> Self {
        let defaults = AgentConfig::default();
        let ours = self.agent;
        let theirs = other.agent;

        Self {
            agent: AgentConfig {
                host: prefer(ours.host, theirs.host, &defaults.host),
                port: prefer(ours.port, theirs.port, &defaults.port),
                identity_header: prefer(
                    ours.identity_header,
                    theirs.identity_header,
                    &defaults.identity_header,
                ),
                identity_value: prefer(
                    ours.identity_value,
                    theirs.identity_value,
                    &defaults.identity_value,
                ),
                discovery_path: prefer(
                    ours.discovery_path,
                    theirs.discovery_path,
                    &defaults.discovery_path,
                ),
                data_path: prefer(ours.data_path, theirs.data_path, &defaults.data_path),
                retry_period_ms: prefer(
                    ours.retry_period_ms,
                    theirs.retry_period_ms,
                    &defaults.retry_period_ms,
                ),
                max_retries: prefer(ours.max_retries, theirs.max_retries, &defaults.max_retries),
                request_timeout_secs: prefer(
                    ours.request_timeout_secs,
                    theirs.request_timeout_secs,
                    &defaults.request_timeout_secs,
                ),
                route_table: prefer(ours.route_table, theirs.route_table, &defaults.route_table),
                proc_root: prefer(ours.proc_root, theirs.proc_root, &defaults.proc_root),
            },
        }
    }
}

fn prefer<T: PartialEq>(ours: T, theirs: T, default: &T) -> T {
    if theirs != *default {
        theirs
    } else {
        ours
    }
}

/// Host agent discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Host probed first on every lookup
    pub host: String,

    /// Host agent port, also used for socket correlation
    pub port: u16,

    /// Response header carrying the agent identity
    pub identity_header: String,

    /// Expected value of the identity header
    pub identity_value: String,

    /// Announce endpoint path
    pub discovery_path: String,

    /// Data endpoint used for the readiness probe
    pub data_path: String,

    /// Delay before a failed step is retried, in milliseconds
    pub retry_period_ms: u64,

    /// Retry budget for announce and readiness steps
    pub max_retries: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Kernel routing table used for gateway lookup
    pub route_table: PathBuf,

    /// Root of the proc filesystem
    pub proc_root: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_AGENT_PORT,
            identity_header: "Server".to_string(),
            identity_value: "Instana Agent".to_string(),
            discovery_path: "/com.instana.plugin.rust.discovery".to_string(),
            data_path: "/com.instana.plugin.rust".to_string(),
            retry_period_ms: 30 * 1000,
            max_retries: 2,
            request_timeout_secs: 5,
            route_table: PathBuf::from("/proc/net/route"),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl AgentConfig {
    /// Base URL of the host agent at `host`
    pub fn base_url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.port)
    }

    /// Full URL of `path` on the host agent at `host`
    pub fn url(&self, host: &str, path: &str) -> String {
        format!("{}{}", self.base_url(host), path)
    }

    /// Retry delay as a `Duration`
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
