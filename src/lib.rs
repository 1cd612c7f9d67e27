//! # Host Agent Discovery
//!
//! Discovery-and-handshake core of a telemetry instrumentation agent. Before
//! any telemetry can flow, the instrumented process must find the co-located
//! host agent, announce itself, and confirm the agent is ready.
//!
//! ## Features
//!
//! - **Host lookup**: configured host first, then the container's default gateway
//! - **Announce**: process self-description with PID-namespace-proof pid and
//!   socket inode correlation
//! - **Readiness test**: liveness probe against the data endpoint
//! - **Self-healing**: fixed-period retries, fallback to rediscovery when the
//!   retry budget runs out
//!
//! ## Protocol Overview
//!
//! ```text
//! Instrumented process                              Host agent
//!    |                                                  |
//!    |------ GET /  (expect Server: Instana Agent) ---->|   init
//!    |<---------------------- 200 ----------------------|
//!    |                                                  |
//!    |------ PUT discovery {pid, name, args, fd, inode}>|   unannounced
//!    |<----- settings {pid, agentUuid, secrets, ...} ---|
//!    |                                                  |
//!    |------ HEAD data endpoint ----------------------->|   announced
//!    |<---------------------- 200 ----------------------|
//!    |                                                  |   ready
//! ```
//!
//! ### State Machine
//!
//! | Event      | From                                | To            | Entry action      |
//! |------------|-------------------------------------|---------------|-------------------|
//! | `init`     | none, unannounced, announced, ready | `init`        | host lookup       |
//! | `lookup`   | init                                | `unannounced` | announce          |
//! | `announce` | unannounced                         | `announced`   | readiness test    |
//! | `test`     | announced                           | `ready`       | (none)            |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hostagent::{Collaborators, Config, Discovery, ProtocolState, SharedSettings};
//!
//! let config = Config::from_env();
//! let settings = SharedSettings::new();
//! let collaborators = Collaborators::system(&config.agent, Arc::new(settings.clone()))?;
//!
//! let discovery = Discovery::spawn(config.agent, collaborators);
//! discovery.wait_for(ProtocolState::Ready).await?;
//!
//! // Collector went away: start over
//! discovery.reset();
//! ```
//!
//! ## Modules
//!
//! - [`fsm`]: State machine, retry budget and retry scheduler
//! - [`probe`]: Host probing and lookup
//! - [`process`]: Process self-identification
//! - [`gateway`]: Default gateway resolution
//! - [`transport`]: Host agent transport (HTTP)
//! - [`settings`]: Announce response handling
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod error;
pub mod fsm;
pub mod gateway;
pub mod probe;
pub mod process;
pub mod settings;
pub mod transport;

// Re-exports for convenience
pub use config::{AgentConfig, Config};
pub use error::{DiscoveryError, Result};
pub use fsm::{Collaborators, Discovery, Event, ProtocolState, RetryBudget, Snapshot};
pub use gateway::{GatewayResolver, RouteTable};
pub use probe::{HostProber, LookupOutcome};
pub use process::{DiscoveryInfo, IdentityBuilder, ProcFs, ProcessMetadata};
pub use settings::{AnnounceResponse, SettingsApplier, SharedSettings};
pub use transport::{AgentTransport, HttpTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
