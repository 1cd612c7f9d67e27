//! Host agent probing and lookup.
//!
//! A probe asks one host whether a host agent listens there. Lookup tries the
//! current candidate host first and falls back to the default gateway, which
//! is where the host agent lives when this process runs in a container.
//!
//! ```text
//!   candidate host ──ok──> Found(candidate)
//!        │ fail
//!        v
//!   default gateway ──none/err──> GatewayUnavailable
//!        │ some(G)
//!        v
//!   probe G ──ok──> Found(G)
//!        │ fail
//!        v
//!     NotFound
//! ```

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::error::{DiscoveryError, Result};
use crate::gateway::GatewayResolver;
use crate::transport::{AgentTransport, Method};

/// Result of one host lookup pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// A host agent identified itself at this address
    Found(String),
    /// Candidate failed and no gateway could be resolved
    GatewayUnavailable(String),
    /// Neither the candidate nor the gateway answered correctly
    NotFound {
        /// Gateway address that was probed
        gateway: String,
    },
}

/// Single-shot identity check against a host.
#[derive(Clone)]
pub struct HostProber {
    transport: Arc<dyn AgentTransport>,
    config: Arc<AgentConfig>,
}

impl HostProber {
    /// Create a prober using `transport`
    pub fn new(transport: Arc<dyn AgentTransport>, config: Arc<AgentConfig>) -> Self {
        Self { transport, config }
    }

    /// Check whether a correctly identifying host agent answers at `host`.
    pub async fn check_host(&self, host: &str) -> Result<()> {
        tracing::debug!("checking host {}", host);

        let url = self.config.url(host, "/");
        let found = self
            .transport
            .header_probe(&url, Method::GET, &self.config.identity_header)
            .await?;

        if found.as_deref() == Some(self.config.identity_value.as_str()) {
            Ok(())
        } else {
            Err(DiscoveryError::UnexpectedIdentity {
                host: host.to_string(),
                found,
            })
        }
    }

    /// Find a reachable host agent, trying `candidate` before the gateway.
    pub async fn lookup(&self, candidate: &str, gateway: &dyn GatewayResolver) -> LookupOutcome {
        match self.check_host(candidate).await {
            Ok(()) => return LookupOutcome::Found(candidate.to_string()),
            Err(e) => tracing::debug!("host {} rejected: {}", candidate, e),
        }

        let gateway = match gateway.default_gateway() {
            Ok(Some(addr)) => addr.to_string(),
            Ok(None) => {
                return LookupOutcome::GatewayUnavailable(
                    "default gateway not available".to_string(),
                )
            },
            Err(e) => {
                return LookupOutcome::GatewayUnavailable(format!(
                    "failed to fetch the default gateway: {e}"
                ))
            },
        };

        match self.check_host(&gateway).await {
            Ok(()) => LookupOutcome::Found(gateway),
            Err(e) => {
                tracing::debug!("gateway {} rejected: {}", gateway, e);
                LookupOutcome::NotFound { gateway }
            },
        }
    }
}
