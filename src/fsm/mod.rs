//! Discovery, announce and readiness state machine.
//!
//! # State Machine
//!
//! ```text
//!              init                lookup               announce              test
//!   [none] ────────> [init] ────────────> [unannounced] ────────> [announced] ─────> [ready]
//!                      ^                       │                      │                 │
//!                      │        init (budget exhausted / reset)       │                 │
//!                      └───────────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! | Event      | Source states                          | Destination   |
//! |------------|----------------------------------------|---------------|
//! | `init`     | none, unannounced, announced, ready    | `init`        |
//! | `lookup`   | init                                   | `unannounced` |
//! | `announce` | unannounced                            | `announced`   |
//! | `test`     | announced                              | `ready`       |
//!
//! Entering `init` runs host lookup, `unannounced` runs announce, `announced`
//! runs the readiness test. `ready` has no entry action.
//!
//! # Retry Policy
//!
//! Host lookup retries forever at a fixed period: no agent has been found yet,
//! so there is nothing to fall back to. Announce and readiness share a
//! [`RetryBudget`]; when it runs out the machine fires `init` and rediscovers
//! the host from scratch.

mod machine;
mod scheduler;

pub use machine::{Collaborators, Discovery, Snapshot};
pub use scheduler::RetryScheduler;

use std::fmt;

/// Maximum retry budget for announce and readiness steps
pub const MAXIMUM_RETRIES: u32 = 2;

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// Placeholder before the first `init`
    None,
    /// Looking up the host agent
    Init,
    /// Host found, announcing this process
    Unannounced,
    /// Announced, testing readiness
    Announced,
    /// Host agent accepts telemetry
    Ready,
}

impl ProtocolState {
    /// All states, in protocol order
    pub const ALL: [ProtocolState; 5] = [
        ProtocolState::None,
        ProtocolState::Init,
        ProtocolState::Unannounced,
        ProtocolState::Announced,
        ProtocolState::Ready,
    ];

    /// Get state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Init => "init",
            Self::Unannounced => "unannounced",
            Self::Announced => "announced",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Restart discovery
    Init,
    /// Host agent found
    Lookup,
    /// Announce accepted
    Announce,
    /// Readiness confirmed
    Test,
}

impl Event {
    /// All events
    pub const ALL: [Event; 4] = [Event::Init, Event::Lookup, Event::Announce, Event::Test];

    /// Get event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Lookup => "lookup",
            Self::Announce => "announce",
            Self::Test => "test",
        }
    }

    /// Destination of this event from `from`, `None` if `from` does not admit it.
    pub fn transition(self, from: ProtocolState) -> Option<ProtocolState> {
        use ProtocolState as S;

        match (self, from) {
            (Self::Init, S::None | S::Unannounced | S::Announced | S::Ready) => Some(S::Init),
            (Self::Lookup, S::Init) => Some(S::Unannounced),
            (Self::Announce, S::Unannounced) => Some(S::Announced),
            (Self::Test, S::Announced) => Some(S::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Bounded failure counter for announce and readiness steps.
///
/// Always within `[0, maximum]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    maximum: u32,
}

impl RetryBudget {
    /// Full budget of `maximum` retries
    pub fn new(maximum: u32) -> Self {
        Self {
            remaining: maximum,
            maximum,
        }
    }

    /// Retries left
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Configured maximum
    pub fn maximum(&self) -> u32 {
        self.maximum
    }

    /// Restore the full budget
    pub fn reset(&mut self) {
        self.remaining = self.maximum;
    }

    /// Record a failure. Returns `false` once the budget is exhausted.
    pub fn consume(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    /// Whether the budget has run out
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(MAXIMUM_RETRIES)
    }
}
