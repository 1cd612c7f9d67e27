//! Transport layer abstraction for talking to the host agent.
//!
//! The state machine never speaks HTTP directly. It drives three calls:
//!
//! - **Header probe**: does a host agent answer at this address, and does it
//!   identify itself with the expected marker?
//! - **Exchange**: submit the announce payload, receive the settings payload
//! - **Head probe**: lightweight liveness check against the data endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Discovery state machine         │
//! │         (Transport-Agnostic)            │
//! └──────────────────┬──────────────────────┘
//!                    │
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  HttpTransport  │ │  test doubles   │
//! │   (reqwest)     │ │  (scripted)     │
//! └─────────────────┘ └─────────────────┘
//! ```

mod http;

pub use http::HttpTransport;
pub use reqwest::Method;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::Result;

/// Boxed future returned by transport calls.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Transport trait for pluggable host agent clients.
///
/// Implementations must be cheap to share: the state machine holds one
/// behind an `Arc` and calls it from spawned tasks.
pub trait AgentTransport: Send + Sync {
    /// Request `url` and return the value of response header `header`.
    ///
    /// `Ok(None)` means the request completed but the header was absent.
    fn header_probe<'a>(
        &'a self,
        url: &'a str,
        method: Method,
        header: &'a str,
    ) -> TransportFuture<'a, Option<String>>;

    /// Send `payload` as JSON and decode the JSON response.
    ///
    /// Returns the status code and the decoded body (`Value::Null` when empty).
    fn exchange<'a>(
        &'a self,
        url: &'a str,
        method: Method,
        payload: Value,
    ) -> TransportFuture<'a, (u16, Value)>;

    /// Issue a HEAD request; any non-success outcome is an error.
    fn head_probe<'a>(&'a self, url: &'a str) -> TransportFuture<'a, ()>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}
