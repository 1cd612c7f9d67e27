//! Single-shot retry timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Arms one delayed action at a time.
///
/// Scheduling again aborts the previous timer if it has not fired yet.
/// Dropping the scheduler aborts the pending timer.
#[derive(Debug)]
pub struct RetryScheduler {
    period: Duration,
    pending: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    /// Scheduler firing after `period`
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            pending: None,
        }
    }

    /// Retry delay
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `action` once on its own task after the retry period.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let period = self.period;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            action.await;
        }));
    }

    /// Abort the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
