use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Handle that cancels every context created alongside it.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal and optional deadline threaded through every stage
/// and every retried call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new() -> (Canceller, Self) {
        let (tx, rx) = watch::channel(false);
        (
            Canceller { tx: Arc::new(tx) },
            Self {
                cancelled: rx,
                deadline: None,
            },
        )
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::new().1
    }

    /// Tightens the deadline to `now + timeout`; never extends an existing one.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once cancelled. Pends forever if the canceller is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::background()
    }
}
