use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::{future::Future, io::ErrorKind};
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, warn};

use crate::models::errors::{RetryError, ServiceError};
use crate::utils::cancel::ExecutionContext;
use crate::utils::strip_html;

const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

// JSON-RPC "limit exceeded", returned by most hosted providers when throttling
const RPC_LIMIT_EXCEEDED: i64 = -32005;

// Lowercased fragments of transient network failures that only surface as text
const TRANSIENT_MARKERS: [&str; 10] = [
    "connection reset",
    "connection refused",
    "timed out",
    "timeout",
    "deadline exceeded",
    "no such host",
    "dns error",
    "failed to lookup address",
    "temporary",
    "temporarily unavailable",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub attempt_timeout_ms: u64,
    /// Held back from the parent deadline so a timed-out attempt can still report
    pub safety_margin_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            attempt_timeout_ms: 30_000,
            safety_margin_ms: 500,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    /// Geometric growth capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.as_secs_f64() * self.backoff_factor.max(1.0);
        Duration::from_secs_f64(grown.min(self.max_delay().as_secs_f64()))
    }
}

/// Timeout for the next attempt: the per-attempt timeout, shortened to what
/// is left of the parent deadline minus the safety margin.
pub fn attempt_timeout(
    config: &RetryConfig,
    remaining: Option<Duration>,
    operation: &str,
) -> Result<Duration, RetryError> {
    let per_attempt = config.attempt_timeout();
    let Some(remaining) = remaining else {
        return Ok(per_attempt);
    };

    match remaining.checked_sub(config.safety_margin()) {
        Some(budget) if !budget.is_zero() => Ok(per_attempt.min(budget)),
        _ => Err(RetryError::InsufficientTime {
            operation: operation.to_string(),
            attempts: 0,
            remaining,
            margin: config.safety_margin(),
            last_error: None,
        }),
    }
}

/// Whether a failure is worth another attempt. Anything not recognised as
/// transient is terminal.
pub fn is_retryable(err: &Error) -> bool {
    for cause in err.chain() {
        if let Some(service) = cause.downcast_ref::<ServiceError>() {
            match service {
                ServiceError::Status { status, .. } => {
                    return RETRYABLE_STATUS_CODES.contains(status);
                }
                ServiceError::AttemptTimeout(_) => return true,
                ServiceError::Rpc { code, .. } => return *code == RPC_LIMIT_EXCEEDED,
                ServiceError::MalformedResponse(_) => return false,
            }
        }

        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() || e.is_connect() {
                return true;
            }
            if let Some(status) = e.status() {
                return RETRYABLE_STATUS_CODES.contains(&status.as_u16());
            }
        }

        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
                    | ErrorKind::Interrupted
            ) {
                return true;
            }
        }

        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
    }

    err.chain().any(|cause| {
        let message = cause.to_string().to_lowercase();
        TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
    })
}

/// Runs `operation` until it succeeds, fails terminally, runs out of
/// attempts, or the context is cancelled or out of time.
pub async fn retry<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    ctx: &ExecutionContext,
    context: &str,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = config.max_attempts();
    let mut attempts = 0;
    let mut delay = config.initial_delay();
    let mut last_error: Option<Error> = None;

    loop {
        if ctx.is_cancelled() {
            return Err(RetryError::Cancelled {
                operation: context.to_string(),
                attempts,
            });
        }
        // An elapsed parent deadline fails without spending an attempt
        if ctx.is_expired() {
            return Err(RetryError::DeadlineExceeded {
                operation: context.to_string(),
                attempts,
                last_error,
            });
        }
        let attempt_timeout = match attempt_timeout(config, ctx.remaining(), context) {
            Ok(attempt_timeout) => attempt_timeout,
            Err(RetryError::InsufficientTime {
                remaining, margin, ..
            }) => {
                return Err(RetryError::InsufficientTime {
                    operation: context.to_string(),
                    attempts,
                    remaining,
                    margin,
                    last_error,
                });
            }
            Err(e) => return Err(e),
        };
        attempts += 1;

        let outcome = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(RetryError::Cancelled {
                    operation: context.to_string(),
                    attempts,
                });
            }
            outcome = timeout(attempt_timeout, operation()) => outcome,
        };

        let e = match outcome {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) => e,
            Err(_) => Error::new(ServiceError::AttemptTimeout(attempt_timeout)),
        };

        if !is_retryable(&e) {
            warn!(
                "Operation '{}' failed with a non-retryable error on attempt {}: {}",
                context,
                attempts,
                strip_html(&e.to_string())
            );
            return Err(RetryError::Terminal {
                operation: context.to_string(),
                attempts,
                source: e,
            });
        }

        if attempts >= max_attempts {
            error!(
                "Operation '{}' failed after {} attempts. Final error: {}",
                context,
                attempts,
                strip_html(&e.to_string())
            );
            return Err(RetryError::Exhausted {
                operation: context.to_string(),
                attempts,
                source: e,
            });
        }

        let mut wait = if config.jitter {
            delay.mul_f64(0.5 + fastrand::f64() * 0.5)
        } else {
            delay
        };
        if let Some(remaining) = ctx.remaining() {
            wait = wait.min(remaining);
        }

        warn!(
            "Attempt {}/{} for '{}' failed: {}. Retrying in {}ms...",
            attempts,
            max_attempts,
            context,
            strip_html(&e.to_string()),
            wait.as_millis()
        );

        tokio::select! {
            _ = ctx.cancelled() => {
                return Err(RetryError::Cancelled {
                    operation: context.to_string(),
                    attempts,
                });
            }
            _ = sleep(wait) => {}
        }

        last_error = Some(e);
        delay = config.next_delay(delay);
    }
}
