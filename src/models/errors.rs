use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{0}' is already registered")]
    DuplicateStage(String),
    #[error("Stage '{stage}' depends on unregistered stage '{dependency}'")]
    MissingDependency { stage: String, dependency: String },
    #[error("Dependency cycle detected: ordered {ordered} of {registered} stages, unresolved: {unresolved:?}")]
    Cycle {
        registered: usize,
        ordered: usize,
        unresolved: Vec<String>,
    },
    #[error("Stage '{stage}' reads '{key}' but no dependency of it writes that key")]
    UnavailableKey { stage: String, key: String },
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Pipeline cancelled before stage '{stage}' completed")]
    Cancelled { stage: String },
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' cancelled after {attempts} attempts")]
    Cancelled { operation: String, attempts: u32 },
    #[error("Operation '{operation}' hit the parent deadline after {attempts} attempts")]
    DeadlineExceeded {
        operation: String,
        attempts: u32,
        /// Failure of the last attempt, if any ran
        #[source]
        last_error: Option<anyhow::Error>,
    },
    #[error("Operation '{operation}' has insufficient time after {attempts} attempts: {remaining:?} left, {margin:?} safety margin")]
    InsufficientTime {
        operation: String,
        attempts: u32,
        remaining: Duration,
        margin: Duration,
        #[source]
        last_error: Option<anyhow::Error>,
    },
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("Operation '{operation}' failed with a non-retryable error on attempt {attempts}: {source}")]
    Terminal {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl RetryError {
    /// Number of attempts that actually ran before this outcome.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Cancelled { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. }
            | RetryError::InsufficientTime { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Terminal { attempts, .. } => *attempts,
        }
    }

    /// Failure that led up to this outcome, when there was one.
    pub fn last_error(&self) -> Option<&anyhow::Error> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Terminal { source, .. } => Some(source),
            RetryError::DeadlineExceeded { last_error, .. }
            | RetryError::InsufficientTime { last_error, .. } => last_error.as_ref(),
            RetryError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Attempt timed out after {0:?}")]
    AttemptTimeout(Duration),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}
