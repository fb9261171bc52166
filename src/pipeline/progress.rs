use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    NotStarted,
    Running,
    Finished,
    Errored,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Running => "running",
            StageStatus::Finished => "finished",
            StageStatus::Errored => "errored",
        }
    }
}

/// Receives stage status transitions. Never influences scheduling.
pub trait ProgressSink: Send + Sync {
    fn on_transition(&self, stage: &str, status: StageStatus);
}

/// Writes transitions to the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_transition(&self, stage: &str, status: StageStatus) {
        match status {
            StageStatus::NotStarted => debug!("Stage '{}' queued", stage),
            StageStatus::Running => info!("Stage '{}' running", stage),
            StageStatus::Finished => info!("Stage '{}' finished", stage),
            StageStatus::Errored => warn!("Stage '{}' errored", stage),
        }
    }
}
