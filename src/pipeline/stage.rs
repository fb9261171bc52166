use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::utils::cancel::ExecutionContext;

/// One named unit of pipeline work.
///
/// The scheduler runs a stage only after every stage named in
/// `dependencies()` has finished, and only if every key in `reads()` is
/// seeded or written by one of those dependencies.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name, used for ordering, logging and errors.
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Keys that must be populated before this stage runs.
    fn reads(&self) -> Vec<WorkspaceKey> {
        Vec::new()
    }

    /// Keys this stage publishes.
    fn writes(&self) -> Vec<WorkspaceKey> {
        Vec::new()
    }

    /// Cancellation observed through `ctx` must be returned as an error.
    async fn process(&self, ctx: &ExecutionContext, workspace: &mut Workspace) -> Result<()>;
}
