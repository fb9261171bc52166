use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::decoder::traces::decode_trace;
use crate::decoder::Lookups;
use crate::models::datasets::traces::TraceFormat;
use crate::pipeline::stage::Stage;
use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::stages::{abi_index, require_raw_data};
use crate::utils::cancel::ExecutionContext;

/// Flattens the transaction trace into `calls`. A transaction without a
/// trace publishes an empty list.
pub struct CallDecoderStage {
    dependencies: Vec<String>,
}

impl CallDecoderStage {
    pub const NAME: &'static str = "decode_calls";

    pub fn new() -> Self {
        Self {
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, stage: impl Into<String>) -> Self {
        self.dependencies.push(stage.into());
        self
    }
}

impl Default for CallDecoderStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for CallDecoderStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn reads(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::RawData]
    }

    fn writes(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::Calls]
    }

    async fn process(&self, _ctx: &ExecutionContext, workspace: &mut Workspace) -> Result<()> {
        let raw = require_raw_data(workspace, Self::NAME)?;

        let calls = match &raw.trace {
            Some(trace) => {
                let abi = abi_index(workspace);
                let lookups = Lookups::new(abi.as_ref(), workspace.resolved_signatures());
                decode_trace(trace, TraceFormat::detect(trace), lookups)
            }
            None => {
                debug!("No trace attached to transaction, publishing empty calls");
                Vec::new()
            }
        };

        let failed = calls.iter().filter(|call| !call.success).count();
        info!("Decoded {} calls ({} failed)", calls.len(), failed);

        workspace.set_calls(calls);
        Ok(())
    }
}
