use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::decoder::logs::decode_logs;
use crate::decoder::Lookups;
use crate::models::datasets::logs::DecodeSource;
use crate::pipeline::stage::Stage;
use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::stages::{abi_index, require_raw_data};
use crate::utils::cancel::ExecutionContext;

/// Decodes every receipt log into `events`, using whatever contract ABIs
/// and signatures earlier stages resolved.
pub struct EventDecoderStage {
    dependencies: Vec<String>,
}

impl EventDecoderStage {
    pub const NAME: &'static str = "decode_events";

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

impl Default for EventDecoderStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for EventDecoderStage {
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
        vec![WorkspaceKey::Events]
    }

    async fn process(&self, _ctx: &ExecutionContext, workspace: &mut Workspace) -> Result<()> {
        let raw = require_raw_data(workspace, Self::NAME)?;
        let abi = abi_index(workspace);
        let lookups = Lookups::new(abi.as_ref(), workspace.resolved_signatures());

        let events = decode_logs(raw.log_entries(), lookups);
        let from_abi = events
            .iter()
            .filter(|event| event.source == DecodeSource::Abi)
            .count();
        info!(
            "Decoded {} events on {} ({} from contract ABIs)",
            events.len(),
            raw.network().name(),
            from_abi
        );

        workspace.set_events(events);
        Ok(())
    }
}
