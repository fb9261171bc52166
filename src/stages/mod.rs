pub mod contracts;
pub mod decode_calls;
pub mod decode_events;
pub mod signatures;

pub use contracts::ContractAbiStage;
pub use decode_calls::CallDecoderStage;
pub use decode_events::EventDecoderStage;
pub use signatures::SignatureLookupStage;

use anyhow::{anyhow, Result};

use crate::models::abi::AbiIndex;
use crate::models::common::RawTransaction;
use crate::pipeline::workspace::Workspace;

pub(crate) fn require_raw_data<'w>(workspace: &'w Workspace, stage: &str) -> Result<&'w RawTransaction> {
    workspace
        .raw_data()
        .ok_or_else(|| anyhow!("'{}' requires raw_data, which is not populated", stage))
}

pub(crate) fn abi_index(workspace: &Workspace) -> Option<AbiIndex> {
    workspace
        .resolved_contracts()
        .map(AbiIndex::from_contracts)
        .filter(|index| !index.is_empty())
}
