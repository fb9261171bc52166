use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use alloy_primitives::{hex, Address};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decoder::traces::collect_contracts;
use crate::models::abi::{AbiMethod, ContractInfo};
use crate::models::datasets::logs::RpcLogData;
use crate::models::datasets::traces::TraceFormat;
use crate::models::errors::RetryError;
use crate::pipeline::stage::Stage;
use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::stages::require_raw_data;
use crate::utils::cancel::ExecutionContext;

/// Loads contract ABIs from `<dir>/<address>.json`. A contract counts as
/// verified when its file exists and parses.
pub struct ContractAbiStage {
    dir: PathBuf,
}

impl ContractAbiStage {
    pub const NAME: &'static str = "resolve_contracts";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, address: &Address) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode_prefixed(address)))
    }
}

#[async_trait]
impl Stage for ContractAbiStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reads(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::RawData]
    }

    fn writes(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::ResolvedContracts]
    }

    async fn process(&self, ctx: &ExecutionContext, workspace: &mut Workspace) -> Result<()> {
        let raw = require_raw_data(workspace, Self::NAME)?;

        let mut addresses: Vec<Address> = Vec::new();
        for log in raw.log_entries() {
            if let Ok(log) = serde_json::from_value::<RpcLogData>(log.clone()) {
                if !addresses.contains(&log.address) {
                    addresses.push(log.address);
                }
            }
        }
        if let Some(trace) = &raw.trace {
            for address in collect_contracts(trace, TraceFormat::detect(trace)) {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }

        let loads = addresses.iter().map(|address| {
            let path = self.path_for(address);
            async move { (*address, load_contract(&path).await) }
        });

        let results = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(RetryError::Cancelled {
                    operation: Self::NAME.to_string(),
                    attempts: 0,
                }
                .into());
            }
            results = join_all(loads) => results,
        };

        let mut contracts = HashMap::with_capacity(results.len());
        for (address, result) in results {
            let info = match result {
                Ok(Some(info)) => info,
                Ok(None) => ContractInfo::default(),
                Err(e) => {
                    warn!("Ignoring unreadable ABI for {}: {:#}", address, e);
                    ContractInfo::default()
                }
            };
            contracts.insert(address, info);
        }

        let verified = contracts.values().filter(|info| info.verified).count();
        info!(
            "Resolved {} contracts from {} ({} verified)",
            contracts.len(),
            self.dir.display(),
            verified
        );
        workspace.set_resolved_contracts(contracts);
        Ok(())
    }
}

/// None when no ABI file exists for the contract.
async fn load_contract(path: &Path) -> Result<Option<ContractInfo>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No ABI at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    let document: Value = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let abi = AbiMethod::from_json_abi(&document)?;
    let name = ["contractName", "name"]
        .iter()
        .find_map(|field| document.get(*field).and_then(Value::as_str))
        .map(str::to_string);

    Ok(Some(ContractInfo {
        name,
        verified: true,
        abi,
    }))
}
