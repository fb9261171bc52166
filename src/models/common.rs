use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::utils::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint used when the input is a transaction hash
    pub rpc_url: Option<Url>,
    /// Signature database queried for unknown topics and selectors
    pub signature_service_url: Option<Url>,
    /// Directory of `<address>.json` contract ABIs
    pub abi_dir: Option<PathBuf>,
    #[serde(default = "default_pipeline_timeout")]
    pub pipeline_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_pipeline_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Network {
    Ethereum,
    ZKsync,
    Other(u64),
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Self {
        match chain_id {
            1 => Self::Ethereum,
            232 | 320 | 324 | 325 | 388 | 1217 | 1345 | 2741 | 2904 | 9637 | 50104 | 61166
            | 543210 => Self::ZKsync, // Lens | ZKcandy | ZKsync Era | GRVT | OpenZK | SxT | Cronos zkEVM | Abstract | Ripio LaChain | WonderFi | Sophon | Treasure Chain | Zero Network
            other => Self::Other(other),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Ethereum => "ethereum".to_string(),
            Self::ZKsync => "zksync".to_string(),
            Self::Other(id) => format!("chain_{}", id),
        }
    }
}

/// Per-transaction input as handed to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub receipt: Value,
    #[serde(default)]
    pub logs: Vec<Value>,
    #[serde(default)]
    pub trace: Option<Value>,
    #[serde(default)]
    pub network_id: u64,
}

impl RawTransaction {
    /// Logs given explicitly, otherwise the ones embedded in the receipt.
    pub fn log_entries(&self) -> &[Value] {
        if !self.logs.is_empty() {
            return &self.logs;
        }
        match self.receipt.get("logs") {
            Some(Value::Array(logs)) => logs,
            _ => &[],
        }
    }

    pub fn network(&self) -> Network {
        Network::from_chain_id(self.network_id)
    }
}
