use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::models::values::{DecodedValue, Parameter};
use crate::utils::deserialize_quantity;

////////////////////////////////////// RPC Data ////////////////////////////////////////
// Raw log as found in a transaction receipt
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLogData {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub block_number: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub transaction_index: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub log_index: Option<u64>,
    #[serde(default)]
    pub removed: bool,
}

/////////////////////////////////// Decoded Data ///////////////////////////////////////
/// Which path produced an event's name and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeSource {
    /// Verified contract ABI
    Abi,
    /// Name from the signature service, parameters positional
    Signature,
    /// Fully positional
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub contract: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// Decoded event name, or the raw topic[0] hash when unknown
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub source: DecodeSource,
    pub parameters: Vec<Parameter>,
    pub block_number: Option<u64>,
    pub tx_index: Option<u64>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

impl Event {
    pub fn param(&self, name: &str) -> Option<&DecodedValue> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}
