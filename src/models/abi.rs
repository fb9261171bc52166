use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, Bytes, FixedBytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::errors::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Function,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiInput>,
}

impl AbiInput {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, indexed: bool) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            indexed,
            components: Vec::new(),
        }
    }

    /// Type as it appears in a canonical signature. `tuple`, `tuple[]` etc.
    /// expand to their component types.
    pub fn canonical_type(&self) -> String {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> =
                    self.components.iter().map(|c| c.canonical_type()).collect();
                format!("({}){}", inner.join(","), suffix)
            }
            None => self.kind.clone(),
        }
    }
}

/// A function or event member of a contract interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbiMethod {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MethodKind,
    pub signature: String,
    pub hash: Bytes,
    pub inputs: Vec<AbiInput>,
}

impl AbiMethod {
    pub fn new(name: impl Into<String>, kind: MethodKind, inputs: Vec<AbiInput>) -> Self {
        let name = name.into();
        let signature = canonical_signature(&name, &inputs);
        let hash = method_hash(kind, &signature);
        Self {
            name,
            kind,
            signature,
            hash,
            inputs,
        }
    }

    pub fn function(name: impl Into<String>, inputs: Vec<AbiInput>) -> Self {
        Self::new(name, MethodKind::Function, inputs)
    }

    pub fn event(name: impl Into<String>, inputs: Vec<AbiInput>) -> Self {
        Self::new(name, MethodKind::Event, inputs)
    }

    /// Parses the members of a JSON ABI. Accepts either the bare array or an
    /// artifact object carrying it under `abi`. Constructors, errors,
    /// fallbacks and anonymous events are skipped.
    pub fn from_json_abi(abi: &Value) -> Result<Vec<AbiMethod>, DecodeError> {
        let items = match abi {
            Value::Array(items) => items,
            Value::Object(obj) => match obj.get("abi") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(DecodeError::MissingField {
                        field: "abi".to_string(),
                    });
                }
            },
            _ => {
                return Err(DecodeError::MissingField {
                    field: "abi".to_string(),
                });
            }
        };

        let mut methods = Vec::new();
        for item in items {
            let item: JsonAbiItem = match serde_json::from_value(item.clone()) {
                Ok(item) => item,
                Err(e) => {
                    debug!("Skipping unparsable ABI item: {}", e);
                    continue;
                }
            };
            let kind = match item.kind.as_str() {
                "function" => MethodKind::Function,
                "event" if !item.anonymous => MethodKind::Event,
                _ => continue,
            };
            methods.push(AbiMethod::new(item.name, kind, item.inputs));
        }
        Ok(methods)
    }

    pub fn selector(&self) -> Option<FixedBytes<4>> {
        match self.kind {
            MethodKind::Function => Some(FixedBytes::from_slice(&self.hash)),
            MethodKind::Event => None,
        }
    }

    pub fn topic(&self) -> Option<B256> {
        match self.kind {
            MethodKind::Event => Some(B256::from_slice(&self.hash)),
            MethodKind::Function => None,
        }
    }

    pub fn indexed_count(&self) -> usize {
        self.inputs.iter().filter(|i| i.indexed).count()
    }
}

#[derive(Debug, Deserialize)]
struct JsonAbiItem {
    #[serde(rename = "type", default = "default_item_kind")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiInput>,
    #[serde(default)]
    anonymous: bool,
}

// Solidity ABI items without a type are functions
fn default_item_kind() -> String {
    "function".to_string()
}

pub fn canonical_signature(name: &str, inputs: &[AbiInput]) -> String {
    let types: Vec<String> = inputs.iter().map(|i| i.canonical_type()).collect();
    format!("{}({})", name, types.join(","))
}

/// keccak256 of the signature: 4-byte prefix for functions, full digest for events.
pub fn method_hash(kind: MethodKind, signature: &str) -> Bytes {
    let digest = keccak256(signature.as_bytes());
    match kind {
        MethodKind::Function => Bytes::copy_from_slice(&digest[..4]),
        MethodKind::Event => Bytes::copy_from_slice(digest.as_slice()),
    }
}

/// Splits `name(type1,(type2,type3),type4[])` into the name and its
/// top-level parameter types. Parameter names and `indexed` markers are dropped.
pub fn parse_signature(signature: &str) -> Result<(String, Vec<String>), DecodeError> {
    let signature = signature.trim();
    let open = signature
        .find('(')
        .ok_or_else(|| DecodeError::InvalidSignature(signature.to_string()))?;
    let close = signature
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or_else(|| DecodeError::InvalidSignature(signature.to_string()))?;

    let name = signature[..open].trim();
    if name.is_empty() {
        return Err(DecodeError::InvalidSignature(signature.to_string()));
    }

    let mut types = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in signature[open + 1..close].chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                push_type(&mut types, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_type(&mut types, &current);

    if depth != 0 {
        return Err(DecodeError::InvalidSignature(signature.to_string()));
    }
    Ok((name.to_string(), types))
}

fn push_type(types: &mut Vec<String>, raw: &str) {
    // "address indexed from" -> "address"
    if let Some(kind) = raw.split_whitespace().next() {
        types.push(kind.to_string());
    }
}

/// Interface data for one contract as published by ABI acquisition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContractInfo {
    pub name: Option<String>,
    pub verified: bool,
    pub abi: Vec<AbiMethod>,
}

#[derive(Debug, Clone, Default)]
struct ContractAbi {
    events: HashMap<B256, AbiMethod>,
    functions: HashMap<FixedBytes<4>, AbiMethod>,
}

/// Lookup tables over the verified contracts, keyed by topic and selector.
#[derive(Debug, Clone, Default)]
pub struct AbiIndex {
    contracts: HashMap<Address, ContractAbi>,
}

impl AbiIndex {
    pub fn from_contracts(contracts: &HashMap<Address, ContractInfo>) -> Self {
        let contracts = contracts
            .iter()
            .filter(|(_, info)| info.verified)
            .map(|(address, info)| {
                let mut abi = ContractAbi::default();
                for method in &info.abi {
                    if let Some(topic) = method.topic() {
                        abi.events.insert(topic, method.clone());
                    }
                    if let Some(selector) = method.selector() {
                        abi.functions.insert(selector, method.clone());
                    }
                }
                (*address, abi)
            })
            .collect();
        Self { contracts }
    }

    pub fn event(&self, contract: &Address, topic: &B256) -> Option<&AbiMethod> {
        self.contracts.get(contract)?.events.get(topic)
    }

    pub fn function(&self, contract: &Address, selector: &FixedBytes<4>) -> Option<&AbiMethod> {
        self.contracts.get(contract)?.functions.get(selector)
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
