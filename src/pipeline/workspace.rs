use std::collections::HashMap;
use std::fmt;

use alloy_primitives::Address;
use serde_json::Value;

use crate::models::abi::ContractInfo;
use crate::models::common::RawTransaction;
use crate::models::datasets::logs::Event;
use crate::models::datasets::traces::Call;

/// Stable identifiers for the slots of a [`Workspace`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkspaceKey {
    RawData,
    Events,
    Calls,
    ResolvedContracts,
    ResolvedSignatures,
    /// Key owned by a stage outside the decoding core
    Custom(String),
}

impl WorkspaceKey {
    pub fn custom(key: impl Into<String>) -> Self {
        WorkspaceKey::Custom(key.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkspaceKey::RawData => "raw_data",
            WorkspaceKey::Events => "events",
            WorkspaceKey::Calls => "calls",
            WorkspaceKey::ResolvedContracts => "resolved_contracts",
            WorkspaceKey::ResolvedSignatures => "resolved_signatures",
            WorkspaceKey::Custom(key) => key,
        }
    }
}

impl fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by all stages of one pipeline run. Only one stage touches it
/// at a time.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    raw_data: Option<RawTransaction>,
    events: Option<Vec<Event>>,
    calls: Option<Vec<Call>>,
    resolved_contracts: Option<HashMap<Address, ContractInfo>>,
    resolved_signatures: Option<HashMap<String, String>>,
    extensions: HashMap<String, Value>,
}

impl Workspace {
    pub fn new(raw_data: RawTransaction) -> Self {
        Self {
            raw_data: Some(raw_data),
            ..Default::default()
        }
    }

    pub fn contains(&self, key: &WorkspaceKey) -> bool {
        match key {
            WorkspaceKey::RawData => self.raw_data.is_some(),
            WorkspaceKey::Events => self.events.is_some(),
            WorkspaceKey::Calls => self.calls.is_some(),
            WorkspaceKey::ResolvedContracts => self.resolved_contracts.is_some(),
            WorkspaceKey::ResolvedSignatures => self.resolved_signatures.is_some(),
            WorkspaceKey::Custom(key) => self.extensions.contains_key(key),
        }
    }

    pub fn raw_data(&self) -> Option<&RawTransaction> {
        self.raw_data.as_ref()
    }

    pub fn set_raw_data(&mut self, raw_data: RawTransaction) {
        self.raw_data = Some(raw_data);
    }

    pub fn events(&self) -> Option<&[Event]> {
        self.events.as_deref()
    }

    pub fn set_events(&mut self, events: Vec<Event>) {
        self.events = Some(events);
    }

    pub fn calls(&self) -> Option<&[Call]> {
        self.calls.as_deref()
    }

    pub fn set_calls(&mut self, calls: Vec<Call>) {
        self.calls = Some(calls);
    }

    pub fn resolved_contracts(&self) -> Option<&HashMap<Address, ContractInfo>> {
        self.resolved_contracts.as_ref()
    }

    pub fn set_resolved_contracts(&mut self, contracts: HashMap<Address, ContractInfo>) {
        self.resolved_contracts = Some(contracts);
    }

    pub fn resolved_signatures(&self) -> Option<&HashMap<String, String>> {
        self.resolved_signatures.as_ref()
    }

    /// Adds signatures, keeping any already present for the same hash.
    pub fn merge_resolved_signatures(&mut self, signatures: HashMap<String, String>) {
        let resolved = self.resolved_signatures.get_or_insert_with(HashMap::new);
        for (hash, signature) in signatures {
            resolved.entry(hash.to_lowercase()).or_insert(signature);
        }
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn set_extension(&mut self, key: impl Into<String>, value: Value) {
        self.extensions.insert(key.into(), value);
    }
}
