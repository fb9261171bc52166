use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::models::values::{DecodedValue, Parameter};
use crate::utils::deserialize_quantity;

////////////////////////////////////// RPC Data ////////////////////////////////////////
/// Trace dialects the call decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// Nested frames from geth's `callTracer`
    CallTracer,
    /// Flat list with `traceAddress` from `trace_transaction`
    Parity,
    Unsupported,
}

impl TraceFormat {
    pub fn detect(trace: &Value) -> Self {
        match trace {
            Value::Object(obj) if obj.get("type").is_some_and(Value::is_string) => {
                TraceFormat::CallTracer
            }
            Value::Array(items)
                if items
                    .first()
                    .is_some_and(|first| first.get("action").is_some()) =>
            {
                TraceFormat::Parity
            }
            _ => TraceFormat::Unsupported,
        }
    }
}

// Nested call-tracer frame. Children stay as raw JSON so a malformed
// sub-call is dropped on its own instead of failing the whole tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub revert_reason: Option<String>,
    #[serde(default)]
    pub calls: Vec<Value>,
}

// Flat parity-style trace entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatTrace {
    #[serde(rename = "type")]
    pub typ: String,
    pub action: FlatAction,
    #[serde(default)]
    pub result: Option<FlatResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace_address: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatAction {
    #[serde(default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub input: Option<Bytes>,
    #[serde(default)]
    pub init: Option<Bytes>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatResult {
    #[serde(default, deserialize_with = "deserialize_quantity")]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub address: Option<Address>,
}

/////////////////////////////////// Decoded Data ///////////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallType {
    Call,
    StaticCall,
    DelegateCall,
    CallCode,
    Create,
    Create2,
    SelfDestruct,
    Other(String),
}

impl CallType {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "CALL" => CallType::Call,
            "STATICCALL" => CallType::StaticCall,
            "DELEGATECALL" => CallType::DelegateCall,
            "CALLCODE" => CallType::CallCode,
            "CREATE" => CallType::Create,
            "CREATE2" => CallType::Create2,
            "SELFDESTRUCT" | "SUICIDE" => CallType::SelfDestruct,
            other => CallType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallType::Call => "CALL",
            CallType::StaticCall => "STATICCALL",
            CallType::DelegateCall => "DELEGATECALL",
            CallType::CallCode => "CALLCODE",
            CallType::Create => "CREATE",
            CallType::Create2 => "CREATE2",
            CallType::SelfDestruct => "SELFDESTRUCT",
            CallType::Other(other) => other,
        }
    }
}

impl Serialize for CallType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum CallArguments {
    None,
    Decoded(Vec<Parameter>),
    /// Payload after the selector, left undecoded
    Raw(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub contract: Option<Address>,
    pub from: Option<Address>,
    pub call_type: CallType,
    /// Decoded method name, or the raw selector when unknown
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub arguments: CallArguments,
    pub value: U256,
    pub gas_used: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub depth: usize,
}

impl Call {
    pub fn argument(&self, name: &str) -> Option<&DecodedValue> {
        match &self.arguments {
            CallArguments::Decoded(params) => {
                params.iter().find(|p| p.name == name).map(|p| &p.value)
            }
            _ => None,
        }
    }
}
