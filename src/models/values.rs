use std::fmt;

use alloy_primitives::{hex, Address, Bytes, B256};
use serde::Serialize;

/// A decoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DecodedValue {
    Address(Address),
    Bool(bool),
    Uint(u64),
    Int(i64),
    /// Full-precision decimal for integers that do not fit in 64 bits
    LargeNumber(String),
    FixedBytes(Bytes),
    Bytes(Bytes),
    String(String),
    /// keccak256 of an indexed dynamic value; the original is not recoverable
    Digest(B256),
    Array(Vec<DecodedValue>),
    Tuple(Vec<DecodedValue>),
    /// Undecoded payload
    Raw(Bytes),
    /// Word of unknown type with every plausible interpretation attached
    Generic(WordInterpretation),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Address(address) => write!(f, "{}", hex::encode_prefixed(address)),
            DecodedValue::Bool(b) => write!(f, "{}", b),
            DecodedValue::Uint(n) => write!(f, "{}", n),
            DecodedValue::Int(n) => write!(f, "{}", n),
            DecodedValue::LargeNumber(s) | DecodedValue::String(s) => f.write_str(s),
            DecodedValue::FixedBytes(b) | DecodedValue::Bytes(b) | DecodedValue::Raw(b) => {
                write!(f, "{}", hex::encode_prefixed(b))
            }
            DecodedValue::Digest(d) => write!(f, "{}", hex::encode_prefixed(d)),
            DecodedValue::Array(items) => write!(f, "[{}]", join(items)),
            DecodedValue::Tuple(items) => write!(f, "({})", join(items)),
            DecodedValue::Generic(word) => write!(f, "{}", word),
        }
    }
}

fn join(items: &[DecodedValue]) -> String {
    items
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Best-effort readings of a word whose type is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordInterpretation {
    pub raw: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

impl fmt::Display for WordInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.decimal {
            Some(decimal) => f.write_str(decimal),
            None => write!(f, "{}", hex::encode_prefixed(&self.raw)),
        }
    }
}

/// One named value of an event or call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    /// ABI type, or `indexed`/`data` for positionally decoded words
    pub kind: String,
    pub value: DecodedValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, value: DecodedValue) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value,
        }
    }
}
