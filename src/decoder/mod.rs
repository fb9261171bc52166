pub mod codec;
pub mod logs;
pub mod selectors;
pub mod traces;

use std::collections::HashMap;

use crate::models::abi::{parse_signature, AbiIndex};

/// Read-only sources the decoders consult, in priority order: verified ABIs
/// first, then the signature service results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lookups<'a> {
    pub abi: Option<&'a AbiIndex>,
    pub signatures: Option<&'a HashMap<String, String>>,
}

impl<'a> Lookups<'a> {
    pub fn new(
        abi: Option<&'a AbiIndex>,
        signatures: Option<&'a HashMap<String, String>>,
    ) -> Self {
        Self { abi, signatures }
    }

    /// Text signature for a `0x`-prefixed topic hash or selector.
    pub fn signature(&self, hash: &str) -> Option<&'a str> {
        self.signatures?
            .get(&hash.to_lowercase())
            .map(String::as_str)
    }
}

/// `Transfer(address,address,uint256)` -> `Transfer`
pub(crate) fn signature_name(signature: &str) -> String {
    parse_signature(signature)
        .map(|(name, _)| name)
        .unwrap_or_else(|_| signature.to_string())
}
