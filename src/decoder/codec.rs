//! ABI parameter codec.
//!
//! Word-level decoding of typed ABI values, head/tail decoding of whole
//! payloads, and guessing for words whose type is unknown.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, Address, Bytes, B256, I256, U256};

use crate::models::values::{DecodedValue, WordInterpretation};

pub const WORD_SIZE: usize = 32;

// Share of printable characters a word needs to pass as text
const MIN_PRINTABLE_RATIO: f64 = 0.8;

/// Decodes a single ABI value from one word.
///
/// Indexed reference types (`string`, `bytes`, arrays, tuples) are stored as
/// their keccak256 digest, so the topic is returned as-is. A non-indexed
/// dynamic type only has its raw remaining payload returned; use
/// [`decode_data`] for full tail decoding.
pub fn decode_word(kind: &str, word: &[u8], indexed: bool) -> DecodedValue {
    let Ok(ty) = DynSolType::parse(kind) else {
        return DecodedValue::Generic(infer_word(word));
    };

    let is_reference = ty.is_dynamic()
        || matches!(
            ty,
            DynSolType::Tuple(_) | DynSolType::Array(_) | DynSolType::FixedArray(..)
        );
    if is_reference {
        return if indexed && word.len() == WORD_SIZE {
            DecodedValue::Digest(B256::from_slice(word))
        } else {
            DecodedValue::Raw(Bytes::copy_from_slice(word))
        };
    }

    if word.len() != WORD_SIZE {
        return DecodedValue::Raw(Bytes::copy_from_slice(word));
    }

    match ty {
        DynSolType::Address => DecodedValue::Address(Address::from_slice(&word[12..])),
        DynSolType::Bool => DecodedValue::Bool(word.iter().any(|b| *b != 0)),
        DynSolType::Uint(_) => uint_value(U256::from_be_slice(word)),
        DynSolType::Int(bits) => int_value(sign_extend(U256::from_be_slice(word), bits)),
        DynSolType::FixedBytes(size) => {
            DecodedValue::FixedBytes(Bytes::copy_from_slice(&word[..size.min(WORD_SIZE)]))
        }
        _ => DecodedValue::Raw(Bytes::copy_from_slice(word)),
    }
}

/// Decodes a sequence of values laid out with ABI head/tail encoding.
///
/// Falls back to word-per-value decoding when the payload does not match the
/// declared types, so a truncated or non-standard payload still yields one
/// value per type.
pub fn decode_data(kinds: &[String], data: &[u8]) -> Vec<DecodedValue> {
    if kinds.is_empty() {
        return Vec::new();
    }
    decode_sequence(kinds, data).unwrap_or_else(|| decode_words(kinds, data))
}

fn decode_sequence(kinds: &[String], data: &[u8]) -> Option<Vec<DecodedValue>> {
    let types = kinds
        .iter()
        .map(|kind| DynSolType::parse(kind))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    match DynSolType::Tuple(types).abi_decode_sequence(data).ok()? {
        DynSolValue::Tuple(values) => Some(values.into_iter().map(from_dyn_value).collect()),
        _ => None,
    }
}

fn decode_words(kinds: &[String], data: &[u8]) -> Vec<DecodedValue> {
    let mut offset = 0;
    kinds
        .iter()
        .map(|kind| {
            let ty = DynSolType::parse(kind).ok();
            // Static tuples and fixed arrays span several head words
            let words = match &ty {
                Some(ty) if !ty.is_dynamic() => ty.minimum_words().max(1),
                _ => 1,
            };
            let start = offset;
            offset += words * WORD_SIZE;
            if start >= data.len() {
                return DecodedValue::Raw(Bytes::new());
            }

            let end = (start + words * WORD_SIZE).min(data.len());
            match ty {
                Some(ty) if ty.is_dynamic() => decode_word(kind, &data[start..], false),
                Some(ty) if words > 1 => ty
                    .abi_decode(&data[start..end])
                    .map(from_dyn_value)
                    .unwrap_or_else(|_| DecodedValue::Raw(Bytes::copy_from_slice(&data[start..end]))),
                _ => decode_word(kind, &data[start..end], false),
            }
        })
        .collect()
}

pub fn from_dyn_value(value: DynSolValue) -> DecodedValue {
    match value {
        DynSolValue::Address(address) => DecodedValue::Address(address),
        DynSolValue::Bool(b) => DecodedValue::Bool(b),
        DynSolValue::Uint(n, _) => uint_value(n),
        DynSolValue::Int(n, _) => int_value(n),
        DynSolValue::FixedBytes(word, size) => {
            DecodedValue::FixedBytes(Bytes::copy_from_slice(&word[..size.min(WORD_SIZE)]))
        }
        DynSolValue::Bytes(bytes) => DecodedValue::Bytes(Bytes::from(bytes)),
        DynSolValue::String(s) => DecodedValue::String(s),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            DecodedValue::Array(items.into_iter().map(from_dyn_value).collect())
        }
        DynSolValue::Tuple(items) => {
            DecodedValue::Tuple(items.into_iter().map(from_dyn_value).collect())
        }
        other => DecodedValue::Raw(Bytes::from(other.abi_encode())),
    }
}

fn uint_value(n: U256) -> DecodedValue {
    if n.bit_len() <= 64 {
        DecodedValue::Uint(n.to::<u64>())
    } else {
        DecodedValue::LargeNumber(n.to_string())
    }
}

fn int_value(n: I256) -> DecodedValue {
    match i64::try_from(n) {
        Ok(small) => DecodedValue::Int(small),
        Err(_) => DecodedValue::LargeNumber(n.to_string()),
    }
}

/// Two's-complement value of the low `bits` bits of `raw`. Bits above the
/// declared width are ignored, so both sign-extended and zero-padded
/// encodings of a negative `intN` recover the same value.
fn sign_extend(raw: U256, bits: usize) -> I256 {
    if bits == 0 || bits >= 256 {
        return I256::from_raw(raw);
    }
    let mask = (U256::from(1u8) << bits) - U256::from(1u8);
    let low = raw & mask;
    let sign_bit = U256::from(1u8) << (bits - 1);
    if low & sign_bit != U256::ZERO {
        I256::from_raw(low | !mask)
    } else {
        I256::from_raw(low)
    }
}

/// Attaches every plausible reading of a word of unknown type.
pub fn infer_word(word: &[u8]) -> WordInterpretation {
    WordInterpretation {
        raw: Bytes::copy_from_slice(word),
        decimal: decimal_guess(word),
        text: text_guess(word),
        address: address_guess(word),
        boolean: bool_guess(word),
    }
}

fn decimal_guess(word: &[u8]) -> Option<String> {
    if word.is_empty() || word.len() > WORD_SIZE {
        return None;
    }
    Some(U256::from_be_slice(word).to_string())
}

fn text_guess(word: &[u8]) -> Option<String> {
    let end = word.iter().rposition(|b| *b != 0).map_or(0, |last| last + 1);
    let text = std::str::from_utf8(&word[..end]).ok()?;

    let total = text.chars().count();
    if total < 2 {
        return None;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .count();
    if (printable as f64) < (total as f64) * MIN_PRINTABLE_RATIO {
        return None;
    }
    Some(text.to_string())
}

fn address_guess(word: &[u8]) -> Option<Address> {
    match word.len() {
        20 => Some(Address::from_slice(word)),
        WORD_SIZE if word[..12].iter().all(|b| *b == 0) => Some(Address::from_slice(&word[12..])),
        _ => None,
    }
}

fn bool_guess(word: &[u8]) -> Option<bool> {
    let encoded = hex::encode(word);
    match encoded.trim_start_matches('0') {
        "" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
