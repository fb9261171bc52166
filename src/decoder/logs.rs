use alloy_primitives::{hex, B256};
use serde_json::Value;
use tracing::{debug, warn};

use crate::decoder::codec::{decode_data, decode_word, infer_word, WORD_SIZE};
use crate::decoder::{signature_name, Lookups};
use crate::models::abi::AbiMethod;
use crate::models::datasets::logs::{DecodeSource, Event, RpcLogData};
use crate::models::values::{DecodedValue, Parameter};

/// Decodes every well-formed log; malformed entries are skipped.
pub fn decode_logs(raw_logs: &[Value], lookups: Lookups<'_>) -> Vec<Event> {
    raw_logs
        .iter()
        .enumerate()
        .filter_map(|(position, raw)| {
            match serde_json::from_value::<RpcLogData>(raw.clone()) {
                Ok(log) => Some(decode_log(&log, lookups)),
                Err(e) => {
                    warn!("Skipping malformed log at position {}: {}", position, e);
                    None
                }
            }
        })
        .collect()
}

pub fn decode_log(log: &RpcLogData, lookups: Lookups<'_>) -> Event {
    let mut event = Event {
        contract: log.address,
        topics: log.topics.clone(),
        data: log.data.clone(),
        name: String::new(),
        signature: None,
        source: DecodeSource::Generic,
        parameters: Vec::new(),
        block_number: log.block_number,
        tx_index: log.transaction_index,
        log_index: log.log_index,
        removed: log.removed,
    };

    let Some(topic0) = log.topics.first() else {
        return event;
    };

    if let Some(method) = lookups.abi.and_then(|abi| abi.event(&log.address, topic0)) {
        match decode_with_abi(method, log) {
            Some(parameters) => {
                event.name = method.name.clone();
                event.signature = Some(method.signature.clone());
                event.source = DecodeSource::Abi;
                event.parameters = parameters;
                return event;
            }
            None => debug!(
                "ABI event {} does not match log shape at {}, decoding generically",
                method.signature, log.address
            ),
        }
    }

    let topic_hex = hex::encode_prefixed(topic0);
    match lookups.signature(&topic_hex) {
        Some(signature) => {
            event.name = signature_name(signature);
            event.signature = Some(signature.to_string());
            event.source = DecodeSource::Signature;
        }
        None => event.name = topic_hex,
    }
    event.parameters = generic_parameters(log);
    event
}

// Indexed inputs come from topics[1..], the rest from data, each in declared order.
// None when the log cannot have been emitted by this event (e.g. ERC-20 vs
// ERC-721 Transfer share topic[0] but differ in indexed count).
fn decode_with_abi(method: &AbiMethod, log: &RpcLogData) -> Option<Vec<Parameter>> {
    if method.indexed_count() != log.topics.len().saturating_sub(1) {
        return None;
    }

    let data_kinds: Vec<String> = method
        .inputs
        .iter()
        .filter(|input| !input.indexed)
        .map(|input| input.canonical_type())
        .collect();
    let mut data_values = decode_data(&data_kinds, &log.data).into_iter();
    let mut topics = log.topics.iter().skip(1);

    method
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let kind = input.canonical_type();
            let value = if input.indexed {
                decode_word(&kind, topics.next()?.as_slice(), true)
            } else {
                data_values.next()?
            };
            let name = if input.name.is_empty() {
                format!("param_{}", i + 1)
            } else {
                input.name.clone()
            };
            Some(Parameter::new(name, kind, value))
        })
        .collect()
}

fn generic_parameters(log: &RpcLogData) -> Vec<Parameter> {
    let topics = log
        .topics
        .iter()
        .skip(1)
        .map(|topic| ("indexed", topic.as_slice()));
    let words = log.data.chunks(WORD_SIZE).map(|word| ("data", word));

    topics
        .chain(words)
        .enumerate()
        .map(|(i, (tag, word))| {
            Parameter::new(
                format!("param_{}", i + 1),
                tag,
                DecodedValue::Generic(infer_word(word)),
            )
        })
        .collect()
}

/// Distinct topic[0] hashes across the logs, in first-seen order.
pub fn collect_topics(raw_logs: &[Value]) -> Vec<B256> {
    let mut topics: Vec<B256> = Vec::new();
    for raw in raw_logs {
        let Ok(log) = serde_json::from_value::<RpcLogData>(raw.clone()) else {
            continue;
        };
        if let Some(topic0) = log.topics.first() {
            if !topics.contains(topic0) {
                topics.push(*topic0);
            }
        }
    }
    topics
}
