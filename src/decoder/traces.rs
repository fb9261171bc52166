use alloy_primitives::{hex, Address, Bytes, FixedBytes, U256};
use serde_json::Value;
use tracing::{debug, warn};

use crate::decoder::codec::decode_data;
use crate::decoder::selectors::{argument_names, builtin_signature, is_allow_listed};
use crate::decoder::{signature_name, Lookups};
use crate::models::abi::{parse_signature, AbiMethod};
use crate::models::datasets::traces::{
    Call, CallArguments, CallFrame, CallType, FlatTrace, TraceFormat,
};
use crate::models::values::Parameter;

/// Flattens a transaction trace into calls in pre-order. Unsupported trace
/// shapes produce no calls; a malformed node is skipped along with its
/// subtree.
pub fn decode_trace(trace: &Value, format: TraceFormat, lookups: Lookups<'_>) -> Vec<Call> {
    let mut calls = Vec::new();
    match format {
        TraceFormat::CallTracer => flatten_call_frame(trace, 0, lookups, &mut calls),
        TraceFormat::Parity => {
            calls.extend(
                flat_traces(trace)
                    .iter()
                    .filter_map(|trace| flat_trace_to_call(trace, lookups)),
            );
        }
        TraceFormat::Unsupported => debug!("Unsupported trace shape, no calls decoded"),
    }
    calls
}

fn parse_frame(value: &Value) -> Option<CallFrame> {
    match serde_json::from_value::<CallFrame>(value.clone()) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Skipping malformed call frame and its sub-calls: {}", e);
            None
        }
    }
}

fn flat_traces(trace: &Value) -> Vec<FlatTrace> {
    let Some(entries) = trace.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<FlatTrace>(entry.clone()) {
            Ok(trace) => Some(trace),
            Err(e) => {
                warn!("Skipping malformed flat trace entry: {}", e);
                None
            }
        })
        .collect()
}

// Parent first, then children at depth + 1
fn flatten_call_frame(value: &Value, depth: usize, lookups: Lookups<'_>, calls: &mut Vec<Call>) {
    let Some(frame) = parse_frame(value) else {
        return;
    };
    let node = TraceNode {
        contract: frame.to,
        from: frame.from,
        call_type: CallType::parse(&frame.typ),
        input: &frame.input,
        value: frame.value.unwrap_or_default(),
        gas_used: frame.gas_used.unwrap_or_default(),
        error: frame.error.as_deref(),
        revert_reason: frame.revert_reason.as_deref(),
        depth,
    };
    if let Some(call) = node.into_call(lookups) {
        calls.push(call);
    }

    // A failed parent can still contain sub-calls with their own outcome
    for child in &frame.calls {
        flatten_call_frame(child, depth + 1, lookups, calls);
    }
}

fn flat_trace_to_call(trace: &FlatTrace, lookups: Lookups<'_>) -> Option<Call> {
    let action = &trace.action;
    let call_type = match &action.call_type {
        Some(call_type) => CallType::parse(call_type),
        None => CallType::parse(&trace.typ),
    };
    let contract = action
        .to
        .or_else(|| trace.result.as_ref().and_then(|result| result.address));
    let input = action
        .input
        .as_ref()
        .or(action.init.as_ref())
        .cloned()
        .unwrap_or_default();

    TraceNode {
        contract,
        from: action.from,
        call_type,
        input: &input,
        value: action.value.unwrap_or_default(),
        gas_used: trace
            .result
            .as_ref()
            .and_then(|result| result.gas_used)
            .unwrap_or_default(),
        error: trace.error.as_deref(),
        revert_reason: None,
        depth: trace.trace_address.len(),
    }
    .into_call(lookups)
}

// Format-independent view of one trace node
struct TraceNode<'t> {
    contract: Option<Address>,
    from: Option<Address>,
    call_type: CallType,
    input: &'t Bytes,
    value: U256,
    gas_used: u64,
    error: Option<&'t str>,
    revert_reason: Option<&'t str>,
    depth: usize,
}

impl TraceNode<'_> {
    fn into_call(self, lookups: Lookups<'_>) -> Option<Call> {
        let resolved = if matches!(self.call_type, CallType::Create | CallType::Create2) {
            // init code, not calldata
            ResolvedMethod::empty()
        } else {
            resolve_method(self.contract, self.input, lookups)
        };

        // Value-only transfers have a contract but no method
        if self.contract.is_none() && resolved.method.is_empty() {
            return None;
        }

        let error_reason = match (self.error, self.revert_reason) {
            (Some(error), Some(reason)) => Some(format!("{}: {}", error, reason)),
            (error, reason) => error.or(reason).map(str::to_string),
        };

        Some(Call {
            contract: self.contract,
            from: self.from,
            call_type: self.call_type,
            method: resolved.method,
            signature: resolved.signature,
            arguments: resolved.arguments,
            value: self.value,
            gas_used: self.gas_used,
            success: self.error.is_none(),
            error_reason,
            depth: self.depth,
        })
    }
}

struct ResolvedMethod {
    method: String,
    signature: Option<String>,
    arguments: CallArguments,
}

impl ResolvedMethod {
    fn empty() -> Self {
        Self {
            method: String::new(),
            signature: None,
            arguments: CallArguments::None,
        }
    }
}

fn resolve_method(contract: Option<Address>, input: &Bytes, lookups: Lookups<'_>) -> ResolvedMethod {
    if input.is_empty() {
        return ResolvedMethod::empty();
    }
    if input.len() < 4 {
        return ResolvedMethod {
            method: hex::encode_prefixed(input),
            signature: None,
            arguments: CallArguments::None,
        };
    }

    let selector = FixedBytes::<4>::from_slice(&input[..4]);
    let payload = &input[4..];

    let abi_method = lookups
        .abi
        .zip(contract)
        .and_then(|(abi, contract)| abi.function(&contract, &selector));
    if let Some(method) = abi_method {
        return ResolvedMethod {
            method: method.name.clone(),
            signature: Some(method.signature.clone()),
            arguments: decode_abi_arguments(method, payload),
        };
    }

    let selector_hex = hex::encode_prefixed(selector);
    let signature = lookups
        .signature(&selector_hex)
        .or_else(|| builtin_signature(&selector));

    match signature {
        Some(signature) => {
            let arguments = if is_allow_listed(signature) {
                decode_signature_arguments(signature, payload)
            } else {
                CallArguments::Raw(Bytes::copy_from_slice(payload))
            };
            ResolvedMethod {
                method: signature_name(signature),
                signature: Some(signature.to_string()),
                arguments,
            }
        }
        None => ResolvedMethod {
            method: selector_hex,
            signature: None,
            arguments: raw_arguments(payload),
        },
    }
}

fn decode_abi_arguments(method: &AbiMethod, payload: &[u8]) -> CallArguments {
    let kinds: Vec<String> = method.inputs.iter().map(|i| i.canonical_type()).collect();
    let values = decode_data(&kinds, payload);

    CallArguments::Decoded(
        method
            .inputs
            .iter()
            .zip(kinds)
            .zip(values)
            .enumerate()
            .map(|(i, ((input, kind), value))| {
                let name = if input.name.is_empty() {
                    format!("param_{}", i + 1)
                } else {
                    input.name.clone()
                };
                Parameter::new(name, kind, value)
            })
            .collect(),
    )
}

fn decode_signature_arguments(signature: &str, payload: &[u8]) -> CallArguments {
    let Ok((_, kinds)) = parse_signature(signature) else {
        return raw_arguments(payload);
    };
    let names = argument_names(signature);
    let values = decode_data(&kinds, payload);

    CallArguments::Decoded(
        kinds
            .into_iter()
            .zip(values)
            .enumerate()
            .map(|(i, (kind, value))| {
                let name = names
                    .and_then(|names| names.get(i))
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("param_{}", i + 1));
                Parameter::new(name, kind, value)
            })
            .collect(),
    )
}

fn raw_arguments(payload: &[u8]) -> CallArguments {
    if payload.is_empty() {
        CallArguments::None
    } else {
        CallArguments::Raw(Bytes::copy_from_slice(payload))
    }
}

/// Distinct selectors called anywhere in the trace, in pre-order.
pub fn collect_selectors(trace: &Value, format: TraceFormat) -> Vec<FixedBytes<4>> {
    let mut inputs: Vec<Bytes> = Vec::new();
    match format {
        TraceFormat::CallTracer => collect_frame_inputs(trace, &mut inputs),
        TraceFormat::Parity => inputs.extend(
            flat_traces(trace)
                .into_iter()
                .filter_map(|trace| trace.action.input),
        ),
        TraceFormat::Unsupported => {}
    }

    let mut selectors: Vec<FixedBytes<4>> = Vec::new();
    for input in inputs.iter().filter(|input| input.len() >= 4) {
        let selector = FixedBytes::<4>::from_slice(&input[..4]);
        if !selectors.contains(&selector) {
            selectors.push(selector);
        }
    }
    selectors
}

fn collect_frame_inputs(value: &Value, inputs: &mut Vec<Bytes>) {
    let Some(frame) = parse_frame(value) else {
        return;
    };
    if !matches!(CallType::parse(&frame.typ), CallType::Create | CallType::Create2) {
        inputs.push(frame.input.clone());
    }
    for child in &frame.calls {
        collect_frame_inputs(child, inputs);
    }
}

/// Every contract address touched by the trace, in pre-order.
pub fn collect_contracts(trace: &Value, format: TraceFormat) -> Vec<Address> {
    let mut contracts: Vec<Address> = Vec::new();
    for call in decode_trace(trace, format, Lookups::default()) {
        if let Some(contract) = call.contract {
            if !contracts.contains(&contract) {
                contracts.push(contract);
            }
        }
    }
    contracts
}
