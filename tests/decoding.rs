use std::collections::HashMap;

use alloy_primitives::{hex, keccak256, Address, B256, U256};
use anyhow::Result;
use serde_json::{json, Value};

use tx_decoder::decoder::logs::{collect_topics, decode_logs};
use tx_decoder::decoder::traces::{collect_contracts, collect_selectors, decode_trace};
use tx_decoder::decoder::Lookups;
use tx_decoder::models::abi::{parse_signature, AbiIndex, AbiInput, AbiMethod, ContractInfo};
use tx_decoder::models::datasets::logs::DecodeSource;
use tx_decoder::models::datasets::traces::{CallArguments, CallType, TraceFormat};
use tx_decoder::models::values::DecodedValue;

const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
const ALICE: &str = "0x1111111111111111111111111111111111111111";
const BOB: &str = "0x2222222222222222222222222222222222222222";
const OPERATOR: &str = "0x3333333333333333333333333333333333333333";

fn address(raw: &str) -> Address {
    raw.parse().expect("valid address")
}

fn topic_of(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

fn padded(raw: &str) -> B256 {
    address(raw).into_word()
}

fn word(n: u64) -> [u8; 32] {
    U256::from(n).to_be_bytes::<32>()
}

fn log(contract: &str, topics: &[B256], data: &[u8], log_index: u64) -> Value {
    json!({
        "address": contract,
        "topics": topics,
        "data": hex::encode_prefixed(data),
        "blockNumber": "0x112a880",
        "transactionIndex": "0x5",
        "logIndex": format!("0x{:x}", log_index),
        "removed": false,
    })
}

fn erc20_transfer() -> AbiMethod {
    AbiMethod::event(
        "Transfer",
        vec![
            AbiInput::new("from", "address", true),
            AbiInput::new("to", "address", true),
            AbiInput::new("value", "uint256", false),
        ],
    )
}

fn erc1155_transfer_single() -> AbiMethod {
    AbiMethod::event(
        "TransferSingle",
        vec![
            AbiInput::new("operator", "address", true),
            AbiInput::new("from", "address", true),
            AbiInput::new("to", "address", true),
            AbiInput::new("id", "uint256", false),
            AbiInput::new("value", "uint256", false),
        ],
    )
}

fn verified(abi: Vec<AbiMethod>) -> HashMap<Address, ContractInfo> {
    HashMap::from([(
        address(TOKEN),
        ContractInfo {
            name: Some("Token".to_string()),
            verified: true,
            abi,
        },
    )])
}

#[test]
fn test_erc20_transfer_with_abi() -> Result<()> {
    let index = AbiIndex::from_contracts(&verified(vec![erc20_transfer()]));
    let amount = U256::from(1_000_000_000_000_000_000u64).to_be_bytes::<32>();
    let logs = vec![log(
        TOKEN,
        &[
            topic_of("Transfer(address,address,uint256)"),
            padded(ALICE),
            padded(BOB),
        ],
        &amount,
        0,
    )];

    let events = decode_logs(&logs, Lookups::new(Some(&index), None));
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.name, "Transfer");
    assert_eq!(event.source, DecodeSource::Abi);
    assert_eq!(event.contract, address(TOKEN));
    assert_eq!(event.param("from"), Some(&DecodedValue::Address(address(ALICE))));
    assert_eq!(event.param("to"), Some(&DecodedValue::Address(address(BOB))));
    assert_eq!(
        event.param("value").map(|v| v.to_string()),
        Some("1000000000000000000".to_string())
    );
    assert_eq!(event.block_number, Some(18_000_000));
    assert_eq!(event.tx_index, Some(5));
    Ok(())
}

#[test]
fn test_erc1155_transfer_single_with_abi() -> Result<()> {
    let index = AbiIndex::from_contracts(&verified(vec![erc1155_transfer_single()]));
    let data = [word(0), word(1)].concat();
    let logs = vec![log(
        TOKEN,
        &[
            topic_of("TransferSingle(address,address,address,uint256,uint256)"),
            padded(OPERATOR),
            padded(ALICE),
            padded(BOB),
        ],
        &data,
        3,
    )];

    let events = decode_logs(&logs, Lookups::new(Some(&index), None));
    let event = &events[0];
    assert_eq!(event.name, "TransferSingle");
    assert_eq!(event.param("id").map(|v| v.to_string()), Some("0".to_string()));
    assert_eq!(event.param("value").map(|v| v.to_string()), Some("1".to_string()));
    assert_eq!(
        event.param("from").map(|v| v.to_string()),
        Some(ALICE.to_string())
    );
    assert_eq!(event.param("to").map(|v| v.to_string()), Some(BOB.to_string()));
    assert_eq!(event.log_index, Some(3));
    Ok(())
}

#[test]
fn test_unknown_event_falls_back_to_generic() -> Result<()> {
    let unknown = B256::repeat_byte(0xab);
    let data = [word(42), word(7)].concat();
    let logs = vec![log(TOKEN, &[unknown, padded(ALICE)], &data, 0)];

    let events = decode_logs(&logs, Lookups::default());
    let event = &events[0];
    assert_eq!(event.name, hex::encode_prefixed(unknown));
    assert_eq!(event.source, DecodeSource::Generic);
    assert!(event.signature.is_none());

    let names: Vec<&str> = event.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["param_1", "param_2", "param_3"]);

    match event.param("param_1") {
        Some(DecodedValue::Generic(word)) => assert_eq!(word.address, Some(address(ALICE))),
        other => panic!("expected generic word, got {:?}", other),
    }
    match event.param("param_2") {
        Some(DecodedValue::Generic(word)) => assert_eq!(word.decimal.as_deref(), Some("42")),
        other => panic!("expected generic word, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_signature_service_names_event_without_abi() -> Result<()> {
    let topic = topic_of("Transfer(address,address,uint256)");
    let signatures = HashMap::from([(
        hex::encode_prefixed(topic),
        "Transfer(address,address,uint256)".to_string(),
    )]);
    let logs = vec![log(TOKEN, &[topic, padded(ALICE), padded(BOB)], &word(5), 0)];

    let events = decode_logs(&logs, Lookups::new(None, Some(&signatures)));
    let event = &events[0];
    assert_eq!(event.name, "Transfer");
    assert_eq!(event.source, DecodeSource::Signature);
    assert_eq!(event.parameters.len(), 3);
    assert_eq!(event.parameters[0].kind, "indexed");
    assert_eq!(event.parameters[2].kind, "data");
    Ok(())
}

#[test]
fn test_indexed_count_mismatch_is_not_decoded_with_abi() -> Result<()> {
    // ERC-721 Transfer shares topic[0] with ERC-20 but indexes the token id
    let index = AbiIndex::from_contracts(&verified(vec![erc20_transfer()]));
    let logs = vec![log(
        TOKEN,
        &[
            topic_of("Transfer(address,address,uint256)"),
            padded(ALICE),
            padded(BOB),
            B256::from(word(77)),
        ],
        &[],
        0,
    )];

    let events = decode_logs(&logs, Lookups::new(Some(&index), None));
    assert_eq!(events[0].source, DecodeSource::Generic);
    assert_eq!(events[0].parameters.len(), 3);
    Ok(())
}

#[test]
fn test_parameters_follow_declared_order() -> Result<()> {
    let swap = AbiMethod::event(
        "Swap",
        vec![
            AbiInput::new("sender", "address", true),
            AbiInput::new("amountIn", "uint256", false),
            AbiInput::new("recipient", "address", true),
            AbiInput::new("amountOut", "int256", false),
        ],
    );
    let topic = swap.topic().expect("events have a topic");
    let index = AbiIndex::from_contracts(&verified(vec![swap]));

    let negative = U256::MAX.to_be_bytes::<32>();
    let data = [word(10), negative].concat();
    let logs = vec![log(TOKEN, &[topic, padded(ALICE), padded(BOB)], &data, 0)];

    let events = decode_logs(&logs, Lookups::new(Some(&index), None));
    let names: Vec<&str> = events[0]
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, ["sender", "amountIn", "recipient", "amountOut"]);
    assert_eq!(events[0].param("amountOut"), Some(&DecodedValue::Int(-1)));
    Ok(())
}

#[test]
fn test_dynamic_event_data() -> Result<()> {
    let named = AbiMethod::event(
        "Named",
        vec![
            AbiInput::new("id", "uint256", false),
            AbiInput::new("label", "string", false),
        ],
    );
    let topic = named.topic().expect("events have a topic");
    let index = AbiIndex::from_contracts(&verified(vec![named]));

    let mut label = [0u8; 32];
    label[..5].copy_from_slice(b"hello");
    let data = [word(9), word(64), word(5), label].concat();
    let logs = vec![log(TOKEN, &[topic], &data, 0)];

    let events = decode_logs(&logs, Lookups::new(Some(&index), None));
    assert_eq!(events[0].param("id"), Some(&DecodedValue::Uint(9)));
    assert_eq!(
        events[0].param("label"),
        Some(&DecodedValue::String("hello".to_string()))
    );
    Ok(())
}

#[test]
fn test_decoding_is_idempotent() -> Result<()> {
    let index = AbiIndex::from_contracts(&verified(vec![erc20_transfer()]));
    let logs = vec![
        log(
            TOKEN,
            &[topic_of("Transfer(address,address,uint256)"), padded(ALICE), padded(BOB)],
            &word(1),
            0,
        ),
        log(TOKEN, &[B256::repeat_byte(1)], &word(2), 1),
    ];
    let lookups = Lookups::new(Some(&index), None);

    assert_eq!(decode_logs(&logs, lookups), decode_logs(&logs, lookups));
    Ok(())
}

#[test]
fn test_malformed_and_empty_logs() -> Result<()> {
    let logs = vec![
        json!({"address": "not-an-address", "topics": []}),
        json!({"address": TOKEN, "topics": [], "data": "0x"}),
        log(TOKEN, &[B256::repeat_byte(2)], &[], 2),
    ];

    let events = decode_logs(&logs, Lookups::default());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name, "");
    assert!(events[0].parameters.is_empty());
    assert_eq!(events[1].log_index, Some(2));
    Ok(())
}

#[test]
fn test_signature_hash_round_trip() -> Result<()> {
    let transfer = erc20_transfer();
    assert_eq!(transfer.signature, "Transfer(address,address,uint256)");
    assert_eq!(
        hex::encode_prefixed(&transfer.hash),
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
    );

    let (name, kinds) = parse_signature(&transfer.signature)?;
    let inputs: Vec<AbiInput> = kinds
        .iter()
        .map(|kind| AbiInput::new("", kind.as_str(), false))
        .collect();
    assert_eq!(AbiMethod::event(name, inputs).hash, transfer.hash);

    let approve = AbiMethod::function(
        "approve",
        vec![
            AbiInput::new("spender", "address", false),
            AbiInput::new("amount", "uint256", false),
        ],
    );
    assert_eq!(hex::encode_prefixed(&approve.hash), "0x095ea7b3");
    Ok(())
}

#[test]
fn test_abi_json_with_tuples() -> Result<()> {
    let abi = json!([
        {"type": "constructor", "inputs": []},
        {
            "type": "function",
            "name": "submit",
            "inputs": [{
                "name": "order",
                "type": "tuple",
                "components": [
                    {"name": "maker", "type": "address"},
                    {"name": "amounts", "type": "uint256[]"}
                ]
            }]
        },
        {"type": "event", "name": "Anon", "anonymous": true, "inputs": []}
    ]);

    let methods = AbiMethod::from_json_abi(&abi)?;
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].signature, "submit((address,uint256[]))");
    Ok(())
}

#[test]
fn test_collect_topics_is_distinct() -> Result<()> {
    let transfer = topic_of("Transfer(address,address,uint256)");
    let logs = vec![
        log(TOKEN, &[transfer], &[], 0),
        log(TOKEN, &[B256::repeat_byte(9)], &[], 1),
        log(TOKEN, &[transfer], &[], 2),
    ];
    assert_eq!(collect_topics(&logs), vec![transfer, B256::repeat_byte(9)]);
    Ok(())
}

//////////////////////////////////////// Traces ////////////////////////////////////////

fn transfer_calldata(to: &str, amount: u64) -> String {
    let mut input = hex::decode("a9059cbb").expect("valid hex");
    input.extend_from_slice(padded(to).as_slice());
    input.extend_from_slice(&word(amount));
    hex::encode_prefixed(input)
}

fn nested_trace() -> Value {
    json!({
        "type": "CALL",
        "from": ALICE,
        "to": OPERATOR,
        "value": "0x0",
        "gasUsed": "0x5208",
        "input": "0x12345678",
        "calls": [
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": TOKEN,
                "value": "0x0",
                "gasUsed": "0x100",
                "input": transfer_calldata(BOB, 500),
                "calls": [
                    {
                        "type": "STATICCALL",
                        "from": TOKEN,
                        "to": BOB,
                        "gasUsed": "0x10",
                        "input": "0x70a08231"
                    }
                ]
            },
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": BOB,
                "value": "0xde0b6b3a7640000",
                "gasUsed": "0x0",
                "input": "0x"
            },
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": TOKEN,
                "gasUsed": "0x50",
                "input": "0xdeadbeef0000",
                "error": "execution reverted",
                "revertReason": "insufficient balance"
            }
        ]
    })
}

#[test]
fn test_trace_is_flattened_in_pre_order() -> Result<()> {
    let trace = nested_trace();
    assert_eq!(TraceFormat::detect(&trace), TraceFormat::CallTracer);

    let calls = decode_trace(&trace, TraceFormat::CallTracer, Lookups::default());
    let shape: Vec<(usize, Option<Address>)> =
        calls.iter().map(|call| (call.depth, call.contract)).collect();
    assert_eq!(
        shape,
        [
            (0, Some(address(OPERATOR))),
            (1, Some(address(TOKEN))),
            (2, Some(address(BOB))),
            (1, Some(address(BOB))),
            (1, Some(address(TOKEN))),
        ]
    );
    assert_eq!(calls[0].gas_used, 21_000);
    assert_eq!(calls[2].call_type, CallType::StaticCall);
    Ok(())
}

#[test]
fn test_malformed_frame_drops_only_its_subtree() -> Result<()> {
    let trace = json!({
        "type": "CALL",
        "from": ALICE,
        "to": OPERATOR,
        "gasUsed": "0x5208",
        "input": "0x12345678",
        "calls": [
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": TOKEN,
                "gasUsed": "0x100",
                "input": transfer_calldata(BOB, 500)
            },
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": "0x3333",
                "input": "0x70a08231",
                "calls": [
                    {"type": "STATICCALL", "from": TOKEN, "to": BOB, "input": "0x70a08231"}
                ]
            },
            {
                "type": "CALL",
                "from": OPERATOR,
                "to": BOB,
                "value": "0x1",
                "input": "0x"
            }
        ]
    });

    let calls = decode_trace(&trace, TraceFormat::CallTracer, Lookups::default());
    let shape: Vec<(usize, Option<Address>)> =
        calls.iter().map(|call| (call.depth, call.contract)).collect();
    assert_eq!(
        shape,
        [
            (0, Some(address(OPERATOR))),
            (1, Some(address(TOKEN))),
            (1, Some(address(BOB))),
        ]
    );
    assert_eq!(calls[1].method, "transfer");

    let selectors: Vec<String> = collect_selectors(&trace, TraceFormat::CallTracer)
        .iter()
        .map(hex::encode_prefixed)
        .collect();
    assert_eq!(selectors, ["0x12345678", "0xa9059cbb"]);
    Ok(())
}

#[test]
fn test_malformed_parity_entry_is_skipped() -> Result<()> {
    let trace = json!([
        {
            "type": "call",
            "action": {"callType": "call", "from": ALICE, "to": TOKEN, "input": transfer_calldata(BOB, 1)},
            "traceAddress": []
        },
        {
            "type": "call",
            "action": {"callType": "call", "from": TOKEN, "to": "0x3333", "input": "0x"},
            "traceAddress": [0]
        },
        {
            "type": "call",
            "action": {"callType": "staticcall", "from": TOKEN, "to": BOB, "input": "0x70a08231"},
            "traceAddress": [1]
        }
    ]);

    let calls = decode_trace(&trace, TraceFormat::Parity, Lookups::default());
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].contract, Some(address(TOKEN)));
    assert_eq!(calls[1].contract, Some(address(BOB)));
    assert_eq!(calls[1].call_type, CallType::StaticCall);
    Ok(())
}

#[test]
fn test_allow_listed_call_arguments_are_named() -> Result<()> {
    let calls = decode_trace(&nested_trace(), TraceFormat::CallTracer, Lookups::default());
    let transfer = &calls[1];

    assert_eq!(transfer.method, "transfer");
    assert_eq!(transfer.signature.as_deref(), Some("transfer(address,uint256)"));
    assert_eq!(transfer.argument("to"), Some(&DecodedValue::Address(address(BOB))));
    assert_eq!(transfer.argument("amount"), Some(&DecodedValue::Uint(500)));
    Ok(())
}

#[test]
fn test_known_but_not_allow_listed_stays_raw() -> Result<()> {
    let calls = decode_trace(&nested_trace(), TraceFormat::CallTracer, Lookups::default());
    let balance_of = &calls[2];

    assert_eq!(balance_of.method, "balanceOf");
    assert_eq!(balance_of.arguments, CallArguments::Raw(Default::default()));
    Ok(())
}

#[test]
fn test_unknown_selector_and_failed_call() -> Result<()> {
    let calls = decode_trace(&nested_trace(), TraceFormat::CallTracer, Lookups::default());

    assert_eq!(calls[0].method, "0x12345678");
    assert!(calls[0].signature.is_none());
    assert!(calls[0].success);

    let failed = &calls[4];
    assert!(!failed.success);
    assert_eq!(failed.method, "0xdeadbeef");
    assert_eq!(
        failed.error_reason.as_deref(),
        Some("execution reverted: insufficient balance")
    );
    assert_eq!(failed.arguments, CallArguments::Raw(vec![0u8, 0].into()));
    Ok(())
}

#[test]
fn test_value_transfer_has_no_method() -> Result<()> {
    let calls = decode_trace(&nested_trace(), TraceFormat::CallTracer, Lookups::default());
    let transfer = &calls[3];

    assert_eq!(transfer.method, "");
    assert_eq!(transfer.arguments, CallArguments::None);
    assert_eq!(transfer.value, U256::from(1_000_000_000_000_000_000u64));
    Ok(())
}

#[test]
fn test_abi_function_takes_precedence() -> Result<()> {
    let transfer = AbiMethod::function(
        "transfer",
        vec![
            AbiInput::new("recipient", "address", false),
            AbiInput::new("wad", "uint256", false),
        ],
    );
    let index = AbiIndex::from_contracts(&verified(vec![transfer]));
    let calls = decode_trace(
        &nested_trace(),
        TraceFormat::CallTracer,
        Lookups::new(Some(&index), None),
    );

    assert_eq!(calls[1].argument("recipient"), Some(&DecodedValue::Address(address(BOB))));
    assert_eq!(calls[1].argument("wad"), Some(&DecodedValue::Uint(500)));
    Ok(())
}

#[test]
fn test_unsupported_trace_shape_yields_no_calls() -> Result<()> {
    let trace = json!({"structLogs": [], "gas": 21000});
    assert_eq!(TraceFormat::detect(&trace), TraceFormat::Unsupported);
    assert!(decode_trace(&trace, TraceFormat::Unsupported, Lookups::default()).is_empty());
    Ok(())
}

#[test]
fn test_parity_traces_use_trace_address_depth() -> Result<()> {
    let trace = json!([
        {
            "type": "call",
            "action": {
                "callType": "call",
                "from": ALICE,
                "to": TOKEN,
                "value": "0x0",
                "input": transfer_calldata(BOB, 1)
            },
            "result": {"gasUsed": "0x10", "output": "0x"},
            "traceAddress": []
        },
        {
            "type": "create",
            "action": {
                "from": TOKEN,
                "value": "0x0",
                "init": "0x6080604052"
            },
            "result": {"gasUsed": "0x20", "address": OPERATOR},
            "traceAddress": [0]
        }
    ]);
    assert_eq!(TraceFormat::detect(&trace), TraceFormat::Parity);

    let calls = decode_trace(&trace, TraceFormat::Parity, Lookups::default());
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].method, "transfer");
    assert_eq!(calls[0].depth, 0);
    assert_eq!(calls[1].call_type, CallType::Create);
    assert_eq!(calls[1].contract, Some(address(OPERATOR)));
    assert_eq!(calls[1].method, "");
    assert_eq!(calls[1].depth, 1);
    Ok(())
}

#[test]
fn test_trace_collectors() -> Result<()> {
    let trace = nested_trace();
    let selectors: Vec<String> = collect_selectors(&trace, TraceFormat::CallTracer)
        .iter()
        .map(hex::encode_prefixed)
        .collect();
    assert_eq!(selectors, ["0x12345678", "0xa9059cbb", "0x70a08231", "0xdeadbeef"]);

    assert_eq!(
        collect_contracts(&trace, TraceFormat::CallTracer),
        vec![address(OPERATOR), address(TOKEN), address(BOB)]
    );
    Ok(())
}
