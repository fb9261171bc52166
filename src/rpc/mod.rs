use std::sync::Arc;

use alloy_primitives::B256;
use anyhow::{anyhow, Result};
use opentelemetry::KeyValue;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::metrics::Metrics;
use crate::models::common::RawTransaction;
use crate::models::errors::ServiceError;
use crate::utils::cancel::ExecutionContext;
use crate::utils::parse_quantity;
use crate::utils::retry::{retry, RetryConfig};

// Provider-specific "response too large" for debug traces
const TRACE_TOO_LARGE: i64 = -32008;
const METHOD_NOT_FOUND: i64 = -32601;

/// Minimal JSON-RPC client for the three calls needed to load one
/// transaction. Every request runs through the retry wrapper.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl RpcClient {
    pub fn new(url: Url, retry_config: RetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            retry_config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Receipt, call trace and chain id of `tx_hash`, ready to seed a workspace.
    pub async fn fetch_transaction(&self, ctx: &ExecutionContext, tx_hash: B256) -> Result<RawTransaction> {
        let chain_id = self.chain_id(ctx).await?;
        let receipt = self.transaction_receipt(ctx, tx_hash).await?;
        let trace = self.trace_transaction(ctx, tx_hash).await?;

        Ok(RawTransaction {
            receipt,
            logs: Vec::new(),
            trace,
            network_id: chain_id,
        })
    }

    pub async fn chain_id(&self, ctx: &ExecutionContext) -> Result<u64> {
        let result = self.call(ctx, "eth_chainId", json!([])).await?;
        result
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| anyhow!(ServiceError::MalformedResponse(format!("chain id {}", result))))
    }

    pub async fn transaction_receipt(&self, ctx: &ExecutionContext, tx_hash: B256) -> Result<Value> {
        let receipt = self
            .call(ctx, "eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if receipt.is_null() {
            return Err(anyhow!("No receipt found for transaction {}", tx_hash));
        }
        Ok(receipt)
    }

    /// `callTracer` output, or None when the node cannot produce it.
    pub async fn trace_transaction(&self, ctx: &ExecutionContext, tx_hash: B256) -> Result<Option<Value>> {
        let params = json!([tx_hash, { "tracer": "callTracer" }]);
        match self.call(ctx, "debug_traceTransaction", params).await {
            Ok(Value::Null) => Ok(None),
            Ok(trace) => Ok(Some(trace)),
            Err(e) => match rpc_error_code(&e) {
                Some(TRACE_TOO_LARGE) => {
                    warn!("Skipping oversized trace for transaction {}: {}", tx_hash, e);
                    Ok(None)
                }
                Some(METHOD_NOT_FOUND) => {
                    warn!("Node does not support debug_traceTransaction, decoding without calls");
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }

    async fn call(&self, ctx: &ExecutionContext, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        retry(
            || async {
                let start = std::time::Instant::now();
                self.record(|metrics, labels| metrics.rpc_requests.add(1, labels), method);

                let result = self.send(&body).await;

                self.record(
                    |metrics, labels| metrics.rpc_latency.record(start.elapsed().as_secs_f64(), labels),
                    method,
                );
                if result.is_err() {
                    self.record(|metrics, labels| metrics.rpc_errors.add(1, labels), method);
                }
                result
            },
            &self.retry_config,
            ctx,
            method,
        )
        .await
        .map_err(anyhow::Error::from)
    }

    async fn send(&self, body: &Value) -> Result<Value> {
        let response = self.http.post(self.url.clone()).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                url: self.url.to_string(),
            }
            .into());
        }
        let payload: Value = response.json().await?;
        debug!("RPC response from {}: {} bytes", self.url, payload.to_string().len());
        Ok(parse_rpc_response(payload)?)
    }

    fn record(&self, f: impl Fn(&Metrics, &[KeyValue]), method: &str) {
        if let Some(metrics) = &self.metrics {
            let labels = [
                KeyValue::new("network", metrics.network.clone()),
                KeyValue::new("method", method.to_string()),
            ];
            f(metrics, &labels);
        }
    }
}

/// Extracts `result` from a JSON-RPC response envelope.
pub fn parse_rpc_response(payload: Value) -> Result<Value, ServiceError> {
    if let Some(error) = payload.get("error").filter(|error| !error.is_null()) {
        return Err(ServiceError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    match payload {
        Value::Object(mut envelope) => envelope
            .remove("result")
            .ok_or_else(|| ServiceError::MalformedResponse("missing result".to_string())),
        other => Err(ServiceError::MalformedResponse(format!(
            "expected object, got {}",
            other
        ))),
    }
}

fn rpc_error_code(e: &anyhow::Error) -> Option<i64> {
    e.chain().find_map(|cause| {
        if let Some(ServiceError::Rpc { code, .. }) = cause.downcast_ref::<ServiceError>() {
            return Some(*code);
        }
        None
    })
}
