use std::collections::HashMap;

use alloy_primitives::hex;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::decoder::logs::collect_topics;
use crate::decoder::traces::collect_selectors;
use crate::models::datasets::traces::TraceFormat;
use crate::models::errors::{RetryError, ServiceError};
use crate::pipeline::stage::Stage;
use crate::pipeline::workspace::{Workspace, WorkspaceKey};
use crate::stages::require_raw_data;
use crate::utils::cancel::ExecutionContext;
use crate::utils::retry::{retry, RetryConfig};

/// Resolves unknown topic hashes and selectors against an OpenChain-style
/// signature database in a single request.
pub struct SignatureLookupStage {
    http: reqwest::Client,
    url: Url,
    retry_config: RetryConfig,
    best_effort: bool,
}

impl SignatureLookupStage {
    pub const NAME: &'static str = "resolve_signatures";

    pub fn new(url: Url, retry_config: RetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            retry_config,
            best_effort: false,
        }
    }

    /// Publish an empty result instead of failing when the service is down.
    /// Cancellation still fails the stage.
    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    fn lookup_url(&self, events: &[String], functions: &[String]) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            if !events.is_empty() {
                query.append_pair("event", &events.join(","));
            }
            if !functions.is_empty() {
                query.append_pair("function", &functions.join(","));
            }
            query.append_pair("filter", "true");
        }
        url
    }

    async fn fetch(&self, ctx: &ExecutionContext, url: &Url) -> Result<HashMap<String, String>, RetryError> {
        retry(
            || async {
                let response = self.http.get(url.clone()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ServiceError::Status {
                        status: status.as_u16(),
                        url: self.url.to_string(),
                    }
                    .into());
                }
                let payload: Value = response.json().await?;
                Ok(parse_lookup_response(&payload)?)
            },
            &self.retry_config,
            ctx,
            Self::NAME,
        )
        .await
    }
}

#[async_trait]
impl Stage for SignatureLookupStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reads(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::RawData]
    }

    fn writes(&self) -> Vec<WorkspaceKey> {
        vec![WorkspaceKey::ResolvedSignatures]
    }

    async fn process(&self, ctx: &ExecutionContext, workspace: &mut Workspace) -> Result<()> {
        let raw = require_raw_data(workspace, Self::NAME)?;

        let events: Vec<String> = collect_topics(raw.log_entries())
            .iter()
            .map(hex::encode_prefixed)
            .collect();
        let functions: Vec<String> = match &raw.trace {
            Some(trace) => collect_selectors(trace, TraceFormat::detect(trace))
                .iter()
                .map(hex::encode_prefixed)
                .collect(),
            None => Vec::new(),
        };

        if events.is_empty() && functions.is_empty() {
            debug!("No topics or selectors to resolve");
            workspace.merge_resolved_signatures(HashMap::new());
            return Ok(());
        }

        let url = self.lookup_url(&events, &functions);
        let resolved = match self.fetch(ctx, &url).await {
            Ok(resolved) => resolved,
            Err(e) if self.best_effort && !e.is_cancelled() => {
                warn!("Signature lookup unavailable, continuing without it: {}", e);
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Resolved {} of {} signatures",
            resolved.len(),
            events.len() + functions.len()
        );
        workspace.merge_resolved_signatures(resolved);
        Ok(())
    }
}

/// Flattens `{result: {event: {hash: [{name}]}, function: {...}}}` into
/// hash -> first text signature. Hashes with no candidates are omitted.
pub fn parse_lookup_response(payload: &Value) -> Result<HashMap<String, String>, ServiceError> {
    if payload.get("ok").and_then(Value::as_bool) == Some(false) {
        return Err(ServiceError::MalformedResponse(
            payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("lookup rejected")
                .to_string(),
        ));
    }
    let result = payload
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| ServiceError::MalformedResponse("missing result".to_string()))?;

    let mut resolved = HashMap::new();
    for section in ["event", "function"] {
        let Some(entries) = result.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (hash, candidates) in entries {
            let name = candidates
                .as_array()
                .and_then(|candidates| candidates.first())
                .and_then(|candidate| candidate.get("name"))
                .and_then(Value::as_str);
            if let Some(name) = name {
                resolved.insert(hash.to_lowercase(), name.to_string());
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use crate::models::common::RawTransaction;

    const TRANSFER_TOPIC: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    async fn serve(router: Router) -> Result<Url> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Url::parse(&format!("http://{addr}/lookup"))?)
    }

    // Answers every requested event hash with the ERC-20 Transfer signature
    fn lookup_router() -> Router {
        Router::new().route(
            "/lookup",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let events: serde_json::Map<String, Value> = params
                    .get("event")
                    .map(|hashes| {
                        hashes
                            .split(',')
                            .map(|hash| {
                                (
                                    hash.to_string(),
                                    json!([{"name": "Transfer(address,address,uint256)"}]),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Json(json!({"ok": true, "result": {"event": events, "function": {}}}))
            }),
        )
    }

    fn transfer_workspace() -> Workspace {
        Workspace::new(RawTransaction {
            logs: vec![json!({
                "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "topics": [TRANSFER_TOPIC],
                "data": "0x"
            })],
            network_id: 1,
            ..Default::default()
        })
    }

    fn quick_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            initial_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_process_publishes_resolved_signatures() -> Result<()> {
        let stage = SignatureLookupStage::new(serve(lookup_router()).await?, quick_retries());
        let mut workspace = transfer_workspace();
        workspace.merge_resolved_signatures(HashMap::from([(
            "0xa9059cbb".to_string(),
            "transfer(address,uint256)".to_string(),
        )]));

        stage
            .process(&ExecutionContext::background(), &mut workspace)
            .await?;

        let resolved = workspace.resolved_signatures().expect("signatures published");
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[TRANSFER_TOPIC], "Transfer(address,address,uint256)");
        assert_eq!(resolved["0xa9059cbb"], "transfer(address,uint256)");
        Ok(())
    }

    #[tokio::test]
    async fn test_outage_is_tolerated_only_in_best_effort_mode() -> Result<()> {
        let url = serve(Router::new().route(
            "/lookup",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await?;
        let ctx = ExecutionContext::background();

        let strict = SignatureLookupStage::new(url.clone(), quick_retries());
        let mut workspace = transfer_workspace();
        let err = strict.process(&ctx, &mut workspace).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(workspace.resolved_signatures().is_none());

        let lenient = SignatureLookupStage::new(url, quick_retries()).best_effort();
        let mut workspace = transfer_workspace();
        lenient.process(&ctx, &mut workspace).await?;
        assert_eq!(workspace.resolved_signatures(), Some(&HashMap::new()));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_fails_best_effort_lookup() -> Result<()> {
        let stage =
            SignatureLookupStage::new(serve(lookup_router()).await?, quick_retries()).best_effort();
        let (canceller, ctx) = ExecutionContext::new();
        canceller.cancel();

        let mut workspace = transfer_workspace();
        let err = stage.process(&ctx, &mut workspace).await.unwrap_err();
        let retry_err = err.downcast_ref::<RetryError>().expect("retry error");
        assert!(retry_err.is_cancelled());
        assert!(workspace.resolved_signatures().is_none());
        Ok(())
    }

    #[test]
    fn test_parse_lookup_response() {
        let payload = json!({
            "ok": true,
            "result": {
                "event": {
                    "0xDDF252AD1BE2C89B69C2B068FC378DAA952BA7F163C4A11628F55A4DF523B3EF": [
                        {"name": "Transfer(address,address,uint256)", "filtered": false}
                    ],
                    "0x1111111111111111111111111111111111111111111111111111111111111111": null
                },
                "function": {
                    "0xa9059cbb": [{"name": "transfer(address,uint256)", "filtered": false}],
                    "0xdeadbeef": []
                }
            }
        });

        let resolved = parse_lookup_response(&payload).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "Transfer(address,address,uint256)"
        );
        assert_eq!(resolved["0xa9059cbb"], "transfer(address,uint256)");
    }

    #[test]
    fn test_rejected_lookup_is_malformed() {
        let payload = json!({"ok": false, "error": "invalid hash"});
        assert!(matches!(
            parse_lookup_response(&payload),
            Err(ServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_lookup_url_carries_both_sections() {
        let stage = SignatureLookupStage::new(
            Url::parse("https://api.openchain.xyz/signature-database/v1/lookup").unwrap(),
            RetryConfig::default(),
        );
        let url = stage.lookup_url(&["0xaa".to_string()], &["0xbb".to_string(), "0xcc".to_string()]);
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["event"], "0xaa");
        assert_eq!(pairs["function"], "0xbb,0xcc");
        assert_eq!(pairs["filter"], "true");
    }
}
