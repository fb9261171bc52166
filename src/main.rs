use std::sync::Arc;

use alloy_primitives::B256;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tokio::{signal, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

use tx_decoder::metrics::Metrics;
use tx_decoder::models::common::{Config, Network, RawTransaction};
use tx_decoder::pipeline::progress::LogProgress;
use tx_decoder::pipeline::stage::Stage;
use tx_decoder::pipeline::workspace::Workspace;
use tx_decoder::pipeline::Pipeline;
use tx_decoder::rpc::RpcClient;
use tx_decoder::stages::{
    CallDecoderStage, ContractAbiStage, EventDecoderStage, SignatureLookupStage,
};
use tx_decoder::utils::cancel::ExecutionContext;
use tx_decoder::utils::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let input = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: tx-decoder <tx.json | 0x-transaction-hash>"))?;

    let config = match load_config("config.yml") {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(e);
        }
    };

    let (canceller, ctx) = ExecutionContext::new();
    let ctx = ctx.with_timeout(Duration::from_secs(config.pipeline_timeout_secs));
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, cancelling pipeline...");
            canceller.cancel();
        }
    });

    let (raw, metrics) = match input.parse::<B256>() {
        Ok(tx_hash) if input.starts_with("0x") => {
            let rpc_url = config
                .rpc_url
                .clone()
                .ok_or_else(|| anyhow!("rpc_url must be configured to decode by hash"))?;
            info!("Fetching transaction {} from {}", tx_hash, rpc_url);
            let mut client = RpcClient::new(rpc_url, config.retry.clone());

            let network = Network::from_chain_id(client.chain_id(&ctx).await?);
            let metrics = init_metrics(&config, network).await?;
            if let Some(metrics) = &metrics {
                client = client.with_metrics(metrics.clone());
            }
            (client.fetch_transaction(&ctx, tx_hash).await?, metrics)
        }
        _ => {
            let contents = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("failed to read {}", input))?;
            let raw = serde_json::from_str::<RawTransaction>(&contents)
                .with_context(|| format!("failed to parse {}", input))?;
            let metrics = init_metrics(&config, raw.network()).await?;
            (raw, metrics)
        }
    };
    let network = raw.network();
    info!("Decoding transaction on {}", network.name());

    let mut pipeline = Pipeline::new().with_progress(Arc::new(LogProgress));
    if let Some(metrics) = metrics {
        pipeline = pipeline.with_progress(metrics);
    }
    pipeline.register_all(build_stages(&config))?;
    info!("Execution order: {}", pipeline.order().join(" -> "));

    let mut workspace = Workspace::new(raw);
    pipeline.execute(&ctx, &mut workspace).await?;

    let output = json!({
        "network": network.name(),
        "events": workspace.events().unwrap_or_default(),
        "calls": workspace.calls().unwrap_or_default(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn init_metrics(config: &Config, network: Network) -> Result<Option<Arc<Metrics>>> {
    if !config.metrics.enabled {
        info!("Metrics are disabled");
        return Ok(None);
    }
    let metrics = Arc::new(Metrics::new(network.name())?);
    metrics
        .start_metrics_server(&config.metrics.address, config.metrics.port)
        .await?;
    Ok(Some(metrics))
}

fn build_stages(config: &Config) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();
    let mut events = EventDecoderStage::new();
    let mut calls = CallDecoderStage::new();

    if let Some(url) = &config.signature_service_url {
        let stage = SignatureLookupStage::new(url.clone(), config.retry.clone()).best_effort();
        events = events.with_dependency(SignatureLookupStage::NAME);
        calls = calls.with_dependency(SignatureLookupStage::NAME);
        stages.push(Box::new(stage));
    }
    if let Some(dir) = &config.abi_dir {
        events = events.with_dependency(ContractAbiStage::NAME);
        calls = calls.with_dependency(ContractAbiStage::NAME);
        stages.push(Box::new(ContractAbiStage::new(dir.clone())));
    }

    stages.push(Box::new(events));
    stages.push(Box::new(calls));
    stages
}
