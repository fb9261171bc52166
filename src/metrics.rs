use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use tokio::time::Instant;
use tracing::{error, info};

use crate::pipeline::progress::{ProgressSink, StageStatus};

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub network: String,

    // Stage metrics
    pub stage_transitions: Counter<u64>,
    pub stage_errors: Counter<u64>,
    pub stage_duration: Histogram<f64>,
    running_since: std::sync::Mutex<Option<(String, Instant)>>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(network: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("tx_decoder_metrics");

        let stage_transitions = meter
            .u64_counter("tx_decoder_stage_transitions")
            .with_description("Stage status transitions by stage and status")
            .build();

        let stage_errors = meter
            .u64_counter("tx_decoder_stage_errors")
            .with_description("Number of stages that ended in error")
            .build();

        let stage_duration = meter
            .f64_histogram("tx_decoder_stage_duration")
            .with_description("Time spent inside a stage")
            .with_boundaries(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0])
            .with_unit("s")
            .build();

        let rpc_requests = meter
            .u64_counter("tx_decoder_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("tx_decoder_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("tx_decoder_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            network,
            stage_transitions,
            stage_errors,
            stage_duration,
            running_since: std::sync::Mutex::new(None),
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid metrics address {addr}:{port}"))?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Only used for logging
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {addr}"))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });
        Ok(())
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> Result<String> {
        encode(&self.registry)
    }
}

impl ProgressSink for Metrics {
    fn on_transition(&self, stage: &str, status: StageStatus) {
        let labels = [
            KeyValue::new("network", self.network.clone()),
            KeyValue::new("stage", stage.to_string()),
        ];
        self.stage_transitions.add(
            1,
            &[
                labels[0].clone(),
                labels[1].clone(),
                KeyValue::new("status", status.as_str()),
            ],
        );

        let Ok(mut running) = self.running_since.lock() else {
            return;
        };
        match status {
            StageStatus::Running => *running = Some((stage.to_string(), Instant::now())),
            StageStatus::Finished | StageStatus::Errored => {
                if let Some((name, started)) = running.take() {
                    if name == stage {
                        self.stage_duration
                            .record(started.elapsed().as_secs_f64(), &labels);
                    }
                }
                if status == StageStatus::Errored {
                    self.stage_errors.add(1, &labels);
                }
            }
            StageStatus::NotStarted => {}
        }
    }
}

fn encode(registry: &prometheus::Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    encode(&registry).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
