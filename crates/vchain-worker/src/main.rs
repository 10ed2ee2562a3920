//! Long-form video worker binary.

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vchain_queue::JobQueue;
use vchain_worker::{JobExecutor, PipelineConfig, PipelineContext, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vchain=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vchain-worker");

    let config = WorkerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    info!("Worker config: {:?}", config);
    info!("Pipeline config: {:?}", pipeline_config);

    let metrics_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    if let Err(e) = PrometheusBuilder::new().with_http_listener(metrics_addr).install() {
        error!("Failed to install Prometheus exporter: {}", e);
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match PipelineContext::from_env(pipeline_config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to initialize pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let executor = JobExecutor::new(config, queue, ctx);

    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.send(true).ok();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
