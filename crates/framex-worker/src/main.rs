//! framex-worker: pulls job ids off the queue and extracts frames.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use framex_queue::RedisWorkQueue;
use framex_worker::{Dispatcher, ProcessingContext, StaleJobReconciler, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run(WorkerConfig::from_env()).await {
        error!("framex-worker exited: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("framex=info".parse().expect("static directive"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    info!(?config, "framex-worker starting");

    if let Some(addr) = config.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    let queue = RedisWorkQueue::from_env().context("connecting work queue")?;
    let ctx = Arc::new(ProcessingContext::from_env(config).context("building processing context")?);
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&ctx), Arc::new(queue)));

    let reconciler = tokio::spawn({
        let shutdown = dispatcher.shutdown_signal();
        async move { StaleJobReconciler::new(ctx).run(shutdown).await }
    });

    tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested, no new jobs will be taken");
            dispatcher.shutdown();
        }
    });

    dispatcher.run().await.context("dispatcher")?;
    reconciler.await.ok();

    info!("framex-worker stopped");
    Ok(())
}
