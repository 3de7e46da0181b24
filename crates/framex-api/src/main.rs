//! framex-api server.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use framex_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    if let Err(e) = serve(ApiConfig::from_env()).await {
        error!("framex-api exited: {:#}", e);
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

async fn serve(config: ApiConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr().context("invalid API_HOST/API_PORT")?;

    let state = AppState::from_env(config.clone())
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("building application state")?;

    let metrics_handle = if config.metrics_enabled {
        metrics::init_metrics()
            .inspect_err(|e| warn!("Prometheus recorder not installed: {}", e))
            .ok()
    } else {
        None
    };

    let app = create_router(state, metrics_handle)
        .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, environment = %config.environment, "framex-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested, draining connections");
        })
        .await
        .context("server error")?;

    info!("framex-api stopped");
    Ok(())
}
