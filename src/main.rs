//! Signal Board: lists Notion-backed projects, sells $5 interest signals
//! through Stripe Checkout and counts them from verified webhooks.

mod app;
mod config;
mod http;
mod payments;
mod signals;
mod store;
mod util;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config);
    init_server_time();

    if !config.notion_configured() {
        warn!("Running without a content store; /api/projects will be empty");
    }

    let listener = TcpListener::bind(config.server_addr).await?;
    info!(
        addr = %config.server_addr,
        public_base_url = %config.public_base_url,
        webhook_tolerance_secs = config.webhook_tolerance.as_secs(),
        dedup_ttl_secs = config.dedup_ttl.as_secs(),
        "Signal board listening"
    );

    let router = build_router(AppState::new(config));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Signal board stopped");
    Ok(())
}

/// RUST_LOG wins over LOG_LEVEL; LOG_FORMAT=json switches to JSON lines
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal, "Draining connections before shutdown");
}
