use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use holdgate::{app, build_state_from_env};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let bind = std::env::var("HOLDGATE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_owned());
    let addr: SocketAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("HOLDGATE_BIND '{}' is not a socket address", bind))?;

    let state = build_state_from_env()
        .await
        .map_err(|e| anyhow!("failed to load configuration: {}", e))?;
    let events = state.registry.events();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, ?events, "event bridge listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
