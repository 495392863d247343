use std::net::SocketAddr;

use tracing::info;

mod app;
mod auth;
mod http;
mod notifier;
mod object_store;
mod templates;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linebot_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > LINEBOT_CONFIG env > ~/.linebot/linebot.toml
    let config_path = std::env::var("LINEBOT_CONFIG").ok();
    let config = linebot_core::config::LinebotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        linebot_core::config::LinebotConfig::default()
    });

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = app::build_state(config).await?;
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("linebot gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
