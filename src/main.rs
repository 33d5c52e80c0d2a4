use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shop_invader::config::AppConfig;
use shop_invader::services::InMemoryContentEntryService;
use shop_invader::templates::TemplateSources;
use shop_invader::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO; override with RUST_LOG
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shop_invader=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let sites = config.load_sites()?;
    let templates = TemplateSources::from_dirs(&config.snippets_dir, &config.pages_dir)?.compile()?;
    let sweep_interval = config.session_sweep_interval;
    let address = config.server_address();

    let state = AppState::new(
        config,
        sites,
        Arc::new(InMemoryContentEntryService::new()),
        templates,
    )?;
    state.sessions.spawn_cleanup(sweep_interval);

    let app = create_app(state);

    tracing::info!("Starting storefront server on http://{}", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
