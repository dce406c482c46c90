use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use kindred_api::config::Settings;
use kindred_api::moderation::Moderator;
use kindred_api::{AppStateInner, build_router, reaper};
use kindred_gateway::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred_server=debug,kindred_api=debug,kindred_db=info,kindred_gateway=info,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("KINDRED_DB_PATH").unwrap_or_else(|_| "kindred.db".into());
    let host = std::env::var("KINDRED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("KINDRED_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let reaper_interval: u64 = std::env::var("KINDRED_REAPER_INTERVAL_SECS")
        .unwrap_or_else(|_| "3600".into())
        .parse()?;
    let settings = Settings::from_env()?;

    // Init database
    let db = kindred_db::Database::open(&PathBuf::from(&db_path))?;

    let moderator = Moderator::new(&settings.moderation)?;
    if !moderator.is_configured() {
        info!("No moderation classifier configured; letters are approved on submit");
    }

    info!(
        "Circles: capacity {}, ttl {}h, {} messages/day",
        settings.circle_capacity,
        settings.circle_ttl.num_hours(),
        settings.daily_message_limit
    );

    // Shared state
    let state = AppStateInner::new(db, Dispatcher::new(), settings, moderator);

    if reaper_interval > 0 {
        tokio::spawn(reaper::run_archive_loop(state.clone(), reaper_interval));
    }

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Kindred server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
