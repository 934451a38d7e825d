use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use glimpse_api::media::MediaStore;
use glimpse_api::state::AppStateInner;
use glimpse_core::lifecycle::run_sweep_loop;
use glimpse_core::{StoryConfig, StoryEngine};
use glimpse_db::Database;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glimpse_server=debug,glimpse_api=debug,glimpse_core=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("GLIMPSE_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: GLIMPSE_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    let db_path = std::env::var("GLIMPSE_DB_PATH").unwrap_or_else(|_| "glimpse.db".into());
    let media_dir: PathBuf = std::env::var("GLIMPSE_MEDIA_DIR")
        .unwrap_or_else(|_| "./media".into())
        .into();
    let host = std::env::var("GLIMPSE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("GLIMPSE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let config = StoryConfig::from_env();
    let sweep_interval = config.sweep_interval_secs;

    // Init database, media store and engine
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let media = MediaStore::new(media_dir).await?;
    let engine = StoryEngine::new(db, config);

    // Background expiry sweep
    tokio::spawn(run_sweep_loop(engine.clone(), sweep_interval));

    let state = Arc::new(AppStateInner::new(engine, media, jwt_secret));

    let app = glimpse_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Glimpse server listening on {}", addr);
    info!("Story sweep every {} seconds", sweep_interval);

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
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
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
