use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postboard::auth::start_session_sweeper;
use postboard::cache::ResponseCache;
use postboard::config::Config;
use postboard::db::Database;
use postboard::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("POSTBOARD_CONFIG").unwrap_or_else(|_| "postboard.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} groups from {}",
        config.groups.len(),
        config_path
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL").unwrap_or(config.database_url.clone());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.sync_groups(&config.groups).await?;
    info!("Database initialized");

    let db = Arc::new(db);

    // Purge expired sessions in the background
    let sweep_db = db.clone();
    let sweep_minutes = config.session_sweep_minutes;
    tokio::spawn(async move {
        start_session_sweeper(sweep_db, sweep_minutes).await;
    });

    let state = Arc::new(AppState {
        db,
        index_cache: Arc::new(ResponseCache::new(Duration::from_secs(
            config.index_cache_seconds,
        ))),
        session_ttl: chrono::Duration::hours(config.session_hours),
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Server starting on http://{}", config.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
