use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use pagechat::agent::{OllamaBackend, DEFAULT_MODEL};
use pagechat::db::history_repository::HistoryRepository;
use pagechat::db::settings_repository::SettingsRepository;
use pagechat::relay::RelayCoordinator;
use pagechat::routes;
use pagechat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagechat=debug,tower_http=debug".into()),
        )
        .init();

    // ── Database ──────────────────────────────────────────────────────────────
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://pagechat.db?mode=rwc".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to open the chat database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    info!("Database ready and migrations applied");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let completion_base_url = std::env::var("COMPLETION_API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:11434".to_string());
    let completion_model =
        std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

    let backend = OllamaBackend::with_model(&completion_base_url, &completion_model);
    let state = AppState {
        coordinator: RelayCoordinator::new(Arc::new(backend)),
        history: HistoryRepository::new(pool.clone()),
        settings: SettingsRepository::new(pool),
    };

    let app = routes::router(state);

    // ── Listen ────────────────────────────────────────────────────────────────
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
