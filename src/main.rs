use std::sync::{Arc, Mutex};

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courtbook::config::{AppConfig, ExpiryMode};
use courtbook::db;
use courtbook::handlers;
use courtbook::services::expiry;
use courtbook::services::notifications::webhook::WebhookDispatcher;
use courtbook::services::notifications::{LogDispatcher, NotificationDispatcher};
use courtbook::services::payments::http::HttpGateway;
use courtbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.gateway_webhook_secret.is_empty() {
        tracing::warn!("GATEWAY_WEBHOOK_SECRET is empty, webhook signatures are not checked");
    }
    tracing::info!("using payment gateway at {}", config.gateway_url);
    let gateway = HttpGateway::new(config.gateway_url.clone(), config.gateway_api_key.clone());

    let notifier: Box<dyn NotificationDispatcher> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, notifications are logged only");
        Box::new(LogDispatcher)
    } else {
        Box::new(WebhookDispatcher::new(config.notify_webhook_url.clone()))
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        gateway: Box::new(gateway),
        notifier,
    });

    if config.expiry_mode == ExpiryMode::Sweep {
        tracing::info!(every_secs = config.expiry_sweep_secs, "starting payment expiry sweeper");
        expiry::spawn_sweeper(state.clone());
    }

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
