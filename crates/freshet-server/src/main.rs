use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use freshet_core::{BootstrapTrigger, ScrapeConfig, ScrapeCoordinator, SystemClock};
use freshet_db::{Database, DatabaseConfig};
use freshet_server::routes;
use freshet_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("freshet=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("FRESHET_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = ScrapeConfig::from_env().context("Invalid scrape configuration")?;
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let queue = db.queue_backend(config.queue_enabled, config.retry, config.lease);
    tracing::info!(queue = queue.name(), base_url = %config.base_url, "Scrape queue ready");

    let coordinator = ScrapeCoordinator::new(
        queue.clone(),
        db.catalog_repo(),
        config.staleness_policy(SystemClock),
        config.locators(),
        config.retry.max_attempts,
    );

    let bootstrap = BootstrapTrigger::new(
        queue,
        db.catalog_repo(),
        config.locators(),
        config.retry.max_attempts,
    );
    tokio::spawn(async move {
        let outcome = bootstrap.run_once().await;
        tracing::info!(?outcome, "Bootstrap finished");
    });

    let state = Arc::new(AppState {
        db: db.clone(),
        coordinator,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
