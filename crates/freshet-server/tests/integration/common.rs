use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use freshet_core::job::RetryPolicy;
use freshet_core::{Locators, ScrapeCoordinator, StalenessPolicy};
use freshet_db::{CatalogRepository, Database, QueueBackend};
use freshet_server::routes;
use freshet_server::state::AppState;

pub const BASE: &str = "https://shop.example.com/en-gb";

/// Everything a test needs; the container must outlive the router.
pub struct TestApp {
    pub router: Router,
    pub catalog: CatalogRepository,
    pub queue: QueueBackend,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up a PostgreSQL container and build the router over it, with the
/// scrape queue enabled.
pub async fn setup_test_app() -> TestApp {
    build(true).await
}

/// Same as [`setup_test_app`] but with the scrape queue disabled.
pub async fn setup_test_app_queue_disabled() -> TestApp {
    build(false).await
}

async fn build(queue_enabled: bool) -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "freshet_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/freshet_test");
    let db = Database::from_pool(retry_connect(&url).await);
    db.migrate().await.expect("Failed to run migrations");

    let queue = db.queue_backend(queue_enabled, RetryPolicy::default(), Duration::from_secs(300));
    let catalog = db.catalog_repo();
    let coordinator = ScrapeCoordinator::new(
        queue.clone(),
        catalog.clone(),
        StalenessPolicy::default(),
        Locators::new(BASE),
        3,
    );

    let state = Arc::new(AppState { db, coordinator });

    TestApp {
        router: routes::router(state),
        catalog,
        queue,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
