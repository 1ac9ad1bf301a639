use std::time::Duration;

use freshet_core::AppError;
use freshet_core::job::RetryPolicy;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::backend::QueueBackend;
use crate::catalog_repository::CatalogRepository;
use crate::config::DatabaseConfig;
use crate::job_repository::PgJobQueue;

/// Central database facade: owns the connection pool, runs migrations,
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get a [`CatalogRepository`] backed by this pool.
    pub fn catalog_repo(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    /// Get a [`PgJobQueue`] backed by this pool.
    pub fn job_queue(&self, retry: RetryPolicy, lease: Duration) -> PgJobQueue {
        PgJobQueue::new(self.pool.clone(), retry, lease)
    }

    /// The PostgreSQL queue when `enabled`, otherwise the disabled queue.
    pub fn queue_backend(&self, enabled: bool, retry: RetryPolicy, lease: Duration) -> QueueBackend {
        if enabled {
            QueueBackend::Postgres(self.job_queue(retry, lease))
        } else {
            QueueBackend::disabled()
        }
    }

    /// Round-trip a trivial query to check the connection.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection. Waits for checked-out connections to
    /// be returned.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
