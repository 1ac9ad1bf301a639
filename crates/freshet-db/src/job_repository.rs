use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use freshet_core::error::AppError;
use freshet_core::job::{EnqueueOutcome, FailOutcome, JobStatus, RetryPolicy, ScrapeJob};
use freshet_core::job_queue::JobQueue;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
///
/// Claimed jobs are leased: a `running` job whose `leased_until` has passed
/// is claimable again, so a worker that dies mid-job does not lose it. Acks
/// and failures only apply while the reporting worker still holds the lease.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: Pool<Postgres>,
    retry: RetryPolicy,
    lease: Duration,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, retry: RetryPolicy, lease: Duration) -> Self {
        Self { pool, retry, lease }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ScrapeJobRow {
    id: String,
    kind: String,
    locator: String,
    parent_id: Option<String>,
    status: String,
    attempts: i32,
    max_attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    next_run_at: Option<DateTime<Utc>>,
    leased_until: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    last_error: Option<String>,
}

impl TryFrom<ScrapeJobRow> for ScrapeJob {
    type Error = AppError;

    fn try_from(row: ScrapeJobRow) -> Result<Self, Self::Error> {
        Ok(ScrapeJob {
            kind: row.kind.parse().map_err(AppError::DatabaseError)?,
            status: row.status.parse().map_err(AppError::DatabaseError)?,
            id: row.id,
            locator: row.locator,
            parent_id: row.parent_id,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            next_run_at: row.next_run_at,
            leased_until: row.leased_until,
            worker_id: row.worker_id,
            last_error: row.last_error,
        })
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

fn lease_lost(job_id: &str, worker_id: &str) -> AppError {
    AppError::LeaseLost {
        job_id: job_id.to_string(),
        worker_id: worker_id.to_string(),
    }
}

impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: ScrapeJob) -> Result<EnqueueOutcome, AppError> {
        // Any row with this id, failed ones included, makes the insert a no-op.
        let inserted = sqlx::query(
            r#"
            INSERT INTO scrape_jobs (id, kind, locator, parent_id, status, attempts, max_attempts)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.as_str())
        .bind(&job.locator)
        .bind(&job.parent_id)
        .bind(job.max_attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        Ok(if inserted == 1 {
            EnqueueOutcome::Enqueued
        } else {
            EnqueueOutcome::Deduplicated
        })
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        let row = sqlx::query_as::<_, ScrapeJobRow>(
            r#"
            UPDATE scrape_jobs
            SET status = 'running',
                worker_id = $1,
                leased_until = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM scrape_jobs
                WHERE (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()))
                   OR (status = 'running' AND leased_until <= NOW())
                ORDER BY next_run_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn ack(&self, job_id: &str, worker_id: &str) -> Result<(), AppError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM scrape_jobs
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if deleted == 0 {
            return Err(lease_lost(job_id, worker_id));
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> Result<FailOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (attempts, max_attempts, holder, status): (i32, i32, Option<String>, String) =
            sqlx::query_as(
                r#"
                SELECT attempts, max_attempts, worker_id, status
                FROM scrape_jobs WHERE id = $1 FOR UPDATE
                "#,
            )
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound {
                kind: "job",
                id: job_id.to_string(),
            })?;

        if status != JobStatus::Running.as_str() || holder.as_deref() != Some(worker_id) {
            return Err(lease_lost(job_id, worker_id));
        }

        let outcome = self
            .retry
            .on_failure(attempts.max(0) as u32, max_attempts.max(0) as u32);
        let (status, attempts, delay_secs) = match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                (JobStatus::Pending, attempt, Some(delay.as_secs_f64()))
            }
            FailOutcome::Exhausted { attempts } => (JobStatus::Failed, attempts, None),
        };

        sqlx::query(
            r#"
            UPDATE scrape_jobs
            SET status = $2,
                attempts = $3,
                next_run_at = CASE
                    WHEN $4::float8 IS NULL THEN NULL
                    ELSE NOW() + make_interval(secs => $4::float8)
                END,
                leased_until = NULL,
                worker_id = NULL,
                last_error = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(attempts as i32)
        .bind(delay_secs)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(outcome)
    }

    async fn retry_failed(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        let row = sqlx::query_as::<_, ScrapeJobRow>(
            r#"
            UPDATE scrape_jobs
            SET status = 'pending',
                attempts = 0,
                next_run_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        let row = sqlx::query_as::<_, ScrapeJobRow>(r#"SELECT * FROM scrape_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, AppError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, ScrapeJobRow>(
                r#"
                SELECT * FROM scrape_jobs
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, ScrapeJobRow>(
                r#"
                SELECT * FROM scrape_jobs
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scrape_jobs
            SET status = 'pending', worker_id = NULL, leased_until = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM scrape_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(count)
    }
}
