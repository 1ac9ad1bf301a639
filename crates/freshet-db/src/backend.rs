use freshet_core::error::AppError;
use freshet_core::job::{EnqueueOutcome, FailOutcome, JobStatus, ScrapeJob};
use freshet_core::job_queue::{DisabledQueue, JobQueue};

use crate::job_repository::PgJobQueue;

/// Queue implementation chosen once at startup from configuration.
#[derive(Clone)]
pub enum QueueBackend {
    Postgres(PgJobQueue),
    Disabled(DisabledQueue),
}

impl QueueBackend {
    pub fn disabled() -> Self {
        QueueBackend::Disabled(DisabledQueue)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueBackend::Postgres(_) => "postgres",
            QueueBackend::Disabled(_) => "disabled",
        }
    }
}

impl From<PgJobQueue> for QueueBackend {
    fn from(queue: PgJobQueue) -> Self {
        QueueBackend::Postgres(queue)
    }
}

impl JobQueue for QueueBackend {
    fn is_enabled(&self) -> bool {
        match self {
            QueueBackend::Postgres(q) => q.is_enabled(),
            QueueBackend::Disabled(q) => q.is_enabled(),
        }
    }

    async fn enqueue(&self, job: ScrapeJob) -> Result<EnqueueOutcome, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.enqueue(job).await,
            QueueBackend::Disabled(q) => q.enqueue(job).await,
        }
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.claim(worker_id).await,
            QueueBackend::Disabled(q) => q.claim(worker_id).await,
        }
    }

    async fn ack(&self, job_id: &str, worker_id: &str) -> Result<(), AppError> {
        match self {
            QueueBackend::Postgres(q) => q.ack(job_id, worker_id).await,
            QueueBackend::Disabled(q) => q.ack(job_id, worker_id).await,
        }
    }

    async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> Result<FailOutcome, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.fail(job_id, worker_id, error).await,
            QueueBackend::Disabled(q) => q.fail(job_id, worker_id, error).await,
        }
    }

    async fn retry_failed(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.retry_failed(job_id).await,
            QueueBackend::Disabled(q) => q.retry_failed(job_id).await,
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.get_job(job_id).await,
            QueueBackend::Disabled(q) => q.get_job(job_id).await,
        }
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.list_jobs(status, limit).await,
            QueueBackend::Disabled(q) => q.list_jobs(status, limit).await,
        }
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.release_worker_jobs(worker_id).await,
            QueueBackend::Disabled(q) => q.release_worker_jobs(worker_id).await,
        }
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        match self {
            QueueBackend::Postgres(q) => q.count_by_status(status).await,
            QueueBackend::Disabled(q) => q.count_by_status(status).await,
        }
    }
}
