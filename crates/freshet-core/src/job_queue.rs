use std::future::Future;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{EnqueueOutcome, FailOutcome, JobStatus, ScrapeJob};

/// Durable queue of scrape jobs.
///
/// Implementations must:
/// - treat `enqueue` of an id that is already present (pending, running or
///   failed) as a no-op returning [`EnqueueOutcome::Deduplicated`];
/// - lease each claimed job to exactly one worker at a time, and make it
///   claimable again once the lease expires without an ack;
/// - reject `ack` and `fail` from a worker that no longer holds the lease
///   with [`AppError::LeaseLost`];
/// - keep exhausted jobs in [`JobStatus::Failed`] until [`JobQueue::retry_failed`]
///   revives them.
pub trait JobQueue: Send + Sync + Clone + 'static {
    /// `false` when the queue runs in disabled mode.
    fn is_enabled(&self) -> bool {
        true
    }

    fn enqueue(
        &self,
        job: ScrapeJob,
    ) -> impl Future<Output = Result<EnqueueOutcome, AppError>> + Send;

    /// Atomically claim the next due job for processing.
    ///
    /// Returns `None` if no jobs are available.
    fn claim(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<ScrapeJob>, AppError>> + Send;

    /// Mark a job held by `worker_id` as done and remove it.
    fn ack(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Record a failed attempt by `worker_id`, rescheduling with backoff or
    /// moving the job to `failed` once its attempts are used up.
    fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> impl Future<Output = Result<FailOutcome, AppError>> + Send;

    /// Put a `failed` job back to `pending` with a fresh attempt budget.
    ///
    /// Returns the revived job, or `None` when no failed job has this id.
    fn retry_failed(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<ScrapeJob>, AppError>> + Send;

    fn get_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<ScrapeJob>, AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScrapeJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}

/// Queue used when no transport is configured: every enqueue is a logged
/// no-op and nothing is ever delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledQueue;

impl JobQueue for DisabledQueue {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn enqueue(&self, job: ScrapeJob) -> Result<EnqueueOutcome, AppError> {
        tracing::info!(
            kind = %job.kind,
            locator = %job.locator,
            "Scrape queue disabled, skipping enqueue"
        );
        Ok(EnqueueOutcome::Disabled)
    }

    async fn claim(&self, _worker_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        Ok(None)
    }

    async fn ack(&self, _job_id: &str, _worker_id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn fail(
        &self,
        _job_id: &str,
        _worker_id: &str,
        _error: &str,
    ) -> Result<FailOutcome, AppError> {
        Ok(FailOutcome::Exhausted { attempts: 0 })
    }

    async fn retry_failed(&self, _job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        Ok(None)
    }

    async fn get_job(&self, _job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        Ok(None)
    }

    async fn list_jobs(
        &self,
        _status: Option<JobStatus>,
        _limit: usize,
    ) -> Result<Vec<ScrapeJob>, AppError> {
        Ok(vec![])
    }

    async fn release_worker_jobs(&self, _worker_id: &str) -> Result<u64, AppError> {
        Ok(0)
    }

    async fn count_by_status(&self, _status: JobStatus) -> Result<i64, AppError> {
        Ok(0)
    }
}

/// Claim jobs for `worker_id` as a stream.
///
/// Polls the queue every `poll_interval` while it is idle, backs off twice as
/// long after a claim error, and ends once `cancel_token` fires. The next
/// claim is only issued when the consumer asks for the next item, so a
/// worker that processes each job before polling again holds at most one
/// lease at a time.
pub fn consume<Q: JobQueue>(
    queue: Q,
    worker_id: String,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> impl Stream<Item = ScrapeJob> + Send {
    futures::stream::unfold(
        (queue, worker_id, cancel_token),
        move |(queue, worker_id, cancel_token)| async move {
            loop {
                if cancel_token.is_cancelled() {
                    return None;
                }

                tracing::debug!(%worker_id, "Polling for jobs");
                let pause = match queue.claim(&worker_id).await {
                    Ok(Some(job)) => return Some((job, (queue, worker_id, cancel_token))),
                    Ok(None) => poll_interval,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to claim job");
                        poll_interval * 2
                    }
                };

                tokio::select! {
                    () = tokio::time::sleep(pause) => {}
                    () = cancel_token.cancelled() => return None,
                }
            }
        },
    )
}
