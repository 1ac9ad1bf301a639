use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::job::{EnqueueOutcome, FailOutcome, ScrapeJob, WorkerConfig};
use crate::job_queue::{JobQueue, consume};
use crate::politeness::PolitenessDelay;
use crate::resource::{ExtractedRecord, ResourceKind, ResourceRef, is_locator_allowed};
use crate::staleness::{Clock, SystemClock};
use crate::traits::{CatalogStore, Extractor};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    JobClaimed {
        job: &'a ScrapeJob,
    },
    JobStarted {
        job_id: &'a str,
        kind: ResourceKind,
        locator: &'a str,
    },
    JobCompleted {
        job_id: &'a str,
        records: usize,
        children_enqueued: usize,
    },
    JobFailed {
        job_id: &'a str,
        error: &'a str,
        transient: bool,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, kind = %job.kind, attempts = job.attempts, "Job claimed");
            }
            WorkerEvent::JobStarted {
                job_id,
                kind,
                locator,
            } => {
                tracing::info!(%job_id, %kind, %locator, "Processing job");
            }
            WorkerEvent::JobCompleted {
                job_id,
                records,
                children_enqueued,
            } => {
                tracing::info!(%job_id, records, children_enqueued, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                transient,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, transient, will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Where a claimed job ended up after one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Records stored, children enqueued, job acked.
    Succeeded {
        records: usize,
        children_enqueued: usize,
    },
    /// Rescheduled with backoff.
    Retrying { attempt: u32, delay: Duration },
    /// Attempts exhausted; kept in `failed` state.
    Failed { attempts: u32 },
    /// The queue could not record the outcome. The job is redelivered once
    /// its lease expires.
    Unacknowledged,
    /// The lease expired and the job changed hands before the outcome was
    /// recorded; the outcome is discarded.
    LeaseLost,
}

/// Worker that consumes scrape jobs, stores what they extract and fans
/// out the next level of the hierarchy.
pub struct WorkerService<Q, E, S, C = SystemClock>
where
    Q: JobQueue,
    E: Extractor,
    S: CatalogStore,
    C: Clock,
{
    queue: Q,
    extractor: E,
    store: S,
    clock: C,
    politeness: PolitenessDelay,
    config: WorkerConfig,
}

impl<Q, E, S, C> WorkerService<Q, E, S, C>
where
    Q: JobQueue,
    E: Extractor,
    S: CatalogStore,
    C: Clock,
{
    pub fn new(queue: Q, extractor: E, store: S, clock: C, config: WorkerConfig) -> Self {
        Self {
            queue,
            extractor,
            store,
            clock,
            politeness: PolitenessDelay::new(config.min_delay, config.max_delay),
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the worker loop until cancellation.
    ///
    /// Jobs are processed one at a time. A job that is mid-flight when the
    /// token fires is finished before the loop exits; anything still leased
    /// to this worker afterwards is released back to the queue.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        let jobs = consume(
            self.queue.clone(),
            self.config.worker_id.clone(),
            self.config.poll_interval,
            cancel_token,
        );
        futures::pin_mut!(jobs);

        while let Some(job) = jobs.next().await {
            reporter.report(WorkerEvent::JobClaimed { job: &job });
            self.process_job(&job, reporter).await;
        }

        // Graceful shutdown: release all claimed jobs
        let released = match self.queue.release_worker_jobs(&self.config.worker_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(worker_id = %self.config.worker_id, error = %e, "Failed to release jobs");
                0
            }
        };

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    /// Process one claimed job to completion, retry or failure.
    pub async fn process_job<WR: WorkerReporter>(&self, job: &ScrapeJob, reporter: &WR) -> JobState {
        reporter.report(WorkerEvent::JobStarted {
            job_id: &job.id,
            kind: job.kind,
            locator: &job.locator,
        });

        self.politeness.wait().await;

        let result = match self.extract(job).await {
            Ok(records) => self.persist(job, records).await,
            Err(e) => Err(e),
        };

        match result {
            Ok((records, children_enqueued)) => {
                if let Err(e) = self.queue.ack(&job.id, &self.config.worker_id).await {
                    return self.unrecorded(job, &e, "Failed to ack job");
                }
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: &job.id,
                    records,
                    children_enqueued,
                });
                JobState::Succeeded {
                    records,
                    children_enqueued,
                }
            }
            Err(e) => self.handle_failure(job, &e, reporter).await,
        }
    }

    async fn extract(&self, job: &ScrapeJob) -> Result<Vec<ExtractedRecord>, AppError> {
        let timeout = self.config.job_timeout;
        match tokio::time::timeout(timeout, self.extractor.extract(job.kind, &job.locator)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    /// Store every record with a fresh timestamp, then enqueue the next
    /// level for up to the fan-out limit of allowed locators.
    async fn persist(
        &self,
        job: &ScrapeJob,
        records: Vec<ExtractedRecord>,
    ) -> Result<(usize, usize), AppError> {
        let scraped_at = self.clock.now();
        let limit = self.config.fan_out.for_parent(job.kind);
        let mut children = Vec::new();

        for mut record in records.iter().cloned() {
            if record.parent_id.is_none() {
                record.parent_id = job.parent_id.clone();
            }
            let id = self.store.upsert(&record, scraped_at).await?;

            let Some(child_kind) = record.kind.child() else {
                continue;
            };
            if children.len() >= limit {
                continue;
            }
            if !is_locator_allowed(&record.locator) {
                tracing::debug!(locator = %record.locator, "Skipping disallowed locator");
                continue;
            }
            children.push(ResourceRef::new(child_kind, record.locator).with_parent(id));
        }

        let mut enqueued = 0;
        for child in children {
            let job = ScrapeJob::new(child, self.config.max_attempts);
            match self.queue.enqueue(job).await {
                Ok(EnqueueOutcome::Enqueued) => enqueued += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to enqueue child job");
                }
            }
        }

        Ok((records.len(), enqueued))
    }

    async fn handle_failure<WR: WorkerReporter>(
        &self,
        job: &ScrapeJob,
        error: &AppError,
        reporter: &WR,
    ) -> JobState {
        let message = error.to_string();
        let transient = error.is_retryable();
        if transient {
            tracing::warn!(job_id = %job.id, error = %message, "Transient scrape failure");
        } else {
            tracing::warn!(job_id = %job.id, error = %message, "Permanent scrape failure");
        }

        match self
            .queue
            .fail(&job.id, &self.config.worker_id, &message)
            .await
        {
            Ok(outcome) => {
                reporter.report(WorkerEvent::JobFailed {
                    job_id: &job.id,
                    error: &message,
                    transient,
                    will_retry: outcome.will_retry(),
                });
                match outcome {
                    FailOutcome::Retrying { attempt, delay } => {
                        JobState::Retrying { attempt, delay }
                    }
                    FailOutcome::Exhausted { attempts } => {
                        tracing::error!(job_id = %job.id, attempts, "Job exhausted retries");
                        JobState::Failed { attempts }
                    }
                }
            }
            Err(e) => self.unrecorded(job, &e, "Failed to mark job as failed"),
        }
    }

    fn unrecorded(&self, job: &ScrapeJob, error: &AppError, context: &str) -> JobState {
        if let AppError::LeaseLost { .. } = error {
            tracing::warn!(
                job_id = %job.id,
                worker_id = %self.config.worker_id,
                "Lease lost before the outcome was recorded"
            );
            return JobState::LeaseLost;
        }
        tracing::error!(job_id = %job.id, error = %error, "{context}");
        JobState::Unacknowledged
    }
}
