//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AppError;
use crate::job::{EnqueueOutcome, FailOutcome, JobStatus, RetryPolicy, ScrapeJob};
use crate::job_queue::JobQueue;
use crate::resource::{
    CollectionFreshness, EntityFreshness, ExtractedRecord, ResourceKind, ResourceRef,
};
use crate::traits::{CatalogStore, Extractor};

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that pops one queued response per call.
#[derive(Clone)]
pub struct MockExtractor {
    responses: Arc<Mutex<Vec<Result<Vec<ExtractedRecord>, AppError>>>>,
    delay: Duration,
    pub calls: Arc<Mutex<Vec<(ResourceKind, String)>>>,
}

impl MockExtractor {
    pub fn new(records: Vec<ExtractedRecord>) -> Self {
        Self::with_responses(vec![Ok(records)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<Vec<ExtractedRecord>, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Extractor for MockExtractor {
    async fn extract(
        &self,
        kind: ResourceKind,
        locator: &str,
    ) -> Result<Vec<ExtractedRecord>, AppError> {
        self.calls.lock().unwrap().push((kind, locator.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(vec![])
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub kind: ResourceKind,
    pub id: String,
    pub locator: String,
    pub parent_id: Option<String>,
    pub source_id: Option<String>,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// In-memory catalog store.
#[derive(Clone)]
pub struct MockStore {
    pub entities: Arc<Mutex<Vec<StoredEntity>>>,
    read_error: Arc<Mutex<Option<AppError>>>,
    upsert_error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    pub fn empty() -> Self {
        Self {
            entities: Arc::new(Mutex::new(Vec::new())),
            read_error: Arc::new(Mutex::new(None)),
            upsert_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Store whose next read fails.
    pub fn with_read_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.read_error.lock().unwrap() = Some(error);
        store
    }

    /// Store whose next upsert fails.
    pub fn with_upsert_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.upsert_error.lock().unwrap() = Some(error);
        store
    }

    pub fn insert(
        &self,
        kind: ResourceKind,
        id: &str,
        locator: &str,
        parent_id: Option<&str>,
        last_scraped_at: Option<DateTime<Utc>>,
    ) {
        self.entities.lock().unwrap().push(StoredEntity {
            kind,
            id: id.to_string(),
            locator: locator.to_string(),
            parent_id: parent_id.map(str::to_string),
            source_id: None,
            last_scraped_at,
        });
    }

    pub fn find_by_locator(&self, kind: ResourceKind, locator: &str) -> Option<StoredEntity> {
        self.entities
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == kind && e.locator == locator)
            .cloned()
    }

    fn take_read_error(&self) -> Result<(), AppError> {
        match self.read_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl CatalogStore for MockStore {
    async fn get_freshness(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<EntityFreshness>, AppError> {
        self.take_read_error()?;
        let entities = self.entities.lock().unwrap();
        Ok(entities
            .iter()
            .find(|e| e.kind == kind && (e.id == id || e.source_id.as_deref() == Some(id)))
            .map(|e| EntityFreshness {
                id: e.id.clone(),
                locator: e.locator.clone(),
                last_scraped_at: e.last_scraped_at,
            }))
    }

    async fn collection_freshness(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<CollectionFreshness, AppError> {
        self.take_read_error()?;
        let entities = self.entities.lock().unwrap();
        Ok(CollectionFreshness::from_members(
            entities
                .iter()
                .filter(|e| e.kind == kind)
                .filter(|e| kind == ResourceKind::Navigation || e.parent_id.as_deref() == parent_id)
                .map(|e| e.last_scraped_at),
        ))
    }

    async fn upsert(
        &self,
        record: &ExtractedRecord,
        scraped_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        if let Some(e) = self.upsert_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut entities = self.entities.lock().unwrap();
        if let Some(existing) = entities
            .iter_mut()
            .find(|e| e.kind == record.kind && e.locator == record.locator)
        {
            existing.last_scraped_at = Some(scraped_at);
            if record.parent_id.is_some() {
                existing.parent_id = record.parent_id.clone();
            }
            if record.source_id.is_some() {
                existing.source_id = record.source_id.clone();
            }
            return Ok(existing.id.clone());
        }
        let id = format!("{}-{}", record.kind, entities.len() + 1);
        entities.push(StoredEntity {
            kind: record.kind,
            id: id.clone(),
            locator: record.locator.clone(),
            parent_id: record.parent_id.clone(),
            source_id: record.source_id.clone(),
            last_scraped_at: Some(scraped_at),
        });
        Ok(id)
    }

    async fn count_by_kind(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<i64, AppError> {
        self.take_read_error()?;
        let entities = self.entities.lock().unwrap();
        Ok(entities
            .iter()
            .filter(|e| e.kind == kind)
            .filter(|e| parent_id.is_none() || e.parent_id.as_deref() == parent_id)
            .count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (job_id, error_message, outcome).
pub type FailedJobRecord = (String, String, FailOutcome);

/// In-memory job queue with the same dedup, lease and retry semantics as the
/// PostgreSQL queue.
#[derive(Clone)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<ScrapeJob>>>,
    retry: RetryPolicy,
    lease: TimeDelta,
    claim_error: Arc<Mutex<Option<AppError>>>,
    enqueue_error: Arc<Mutex<Option<AppError>>>,
    pub acked: Arc<Mutex<Vec<String>>>,
    pub failed_jobs: Arc<Mutex<Vec<FailedJobRecord>>>,
    pub released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            retry: RetryPolicy::default(),
            lease: TimeDelta::minutes(5),
            claim_error: Arc::new(Mutex::new(None)),
            enqueue_error: Arc::new(Mutex::new(None)),
            acked: Arc::new(Mutex::new(Vec::new())),
            failed_jobs: Arc::new(Mutex::new(Vec::new())),
            released_workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue with one pending job ready to be claimed.
    pub fn with_job(job: ScrapeJob) -> Self {
        let queue = Self::empty();
        queue.jobs.lock().unwrap().push(job);
        queue
    }

    pub fn with_claim_error(error: AppError) -> Self {
        let queue = Self::empty();
        *queue.claim_error.lock().unwrap() = Some(error);
        queue
    }

    pub fn with_enqueue_error(error: AppError) -> Self {
        let queue = Self::empty();
        *queue.enqueue_error.lock().unwrap() = Some(error);
        queue
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lease(mut self, lease: TimeDelta) -> Self {
        self.lease = lease;
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(&self, job: ScrapeJob) -> Result<EnqueueOutcome, AppError> {
        if let Some(e) = self.enqueue_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|j| j.id == job.id) {
            return Ok(EnqueueOutcome::Deduplicated);
        }
        jobs.push(job);
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        if let Some(e) = self.claim_error.lock().unwrap().take() {
            return Err(e);
        }
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter_mut().find(|j| j.is_due(now)).map(|job| {
            job.status = JobStatus::Running;
            job.worker_id = Some(worker_id.to_string());
            job.leased_until = Some(now + self.lease);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn ack(&self, job_id: &str, worker_id: &str) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let index = jobs
            .iter()
            .position(|j| j.id == job_id && holds_lease(j, worker_id))
            .ok_or_else(|| lease_lost(job_id, worker_id))?;
        jobs.remove(index);
        self.acked.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> Result<FailOutcome, AppError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| AppError::NotFound {
                kind: "job",
                id: job_id.to_string(),
            })?;
        if !holds_lease(job, worker_id) {
            return Err(lease_lost(job_id, worker_id));
        }

        let outcome = self.retry.on_failure(job.attempts, job.max_attempts);
        match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                job.attempts = attempt;
                job.status = JobStatus::Pending;
                job.next_run_at = Some(now + to_time_delta(delay));
            }
            FailOutcome::Exhausted { attempts } => {
                job.attempts = attempts;
                job.status = JobStatus::Failed;
                job.next_run_at = None;
            }
        }
        job.worker_id = None;
        job.leased_until = None;
        job.last_error = Some(error.to_string());
        job.updated_at = now;

        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id.to_string(), error.to_string(), outcome));
        Ok(outcome)
    }

    async fn retry_failed(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Failed)
            .map(|job| {
                job.status = JobStatus::Pending;
                job.attempts = 0;
                job.next_run_at = None;
                job.updated_at = Utc::now();
                job.clone()
            }))
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ScrapeJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.leased_until = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }
}

fn holds_lease(job: &ScrapeJob, worker_id: &str) -> bool {
    job.status == JobStatus::Running && job.worker_id.as_deref() == Some(worker_id)
}

fn lease_lost(job_id: &str, worker_id: &str) -> AppError {
    AppError::LeaseLost {
        job_id: job_id.to_string(),
        worker_id: worker_id.to_string(),
    }
}

/// Convert a std duration to a chrono delta, saturating on overflow.
fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        use crate::worker::WorkerEvent;
        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobStarted { .. } => "JobStarted",
            WorkerEvent::JobCompleted { .. } => "JobCompleted",
            WorkerEvent::JobFailed { .. } => "JobFailed",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a pending job for a target.
pub fn make_test_job(kind: ResourceKind, locator: &str) -> ScrapeJob {
    ScrapeJob::new(ResourceRef::new(kind, locator), 3)
}

/// Retry policy without backoff, so failed jobs are immediately claimable.
pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        multiplier: 2.0,
        max_delay: Duration::ZERO,
    }
}

/// Wait until background tasks have put at least `n` jobs on the queue.
pub async fn wait_for_jobs(queue: &MockJobQueue, n: usize) -> Vec<ScrapeJob> {
    for _ in 0..200 {
        if queue.len() >= n {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    queue.list_jobs(None, usize::MAX).await.unwrap_or_default()
}
