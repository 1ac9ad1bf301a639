use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::derive_id;
use crate::resource::{ResourceKind, ResourceRef};

/// Status of a scrape job in the queue.
///
/// Successful jobs are deleted on ack, so there is no `completed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay for the n-th failure (1-indexed) is `base_delay * multiplier^(n-1)`,
/// capped at `max_delay`: 2s, 4s, 8s, 10s, 10s… with the defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next delivery, after `attempt` failures (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Decide what happens to a job that has just failed, given how many
    /// attempts it had used *before* this failure.
    pub fn on_failure(&self, attempts_before: u32, max_attempts: u32) -> FailOutcome {
        let attempt = attempts_before + 1;
        if attempt < max_attempts {
            FailOutcome::Retrying {
                attempt,
                delay: self.delay_for_attempt(attempt),
            }
        } else {
            FailOutcome::Exhausted { attempts: attempt }
        }
    }
}

/// Result of submitting a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job with the same id is already pending, running or kept as failed.
    Deduplicated,
    /// The queue is disabled (or its transport is unreachable).
    Disabled,
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempt: u32, delay: Duration },
    /// Attempts used up; the job is kept in `failed` state for inspection.
    Exhausted { attempts: u32 },
}

impl FailOutcome {
    pub fn will_retry(&self) -> bool {
        matches!(self, FailOutcome::Retrying { .. })
    }
}

/// A scrape job in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    /// Deterministic hash of kind + normalized locator.
    pub id: String,
    pub kind: ResourceKind,
    pub locator: String,
    pub parent_id: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub leased_until: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
}

impl ScrapeJob {
    pub fn new(target: ResourceRef, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: derive_id(target.kind, &target.locator),
            kind: target.kind,
            locator: target.locator,
            parent_id: target.parent_id,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            created_at: now,
            updated_at: now,
            next_run_at: None,
            leased_until: None,
            worker_id: None,
            last_error: None,
        }
    }

    /// Whether a worker may claim this job at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => self.next_run_at.is_none_or(|at| at <= now),
            JobStatus::Running => self.leased_until.is_some_and(|until| until <= now),
            JobStatus::Failed => false,
        }
    }
}

/// Upper bound on child jobs spawned by one job, per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutLimits {
    /// Category jobs spawned from one navigation scrape.
    pub per_navigation: usize,
    /// Product jobs spawned from one category scrape.
    pub per_category: usize,
}

impl Default for FanOutLimits {
    fn default() -> Self {
        Self {
            per_navigation: 10,
            per_category: 50,
        }
    }
}

impl FanOutLimits {
    /// Limit for children of a job of `kind`.
    pub fn for_parent(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Navigation => self.per_navigation,
            ResourceKind::Category => self.per_category,
            ResourceKind::Product => 0,
        }
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Random pause before each extraction is drawn from `[min_delay, max_delay]`.
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on one extraction; exceeding it counts as a transient failure.
    pub job_timeout: Duration,
    pub fan_out: FanOutLimits,
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            min_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(5),
            job_timeout: Duration::from_secs(30),
            fan_out: FanOutLimits::default(),
            max_attempts: RetryPolicy::default().max_attempts,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_politeness(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOutLimits) -> Self {
        self.fan_out = fan_out;
        self
    }
}
