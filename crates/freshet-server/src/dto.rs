use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freshet_core::job::ScrapeJob;
use freshet_core::resource::EntityFreshness;
use freshet_core::{TriggerOutcome, TriggerReason};

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub triggered: bool,
    /// One of `empty`, `stale`, `fresh`, `queue_disabled`.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl From<TriggerOutcome> for TriggerResponse {
    fn from(outcome: TriggerOutcome) -> Self {
        let reason = match outcome.reason {
            TriggerReason::Empty => "empty",
            TriggerReason::Stale => "stale",
            TriggerReason::Fresh => "fresh",
            TriggerReason::QueueDisabled => "queue_disabled",
        };
        Self {
            triggered: outcome.triggered,
            reason: reason.to_string(),
            age_hours: outcome.age_hours,
            job_id: outcome.job_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductFreshnessResponse {
    pub id: String,
    pub locator: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

impl From<EntityFreshness> for ProductFreshnessResponse {
    fn from(entity: EntityFreshness) -> Self {
        Self {
            id: entity.id,
            locator: entity.locator,
            last_scraped_at: entity.last_scraped_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub kind: String,
    pub locator: String,
    pub parent_id: Option<String>,
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub leased_until: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
}

impl From<ScrapeJob> for JobResponse {
    fn from(job: ScrapeJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind.to_string(),
            locator: job.locator,
            parent_id: job.parent_id,
            status: job.status.to_string(),
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            next_run_at: job.next_run_at,
            leased_until: job.leased_until,
            worker_id: job.worker_id,
            last_error: job.last_error,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsQuery {
    /// `pending`, `running` or `failed`.
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    /// `postgres` or `disabled`.
    pub queue: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
