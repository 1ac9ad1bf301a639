//! Scrape-freshness and job-dispatch core for Freshet.
//!
//! Decides whether a level of the navigation → category → product hierarchy
//! needs a background re-scrape, and dispatches that scrape through an
//! idempotent, retrying [`JobQueue`](job_queue::JobQueue).

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod job;
pub mod job_queue;
pub mod politeness;
pub mod resource;
pub mod staleness;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use bootstrap::{BootstrapOutcome, BootstrapTrigger};
pub use config::ScrapeConfig;
pub use coordinator::{RefreshScope, ScrapeCoordinator, TriggerOutcome, TriggerReason};
pub use error::AppError;
pub use identity::{compute_hash, derive_id, normalize_locator};
pub use job::{
    EnqueueOutcome, FailOutcome, FanOutLimits, JobStatus, RetryPolicy, ScrapeJob, WorkerConfig,
};
pub use job_queue::{DisabledQueue, JobQueue, consume};
pub use politeness::PolitenessDelay;
pub use resource::{
    CollectionFreshness, EntityFreshness, ExtractedRecord, Locators, ResourceKind, ResourceRef,
};
pub use staleness::{Clock, FixedClock, StalenessPolicy, StalenessThresholds, SystemClock};
pub use traits::{CatalogStore, Extractor, Fetcher};
pub use worker::{JobState, TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerService};
