use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::job::{EnqueueOutcome, ScrapeJob};
use crate::job_queue::JobQueue;
use crate::resource::{Locators, ResourceKind, ResourceRef};
use crate::traits::CatalogStore;

/// What a startup bootstrap run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The root navigation scrape was submitted.
    Seeded(EnqueueOutcome),
    /// Navigation already has this many rows.
    AlreadySeeded { count: i64 },
    QueueDisabled,
    /// The emptiness check or the enqueue failed; logged and ignored.
    Skipped,
    /// This trigger already ran in the current process.
    AlreadyRan,
}

/// Seeds the crawl at startup: enqueues the root navigation scrape when the
/// store has no navigation yet.
///
/// Runs at most once per instance. Failures never propagate, so a broken
/// store or queue cannot keep the process from starting.
#[derive(Clone)]
pub struct BootstrapTrigger<Q: JobQueue, S: CatalogStore> {
    queue: Q,
    store: S,
    locators: Locators,
    max_attempts: u32,
    done: Arc<AtomicBool>,
}

impl<Q: JobQueue, S: CatalogStore> BootstrapTrigger<Q, S> {
    pub fn new(queue: Q, store: S, locators: Locators, max_attempts: u32) -> Self {
        Self {
            queue,
            store,
            locators,
            max_attempts,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run_once(&self) -> BootstrapOutcome {
        if self.done.swap(true, Ordering::SeqCst) {
            return BootstrapOutcome::AlreadyRan;
        }

        if !self.queue.is_enabled() {
            tracing::info!("Scrape queue disabled, skipping bootstrap");
            return BootstrapOutcome::QueueDisabled;
        }

        let count = match self.store.count_by_kind(ResourceKind::Navigation, None).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Bootstrap check failed");
                return BootstrapOutcome::Skipped;
            }
        };

        if count > 0 {
            tracing::info!(count, "Navigation already present, skipping bootstrap");
            return BootstrapOutcome::AlreadySeeded { count };
        }

        let target = ResourceRef::new(ResourceKind::Navigation, self.locators.root());
        let job = ScrapeJob::new(target, self.max_attempts);
        let job_id = job.id.clone();

        match self.queue.enqueue(job).await {
            Ok(outcome) => {
                tracing::info!(%job_id, ?outcome, "Navigation empty, bootstrap scrape submitted");
                BootstrapOutcome::Seeded(outcome)
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Bootstrap enqueue failed");
                BootstrapOutcome::Skipped
            }
        }
    }
}
