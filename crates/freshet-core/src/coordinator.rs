use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::job::{EnqueueOutcome, ScrapeJob};
use crate::job_queue::JobQueue;
use crate::resource::{EntityFreshness, Locators, ResourceKind, ResourceRef};
use crate::staleness::{Assessment, Clock, StalenessPolicy, SystemClock};
use crate::traits::CatalogStore;

/// What a read path is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// The top-level navigation collection.
    Navigation,
    /// Categories listed under one navigation item.
    Categories { navigation_id: String },
    /// Products listed under one category.
    Products { category_id: String },
    /// One product page, by store id or source id.
    ProductPage { product_id: String },
}

impl RefreshScope {
    /// Kind of the records a refresh of this scope produces.
    pub fn kind(&self) -> ResourceKind {
        match self {
            RefreshScope::Navigation => ResourceKind::Navigation,
            RefreshScope::Categories { .. } => ResourceKind::Category,
            RefreshScope::Products { .. } | RefreshScope::ProductPage { .. } => {
                ResourceKind::Product
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Empty,
    Stale,
    Fresh,
    QueueDisabled,
}

/// Result of a refresh decision, as reported to trigger callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOutcome {
    pub triggered: bool,
    pub reason: TriggerReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Decides, from the read path, whether a scope needs a re-scrape and
/// enqueues it if so. Never waits for the scrape itself.
#[derive(Clone)]
pub struct ScrapeCoordinator<Q, S, C = SystemClock>
where
    Q: JobQueue,
    S: CatalogStore,
    C: Clock,
{
    queue: Q,
    store: S,
    policy: StalenessPolicy<C>,
    locators: Locators,
    max_attempts: u32,
}

impl<Q, S, C> ScrapeCoordinator<Q, S, C>
where
    Q: JobQueue,
    S: CatalogStore,
    C: Clock,
{
    pub fn new(
        queue: Q,
        store: S,
        policy: StalenessPolicy<C>,
        locators: Locators,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            store,
            policy,
            locators,
            max_attempts,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn locators(&self) -> &Locators {
        &self.locators
    }

    /// Evaluate `scope` and enqueue a scrape when it is empty or stale.
    ///
    /// Store errors are returned; queue errors degrade to a logged no-op and
    /// are reported as [`TriggerReason::QueueDisabled`].
    pub async fn refresh(&self, scope: RefreshScope) -> Result<TriggerOutcome, AppError> {
        let (assessment, target) = self.evaluate(&scope).await?;
        let age_hours = assessment.age_hours().map(round_hours);

        if !assessment.needs_refresh() {
            tracing::debug!(?scope, ?age_hours, "Fresh, skipping scrape");
            return Ok(TriggerOutcome {
                triggered: false,
                reason: TriggerReason::Fresh,
                age_hours,
                job_id: None,
            });
        }

        let reason = match assessment {
            Assessment::Empty => TriggerReason::Empty,
            _ => TriggerReason::Stale,
        };
        tracing::info!(?scope, ?reason, ?age_hours, locator = %target.locator, "Scrape due");

        let (outcome, job_id) = self.enqueue(target).await;
        let (triggered, reason) = match outcome {
            EnqueueOutcome::Enqueued | EnqueueOutcome::Deduplicated => (true, reason),
            EnqueueOutcome::Disabled => (false, TriggerReason::QueueDisabled),
        };

        Ok(TriggerOutcome {
            triggered,
            reason,
            age_hours,
            job_id: triggered.then_some(job_id),
        })
    }

    /// Fire-and-forget [`refresh`](Self::refresh) for read paths.
    ///
    /// Returns immediately; the decision runs on a spawned task whose errors
    /// are only logged. Returns `None` without spawning when the queue is
    /// disabled.
    pub fn maybe_refresh(&self, scope: RefreshScope) -> Option<JoinHandle<()>> {
        if !self.queue.is_enabled() {
            tracing::debug!(?scope, "Scrape queue disabled, skipping refresh check");
            return None;
        }

        let this = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = this.refresh(scope.clone()).await {
                tracing::warn!(?scope, error = %e, "Refresh check failed");
            }
        }))
    }

    /// Read path for a single product.
    ///
    /// A missing product still gets a scrape of its canonical page enqueued
    /// in the background before `NotFound` is returned; a stale one gets its
    /// own page refreshed. Neither enqueue is awaited.
    pub async fn read_product(&self, product_id: &str) -> Result<EntityFreshness, AppError> {
        match self
            .store
            .get_freshness(ResourceKind::Product, product_id)
            .await?
        {
            None => {
                let target =
                    ResourceRef::new(ResourceKind::Product, self.locators.product(product_id));
                self.dispatch(target);
                Err(AppError::NotFound {
                    kind: ResourceKind::Product.as_str(),
                    id: product_id.to_string(),
                })
            }
            Some(entity) => {
                if self
                    .policy
                    .is_stale(ResourceKind::Product, entity.last_scraped_at)
                {
                    self.dispatch(ResourceRef::new(
                        ResourceKind::Product,
                        entity.locator.clone(),
                    ));
                }
                Ok(entity)
            }
        }
    }

    pub async fn trigger_navigation_scrape(&self) -> Result<TriggerOutcome, AppError> {
        self.refresh(RefreshScope::Navigation).await
    }

    pub async fn trigger_category_scrape(
        &self,
        navigation_id: &str,
    ) -> Result<TriggerOutcome, AppError> {
        self.refresh(RefreshScope::Categories {
            navigation_id: navigation_id.to_string(),
        })
        .await
    }

    pub async fn trigger_product_scrape(
        &self,
        category_id: &str,
    ) -> Result<TriggerOutcome, AppError> {
        self.refresh(RefreshScope::Products {
            category_id: category_id.to_string(),
        })
        .await
    }

    async fn evaluate(&self, scope: &RefreshScope) -> Result<(Assessment, ResourceRef), AppError> {
        let kind = scope.kind();
        match scope {
            RefreshScope::Navigation => {
                let collection = self.store.collection_freshness(kind, None).await?;
                let target = ResourceRef::new(kind, self.locators.root());
                Ok((self.policy.assess(kind, &collection), target))
            }
            RefreshScope::Categories { navigation_id } => {
                let collection = self
                    .store
                    .collection_freshness(kind, Some(navigation_id))
                    .await?;
                let locator = self
                    .parent_locator(ResourceKind::Navigation, navigation_id)
                    .await?;
                let target = ResourceRef::new(kind, locator).with_parent(navigation_id.as_str());
                Ok((self.policy.assess(kind, &collection), target))
            }
            RefreshScope::Products { category_id } => {
                let collection = self
                    .store
                    .collection_freshness(kind, Some(category_id))
                    .await?;
                let locator = self
                    .parent_locator(ResourceKind::Category, category_id)
                    .await?;
                let target = ResourceRef::new(kind, locator).with_parent(category_id.as_str());
                Ok((self.policy.assess(kind, &collection), target))
            }
            RefreshScope::ProductPage { product_id } => {
                match self.store.get_freshness(kind, product_id).await? {
                    Some(entity) => Ok((
                        self.policy.assess_entity(kind, Some(entity.last_scraped_at)),
                        ResourceRef::new(kind, entity.locator),
                    )),
                    None => Ok((
                        Assessment::Empty,
                        ResourceRef::new(kind, self.locators.product(product_id)),
                    )),
                }
            }
        }
    }

    /// Locator of the page listing a parent's children: the parent's stored
    /// locator, or the canonical one when the parent is not stored yet.
    async fn parent_locator(&self, kind: ResourceKind, id: &str) -> Result<String, AppError> {
        let stored = self.store.get_freshness(kind, id).await?;
        Ok(match stored {
            Some(entity) => entity.locator,
            None => match kind {
                ResourceKind::Navigation => self.locators.navigation(id),
                _ => self.locators.category(id),
            },
        })
    }

    async fn enqueue(&self, target: ResourceRef) -> (EnqueueOutcome, String) {
        let job = ScrapeJob::new(target, self.max_attempts);
        let job_id = job.id.clone();
        let (kind, locator) = (job.kind, job.locator.clone());

        let outcome = match self.queue.enqueue(job).await {
            Ok(EnqueueOutcome::Enqueued) => {
                tracing::info!(%job_id, %kind, %locator, "Scrape job enqueued");
                EnqueueOutcome::Enqueued
            }
            Ok(EnqueueOutcome::Deduplicated) => {
                tracing::debug!(%job_id, %kind, "Scrape job already present");
                EnqueueOutcome::Deduplicated
            }
            Ok(EnqueueOutcome::Disabled) => EnqueueOutcome::Disabled,
            Err(e) => {
                tracing::warn!(%job_id, %kind, error = %e, "Enqueue failed, continuing without scrape");
                EnqueueOutcome::Disabled
            }
        };
        (outcome, job_id)
    }

    fn dispatch(&self, target: ResourceRef) {
        if !self.queue.is_enabled() {
            tracing::debug!(locator = %target.locator, "Scrape queue disabled, skipping enqueue");
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.enqueue(target).await;
        });
    }
}

fn round_hours(hours: f64) -> f64 {
    (hours * 10.0).round() / 10.0
}
