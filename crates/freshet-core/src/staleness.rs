//! TTL-based staleness decisions.
//!
//! Every "is it time to re-scrape?" question in Freshet goes through
//! [`StalenessPolicy`]. The policy is pure: it reads the current time from an
//! injected [`Clock`] and never touches storage, so tests pin `now` with a
//! [`FixedClock`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

use crate::resource::{CollectionFreshness, ResourceKind};

/// Source of the current time.
pub trait Clock: Send + Sync + Clone + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant, shared between clones.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-kind time-to-live, in hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StalenessThresholds {
    pub navigation_hours: f64,
    pub category_hours: f64,
    pub product_hours: f64,
}

impl Default for StalenessThresholds {
    fn default() -> Self {
        Self {
            navigation_hours: 24.0,
            category_hours: 24.0,
            product_hours: 12.0,
        }
    }
}

impl StalenessThresholds {
    pub fn for_kind(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Navigation => self.navigation_hours,
            ResourceKind::Category => self.category_hours,
            ResourceKind::Product => self.product_hours,
        }
    }
}

/// Outcome of assessing a collection (or a single entity).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    /// Nothing stored yet.
    Empty,
    /// Re-scrape due. `age_hours` is `None` when no member was ever scraped.
    Stale { age_hours: Option<f64> },
    Fresh { age_hours: f64 },
}

impl Assessment {
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Assessment::Fresh { .. })
    }

    pub fn age_hours(&self) -> Option<f64> {
        match self {
            Assessment::Empty => None,
            Assessment::Stale { age_hours } => *age_hours,
            Assessment::Fresh { age_hours } => Some(*age_hours),
        }
    }
}

/// Decides whether a resource needs a re-scrape.
#[derive(Debug, Clone)]
pub struct StalenessPolicy<C: Clock = SystemClock> {
    thresholds: StalenessThresholds,
    clock: C,
}

impl Default for StalenessPolicy<SystemClock> {
    fn default() -> Self {
        Self::new(StalenessThresholds::default(), SystemClock)
    }
}

impl<C: Clock> StalenessPolicy<C> {
    pub fn new(thresholds: StalenessThresholds, clock: C) -> Self {
        Self { thresholds, clock }
    }

    pub fn thresholds(&self) -> &StalenessThresholds {
        &self.thresholds
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Hours elapsed since `freshness`, measured against the injected clock.
    pub fn age_hours(&self, freshness: DateTime<Utc>) -> f64 {
        let age = self.clock.now() - freshness;
        age.num_milliseconds() as f64 / 3_600_000.0
    }

    /// A never-scraped resource is always stale.
    pub fn is_stale(&self, kind: ResourceKind, freshness: Option<DateTime<Utc>>) -> bool {
        match freshness {
            None => true,
            Some(ts) => self.age_hours(ts) > self.thresholds.for_kind(kind),
        }
    }

    /// True when the collection is empty or its most recently scraped member
    /// is stale.
    pub fn should_refresh_collection<I>(&self, kind: ResourceKind, members: I) -> bool
    where
        I: IntoIterator<Item = Option<DateTime<Utc>>>,
    {
        self.assess(kind, &CollectionFreshness::from_members(members))
            .needs_refresh()
    }

    pub fn assess(&self, kind: ResourceKind, collection: &CollectionFreshness) -> Assessment {
        if collection.count == 0 {
            return Assessment::Empty;
        }
        match collection.latest {
            None => Assessment::Stale { age_hours: None },
            Some(ts) => {
                let age_hours = self.age_hours(ts);
                if self.is_stale(kind, Some(ts)) {
                    Assessment::Stale {
                        age_hours: Some(age_hours),
                    }
                } else {
                    Assessment::Fresh { age_hours }
                }
            }
        }
    }

    /// Assess a single entity. A missing entity is reported as `Empty`.
    pub fn assess_entity(
        &self,
        kind: ResourceKind,
        entity: Option<Option<DateTime<Utc>>>,
    ) -> Assessment {
        match entity {
            None => Assessment::Empty,
            Some(last) => self.assess(
                kind,
                &CollectionFreshness {
                    count: 1,
                    latest: last,
                },
            ),
        }
    }
}
