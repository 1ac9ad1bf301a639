use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::job::{FanOutLimits, RetryPolicy, WorkerConfig};
use crate::resource::Locators;
use crate::staleness::{Clock, StalenessPolicy, StalenessThresholds};

pub const DEFAULT_BASE_URL: &str = "https://www.worldofbooks.com/en-gb";

/// Scrape pipeline configuration shared by the server and the worker.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Only `SCRAPE_QUEUE_ENABLED=true` turns the durable queue on.
    pub queue_enabled: bool,
    pub base_url: String,
    pub retry: RetryPolicy,
    pub thresholds: StalenessThresholds,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub job_timeout: Duration,
    /// How long a claimed job stays invisible to other workers. Always longer
    /// than `job_timeout + max_delay`.
    pub lease: Duration,
    pub fan_out: FanOutLimits,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            queue_enabled: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            thresholds: StalenessThresholds::default(),
            min_delay: Duration::from_millis(3000),
            max_delay: Duration::from_millis(5000),
            job_timeout: Duration::from_millis(30_000),
            lease: Duration::from_secs(300),
            fan_out: FanOutLimits::default(),
        }
    }
}

impl ScrapeConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SCRAPE_QUEUE_ENABLED` (`true` to enable, anything else disables)
    /// - `SCRAPE_BASE_URL`
    /// - `SCRAPE_MAX_ATTEMPTS`, `SCRAPE_RETRY_BASE_DELAY_MS`,
    ///   `SCRAPE_RETRY_MULTIPLIER`, `SCRAPE_RETRY_MAX_DELAY_MS`
    /// - `SCRAPE_MIN_DELAY_MS`, `SCRAPE_MAX_DELAY_MS`, `SCRAPE_TIMEOUT_MS`,
    ///   `SCRAPE_LEASE_SECS`
    /// - `SCRAPE_MAX_CATEGORIES_PER_NAV`, `SCRAPE_MAX_PRODUCTS_PER_CATEGORY`
    /// - `SCRAPE_TTL_NAVIGATION_HOURS`, `SCRAPE_TTL_CATEGORY_HOURS`,
    ///   `SCRAPE_TTL_PRODUCT_HOURS`
    ///
    /// Every variable is optional; unset ones fall back to the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(lookup);

        let max_attempts: u32 = env.parse("SCRAPE_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(AppError::ConfigError(
                "SCRAPE_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let multiplier: f64 = env.parse("SCRAPE_RETRY_MULTIPLIER", defaults.retry.multiplier)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(AppError::ConfigError(format!(
                "Invalid SCRAPE_RETRY_MULTIPLIER '{multiplier}': must be at least 1"
            )));
        }

        let retry = RetryPolicy {
            max_attempts,
            base_delay: env.millis("SCRAPE_RETRY_BASE_DELAY_MS", defaults.retry.base_delay)?,
            multiplier,
            max_delay: env.millis("SCRAPE_RETRY_MAX_DELAY_MS", defaults.retry.max_delay)?,
        };

        let thresholds = StalenessThresholds {
            navigation_hours: env.hours(
                "SCRAPE_TTL_NAVIGATION_HOURS",
                defaults.thresholds.navigation_hours,
            )?,
            category_hours: env.hours(
                "SCRAPE_TTL_CATEGORY_HOURS",
                defaults.thresholds.category_hours,
            )?,
            product_hours: env.hours("SCRAPE_TTL_PRODUCT_HOURS", defaults.thresholds.product_hours)?,
        };

        let min_delay = env.millis("SCRAPE_MIN_DELAY_MS", defaults.min_delay)?;
        let max_delay = env.millis("SCRAPE_MAX_DELAY_MS", defaults.max_delay)?;
        if min_delay > max_delay {
            return Err(AppError::ConfigError(
                "SCRAPE_MIN_DELAY_MS must not exceed SCRAPE_MAX_DELAY_MS".into(),
            ));
        }

        let lease = Duration::from_secs(env.parse("SCRAPE_LEASE_SECS", defaults.lease.as_secs())?);
        if lease.is_zero() {
            return Err(AppError::ConfigError(
                "SCRAPE_LEASE_SECS must be at least 1".into(),
            ));
        }

        let job_timeout = env.millis("SCRAPE_TIMEOUT_MS", defaults.job_timeout)?;
        // A lease that can expire mid-job would let a second worker claim it.
        if lease <= job_timeout + max_delay {
            return Err(AppError::ConfigError(format!(
                "SCRAPE_LEASE_SECS ({}s) must exceed SCRAPE_TIMEOUT_MS plus SCRAPE_MAX_DELAY_MS ({}ms)",
                lease.as_secs(),
                (job_timeout + max_delay).as_millis()
            )));
        }

        Ok(Self {
            queue_enabled: env
                .get("SCRAPE_QUEUE_ENABLED")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            base_url: env
                .get("SCRAPE_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            retry,
            thresholds,
            min_delay,
            max_delay,
            job_timeout,
            lease,
            fan_out: FanOutLimits {
                per_navigation: env.parse(
                    "SCRAPE_MAX_CATEGORIES_PER_NAV",
                    defaults.fan_out.per_navigation,
                )?,
                per_category: env.parse(
                    "SCRAPE_MAX_PRODUCTS_PER_CATEGORY",
                    defaults.fan_out.per_category,
                )?,
            },
        })
    }

    pub fn locators(&self) -> Locators {
        Locators::new(&self.base_url)
    }

    pub fn staleness_policy<C: Clock>(&self, clock: C) -> StalenessPolicy<C> {
        StalenessPolicy::new(self.thresholds, clock)
    }

    /// Worker settings derived from this configuration, with a fresh worker id.
    pub fn worker_config(&self) -> WorkerConfig {
        let mut config = WorkerConfig::default()
            .with_politeness(self.min_delay, self.max_delay)
            .with_job_timeout(self.job_timeout)
            .with_fan_out(self.fan_out);
        config.max_attempts = self.retry.max_attempts;
        config
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, AppError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        self.parse(key, default.as_millis() as u64)
            .map(Duration::from_millis)
    }

    fn hours(&self, key: &str, default: f64) -> Result<f64, AppError> {
        let hours: f64 = self.parse(key, default)?;
        if !hours.is_finite() || hours < 0.0 {
            return Err(AppError::ConfigError(format!(
                "Invalid {key} '{hours}': must be a non-negative number of hours"
            )));
        }
        Ok(hours)
    }
}
