use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::resource::{CollectionFreshness, EntityFreshness, ExtractedRecord, ResourceKind};

/// Fetches raw HTML from a URL.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Fetches a resource and turns it into structured records.
///
/// A call for kind `K` at `locator` returns records of kind `K`: the
/// categories listed under a navigation page, the products of a category,
/// or the single product of a product page.
pub trait Extractor: Send + Sync + Clone + 'static {
    fn extract(
        &self,
        kind: ResourceKind,
        locator: &str,
    ) -> impl Future<Output = Result<Vec<ExtractedRecord>, AppError>> + Send;
}

/// Persistence of scraped entities and their freshness timestamps.
pub trait CatalogStore: Send + Sync + Clone + 'static {
    /// Freshness of one entity, `None` when it does not exist.
    ///
    /// For products `id` may also be the source id taken from the product URL.
    fn get_freshness(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> impl Future<Output = Result<Option<EntityFreshness>, AppError>> + Send;

    /// Aggregate freshness of the members of a collection. `parent_id` is
    /// ignored for navigation, which has no parent.
    fn collection_freshness(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> impl Future<Output = Result<CollectionFreshness, AppError>> + Send;

    /// Insert or update a record keyed by its locator, stamping
    /// `last_scraped_at = scraped_at`. Returns the entity id.
    fn upsert(
        &self,
        record: &ExtractedRecord,
        scraped_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn count_by_kind(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
