use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Level of the scraped hierarchy: navigation → category → product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Navigation,
    Category,
    Product,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Navigation,
        ResourceKind::Category,
        ResourceKind::Product,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Navigation => "navigation",
            ResourceKind::Category => "category",
            ResourceKind::Product => "product",
        }
    }

    /// The kind whose collection a record of this kind fans out into.
    pub fn child(&self) -> Option<ResourceKind> {
        match self {
            ResourceKind::Navigation => Some(ResourceKind::Category),
            ResourceKind::Category => Some(ResourceKind::Product),
            ResourceKind::Product => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "navigation" => Ok(ResourceKind::Navigation),
            "category" => Ok(ResourceKind::Category),
            "product" => Ok(ResourceKind::Product),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// A scrape target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub locator: String,
    pub parent_id: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// One structured record produced by an [`Extractor`](crate::traits::Extractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub kind: ResourceKind,
    /// Canonical locator; the store upserts on it.
    pub locator: String,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ExtractedRecord {
    pub fn new(kind: ResourceKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            title: None,
            source_id: None,
            parent_id: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Freshness of a single persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFreshness {
    pub id: String,
    pub locator: String,
    /// `None` means the entity was never scraped.
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// Freshness aggregate over the members of one collection
/// (e.g. every category under a navigation item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectionFreshness {
    pub count: i64,
    /// Most recent `last_scraped_at` among members, if any member has one.
    pub latest: Option<DateTime<Utc>>,
}

impl CollectionFreshness {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the aggregate from individual member timestamps.
    pub fn from_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Option<DateTime<Utc>>>,
    {
        members
            .into_iter()
            .fold(Self::empty(), |acc, member| CollectionFreshness {
                count: acc.count + 1,
                latest: acc.latest.max(member),
            })
    }
}

/// Paths the crawler never follows.
pub const DISALLOWED_PATHS: &[&str] = &[
    "/search",
    "/cart",
    "/checkout",
    "/checkouts",
    "/orders",
    "/admin",
    "/account",
    "/policies",
];

/// Canonical locators for the scraped site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locators {
    base_url: String,
}

impl Locators {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Locator of the navigation root (the seed of the whole crawl).
    pub fn root(&self) -> &str {
        &self.base_url
    }

    /// Locator listing the categories of a navigation item.
    pub fn navigation(&self, navigation_id: &str) -> String {
        format!("{}/navigation/{}", self.base_url, navigation_id)
    }

    /// Locator listing the products of a category.
    pub fn category(&self, category_id: &str) -> String {
        format!("{}/category/{}", self.base_url, category_id)
    }

    /// Locator of a single product page.
    pub fn product(&self, product_id: &str) -> String {
        format!("{}/products/{}", self.base_url, product_id)
    }
}

/// Extract the product id from a `/products/{id}` locator.
pub fn product_source_id(locator: &str) -> Option<String> {
    let path = match Url::parse(locator) {
        Ok(url) => url.path().to_string(),
        Err(_) => locator.to_string(),
    };
    let (_, rest) = path.split_once("/products/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Whether the crawler may follow a locator.
///
/// A locator is rejected when any path segment names a disallowed path, so
/// `/cart` and `/en-gb/cart` are both refused.
pub fn is_locator_allowed(locator: &str) -> bool {
    let Ok(url) = Url::parse(locator) else {
        return false;
    };
    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    !DISALLOWED_PATHS
        .iter()
        .map(|path| path.trim_start_matches('/'))
        .any(|name| segments.contains(&name))
}
