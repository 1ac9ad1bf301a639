//! CSS selector fallbacks for the storefront's page types.
//!
//! Each list is tried in order and the first selector that matches anything
//! wins, so markup changes degrade to a broader selector instead of an empty
//! result.

use freshet_core::error::AppError;
use scraper::{ElementRef, Selector};

pub const NAV_LINKS: &[&str] = &[
    r#"nav[role="navigation"] a"#,
    ".main-navigation a",
    "header nav a",
    ".navigation-menu a",
];

pub const SUBCATEGORY_LINKS: &[&str] = &[
    ".collection-list a",
    ".subcollections a",
    r#"aside a[href*="/collections/"]"#,
];

pub const PAGE_TITLE: &[&str] = &[
    "h1.collection-title",
    "h1.category-title",
    ".collection-header h1",
    "h1",
];

pub const CATEGORY_DESCRIPTION: &[&str] = &[
    ".collection-description",
    ".category-description",
    ".collection-header p",
];

pub const PRODUCT_CARDS: &[&str] = &[
    ".product-card",
    ".product-item",
    ".grid-product",
    "[data-product-id]",
];

pub const CARD_LINK: &[&str] = &["a.product-link", r#"a[href*="/products/"]"#, "a"];
pub const CARD_TITLE: &[&str] = &[".product-title", ".product-name", "h3", "h2"];
pub const CARD_PRICE: &[&str] = &[".product-price", ".price", "[data-price]"];
pub const CARD_IMAGE: &[&str] = &["img.product-image", "img"];
pub const CARD_AUTHOR: &[&str] = &[".product-author", ".author", "[data-author]"];

pub const PRODUCT_TITLE: &[&str] = &[
    "h1.product-title",
    r#"h1[itemprop="name"]"#,
    ".product-single__title",
    "h1",
];
pub const PRODUCT_AUTHOR: &[&str] = &[
    ".product-author",
    r#"[itemprop="author"]"#,
    ".product-meta__author",
    "[data-author]",
];
pub const PRODUCT_PRICE: &[&str] = &[
    ".product-price",
    r#"[itemprop="price"]"#,
    ".price",
    "[data-price]",
];
pub const PRODUCT_CURRENCY: &[&str] = &[r#"[itemprop="priceCurrency"]"#, ".currency", "[data-currency]"];
pub const PRODUCT_IMAGE: &[&str] = &[
    ".product-featured-image img",
    r#"img[itemprop="image"]"#,
    ".product-image img",
];
pub const PRODUCT_DESCRIPTION: &[&str] = &[
    ".product-description",
    r#"[itemprop="description"]"#,
    ".product-single__description",
    ".description",
];
pub const PRODUCT_ISBN: &[&str] = &["[data-isbn]", ".isbn", ".product-isbn"];
pub const PRODUCT_PUBLISHER: &[&str] = &[".publisher", "[data-publisher]", ".product-publisher"];
pub const PRODUCT_PUBLICATION_DATE: &[&str] = &[
    ".publication-date",
    "[data-publication-date]",
    ".product-date",
];
pub const PRODUCT_RATING: &[&str] = &[
    ".rating",
    r#"[itemprop="ratingValue"]"#,
    ".product-rating",
    "[data-rating]",
];
pub const PRODUCT_REVIEW_COUNT: &[&str] = &[".review-count", r#"[itemprop="reviewCount"]"#, ".reviews-count"];

fn parse(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector)
        .map_err(|e| AppError::ExtractionError(format!("Invalid selector '{selector}': {e:?}")))
}

/// All matches of the first selector in `selectors` that matches anything.
pub fn select_all<'a>(
    scope: ElementRef<'a>,
    selectors: &[&str],
) -> Result<Vec<ElementRef<'a>>, AppError> {
    for raw in selectors {
        let matches: Vec<_> = scope.select(&parse(raw)?).collect();
        if !matches.is_empty() {
            return Ok(matches);
        }
    }
    Ok(Vec::new())
}

/// First match across the fallback list.
pub fn select_first<'a>(
    scope: ElementRef<'a>,
    selectors: &[&str],
) -> Result<Option<ElementRef<'a>>, AppError> {
    for raw in selectors {
        if let Some(found) = scope.select(&parse(raw)?).next() {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Trimmed, whitespace-collapsed text of the first match with any text.
pub fn text(scope: ElementRef<'_>, selectors: &[&str]) -> Result<Option<String>, AppError> {
    for raw in selectors {
        let found = scope
            .select(&parse(raw)?)
            .map(element_text)
            .find(|t| !t.is_empty());
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Attribute value of the first match that carries it.
pub fn attr(
    scope: ElementRef<'_>,
    selectors: &[&str],
    name: &str,
) -> Result<Option<String>, AppError> {
    for raw in selectors {
        let found = scope
            .select(&parse(raw)?)
            .filter_map(|el| el.value().attr(name))
            .map(str::trim)
            .find(|v| !v.is_empty());
        if let Some(value) = found {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
