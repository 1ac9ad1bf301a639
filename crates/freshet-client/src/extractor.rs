use std::collections::HashSet;

use freshet_core::error::AppError;
use freshet_core::resource::{ExtractedRecord, ResourceKind, is_locator_allowed, product_source_id};
use freshet_core::traits::{Extractor, Fetcher};
use scraper::{ElementRef, Html};
use serde_json::{Map, Value, json};
use url::Url;

use crate::selectors::{self, attr, element_text, select_all, text};

/// [`Extractor`] that downloads a page with a [`Fetcher`] and reads it with
/// CSS selectors.
///
/// - navigation: one record per `/collections/` link in the site menu
/// - category: the sub-collections listed on a collection page, or the page
///   itself when it lists none
/// - product: the product cards of a collection page, or the single product
///   of a `/products/` page
#[derive(Clone)]
pub struct SelectorExtractor<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> SelectorExtractor<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetcher> Extractor for SelectorExtractor<F> {
    async fn extract(
        &self,
        kind: ResourceKind,
        locator: &str,
    ) -> Result<Vec<ExtractedRecord>, AppError> {
        let page = Url::parse(locator)
            .map_err(|e| AppError::ExtractionError(format!("Invalid locator '{locator}': {e}")))?;
        let html = self.fetcher.fetch(locator).await?;

        let records = match kind {
            ResourceKind::Navigation => parse_navigation(&html, &page)?,
            ResourceKind::Category => parse_categories(&html, &page)?,
            ResourceKind::Product if product_source_id(locator).is_some() => {
                vec![parse_product_page(&html, &page)?]
            }
            ResourceKind::Product => parse_product_cards(&html, &page)?,
        };

        tracing::debug!(%kind, %locator, records = records.len(), "Page extracted");
        Ok(records)
    }
}

fn parse_navigation(html: &str, page: &Url) -> Result<Vec<ExtractedRecord>, AppError> {
    let doc = Html::parse_document(html);
    let links = collection_links(doc.root_element(), selectors::NAV_LINKS, page)?;
    if links.is_empty() {
        tracing::warn!(page = %page, "No navigation links found");
    }

    Ok(links
        .into_iter()
        .map(|(locator, title)| {
            ExtractedRecord::new(ResourceKind::Navigation, locator)
                .with_data(json!({ "slug": slugify(&title) }))
                .with_title(title)
        })
        .collect())
}

fn parse_categories(html: &str, page: &Url) -> Result<Vec<ExtractedRecord>, AppError> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let links = collection_links(root, selectors::SUBCATEGORY_LINKS, page)?;
    if !links.is_empty() {
        return Ok(links
            .into_iter()
            .map(|(locator, title)| {
                ExtractedRecord::new(ResourceKind::Category, locator)
                    .with_data(json!({ "slug": slugify(&title) }))
                    .with_title(title)
            })
            .collect());
    }

    let title = text(root, selectors::PAGE_TITLE)?
        .ok_or_else(|| AppError::ExtractionError(format!("No category title on {page}")))?;
    let mut data = Map::new();
    data.insert("slug".into(), Value::String(slugify(&title)));
    insert_opt(&mut data, "description", text(root, selectors::CATEGORY_DESCRIPTION)?);

    Ok(vec![
        ExtractedRecord::new(ResourceKind::Category, page.as_str())
            .with_title(title)
            .with_data(Value::Object(data)),
    ])
}

fn parse_product_cards(html: &str, page: &Url) -> Result<Vec<ExtractedRecord>, AppError> {
    let doc = Html::parse_document(html);
    let cards = select_all(doc.root_element(), selectors::PRODUCT_CARDS)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for card in cards {
        let Some(locator) = attr(card, selectors::CARD_LINK, "href")?
            .and_then(|href| resolve_same_host(page, &href))
        else {
            continue;
        };
        let Some(title) = text(card, selectors::CARD_TITLE)? else {
            tracing::debug!(%locator, "Skipping product card without title");
            continue;
        };
        if !seen.insert(locator.clone()) {
            continue;
        }

        let price_text = text(card, selectors::CARD_PRICE)?;
        let mut data = Map::new();
        insert_opt(&mut data, "author", text(card, selectors::CARD_AUTHOR)?);
        insert_price(&mut data, price_text.as_deref(), None);
        insert_opt(
            &mut data,
            "image_url",
            attr(card, selectors::CARD_IMAGE, "src")?.and_then(|src| resolve(page, &src)),
        );

        let source_id = product_source_id(&locator)
            .or_else(|| card.value().attr("data-product-id").map(str::to_string));
        let mut record = ExtractedRecord::new(ResourceKind::Product, locator)
            .with_title(title)
            .with_data(Value::Object(data));
        if let Some(source_id) = source_id {
            record = record.with_source_id(source_id);
        }
        records.push(record);
    }

    if records.is_empty() {
        tracing::warn!(page = %page, "No product cards found");
    }
    Ok(records)
}

fn parse_product_page(html: &str, page: &Url) -> Result<ExtractedRecord, AppError> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let title = text(root, selectors::PRODUCT_TITLE)?
        .ok_or_else(|| AppError::ExtractionError(format!("No product title on {page}")))?;

    let mut data = Map::new();
    insert_opt(&mut data, "author", text(root, selectors::PRODUCT_AUTHOR)?);
    let price_text = text(root, selectors::PRODUCT_PRICE)?;
    let currency = attr(root, selectors::PRODUCT_CURRENCY, "content")?
        .or(text(root, selectors::PRODUCT_CURRENCY)?);
    insert_price(&mut data, price_text.as_deref(), currency);
    insert_opt(
        &mut data,
        "image_url",
        attr(root, selectors::PRODUCT_IMAGE, "src")?.and_then(|src| resolve(page, &src)),
    );
    insert_opt(&mut data, "description", text(root, selectors::PRODUCT_DESCRIPTION)?);
    insert_opt(
        &mut data,
        "isbn",
        attr(root, selectors::PRODUCT_ISBN, "data-isbn")?.or(text(root, selectors::PRODUCT_ISBN)?),
    );
    insert_opt(&mut data, "publisher", text(root, selectors::PRODUCT_PUBLISHER)?);
    insert_opt(
        &mut data,
        "publication_date",
        text(root, selectors::PRODUCT_PUBLICATION_DATE)?,
    );
    if let Some(rating) = text(root, selectors::PRODUCT_RATING)?.and_then(|t| parse_number(&t)) {
        data.insert("rating".into(), json!(rating));
    }
    if let Some(reviews) = text(root, selectors::PRODUCT_REVIEW_COUNT)?
        .map(|t| t.chars().filter(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse::<i64>().ok())
    {
        data.insert("review_count".into(), json!(reviews));
    }

    let mut record = ExtractedRecord::new(ResourceKind::Product, page.as_str())
        .with_title(title)
        .with_data(Value::Object(data));
    if let Some(source_id) = product_source_id(page.as_str()) {
        record = record.with_source_id(source_id);
    }
    Ok(record)
}

/// Same-host, crawlable `/collections/` links with their link text, in page
/// order and without duplicates.
fn collection_links(
    scope: ElementRef<'_>,
    selector_list: &[&str],
    page: &Url,
) -> Result<Vec<(String, String)>, AppError> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for link in select_all(scope, selector_list)? {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.contains("/collections/") {
            continue;
        }
        let Some(locator) = resolve_same_host(page, href) else {
            continue;
        };
        if locator == page.as_str() || !seen.insert(locator.clone()) {
            continue;
        }
        let title = element_text(link);
        if title.is_empty() {
            continue;
        }
        links.push((locator, title));
    }

    Ok(links)
}

fn resolve(page: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let mut url = page.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Resolve `href` and keep it only when it stays on the page's host and is
/// not a disallowed path.
fn resolve_same_host(page: &Url, href: &str) -> Option<String> {
    let locator = resolve(page, href)?;
    let url = Url::parse(&locator).ok()?;
    (url.host_str() == page.host_str() && is_locator_allowed(&locator)).then_some(locator)
}

fn insert_opt(data: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        data.insert(key.to_string(), Value::String(value));
    }
}

fn insert_price(data: &mut Map<String, Value>, price_text: Option<&str>, currency: Option<String>) {
    let Some(price_text) = price_text else {
        return;
    };
    if let Some(price) = parse_number(price_text) {
        data.insert("price".into(), json!(price));
    }
    let currency = currency.unwrap_or_else(|| currency_for(price_text).to_string());
    data.insert("currency".into(), Value::String(currency));
}

/// First decimal number in `text`, e.g. `"£12.99"` → `12.99`.
fn parse_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

fn currency_for(price_text: &str) -> &'static str {
    if price_text.contains('£') { "GBP" } else { "USD" }
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
