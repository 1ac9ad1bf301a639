use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use freshet_core::error::AppError;
use freshet_core::resource::{
    CollectionFreshness, EntityFreshness, ExtractedRecord, ResourceKind, product_source_id,
};
use freshet_core::traits::CatalogStore;

/// Catalog persistence in PostgreSQL: one table per hierarchy level, each
/// row keyed by id and unique on its locator.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn table(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Navigation => "navigation",
        ResourceKind::Category => "categories",
        ResourceKind::Product => "products",
    }
}

fn parent_column(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Navigation => None,
        ResourceKind::Category => Some("navigation_id"),
        ResourceKind::Product => Some("category_id"),
    }
}

/// Store ids are UUIDs; anything else cannot match a row.
fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id.trim()).ok()
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

#[derive(sqlx::FromRow)]
struct FreshnessRow {
    id: Uuid,
    locator: String,
    last_scraped_at: Option<DateTime<Utc>>,
}

impl From<FreshnessRow> for EntityFreshness {
    fn from(row: FreshnessRow) -> Self {
        EntityFreshness {
            id: row.id.to_string(),
            locator: row.locator,
            last_scraped_at: row.last_scraped_at,
        }
    }
}

impl CatalogStore for CatalogRepository {
    async fn get_freshness(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<EntityFreshness>, AppError> {
        let row = match kind {
            ResourceKind::Product => {
                sqlx::query_as::<_, FreshnessRow>(
                    r#"
                    SELECT id, locator, last_scraped_at FROM products
                    WHERE id = $1 OR source_id = $2
                    ORDER BY (id = $1) DESC NULLS LAST
                    LIMIT 1
                    "#,
                )
                .bind(parse_id(id))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            }
            _ => {
                let Some(uuid) = parse_id(id) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, FreshnessRow>(&format!(
                    "SELECT id, locator, last_scraped_at FROM {} WHERE id = $1",
                    table(kind)
                ))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }

    async fn collection_freshness(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<CollectionFreshness, AppError> {
        let (count, latest): (i64, Option<DateTime<Utc>>) =
            match (parent_column(kind), parent_id) {
                (Some(column), Some(parent_id)) => {
                    let Some(parent) = parse_id(parent_id) else {
                        return Ok(CollectionFreshness::empty());
                    };
                    sqlx::query_as(&format!(
                        "SELECT COUNT(*), MAX(last_scraped_at) FROM {} WHERE {column} = $1",
                        table(kind)
                    ))
                    .bind(parent)
                    .fetch_one(&self.pool)
                    .await
                }
                _ => {
                    sqlx::query_as(&format!(
                        "SELECT COUNT(*), MAX(last_scraped_at) FROM {}",
                        table(kind)
                    ))
                    .fetch_one(&self.pool)
                    .await
                }
            }
            .map_err(db_err)?;

        Ok(CollectionFreshness { count, latest })
    }

    async fn upsert(
        &self,
        record: &ExtractedRecord,
        scraped_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let data = if record.data.is_null() {
            serde_json::json!({})
        } else {
            record.data.clone()
        };
        let parent = match record.parent_id.as_deref() {
            Some(raw) => {
                let parsed = parse_id(raw);
                if parsed.is_none() {
                    tracing::warn!(kind = %record.kind, parent_id = raw, "Ignoring non-UUID parent id");
                }
                parsed
            }
            None => None,
        };

        let (id,): (Uuid,) = match record.kind {
            ResourceKind::Navigation => {
                sqlx::query_as(
                    r#"
                    INSERT INTO navigation (title, locator, data, last_scraped_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (locator) DO UPDATE
                    SET title = COALESCE(EXCLUDED.title, navigation.title),
                        data = EXCLUDED.data,
                        last_scraped_at = EXCLUDED.last_scraped_at,
                        updated_at = NOW()
                    RETURNING id
                    "#,
                )
                .bind(&record.title)
                .bind(&record.locator)
                .bind(&data)
                .bind(scraped_at)
                .fetch_one(&self.pool)
                .await
            }
            ResourceKind::Category => {
                sqlx::query_as(
                    r#"
                    INSERT INTO categories (navigation_id, title, locator, data, last_scraped_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (locator) DO UPDATE
                    SET navigation_id = COALESCE(EXCLUDED.navigation_id, categories.navigation_id),
                        title = COALESCE(EXCLUDED.title, categories.title),
                        data = EXCLUDED.data,
                        last_scraped_at = EXCLUDED.last_scraped_at,
                        updated_at = NOW()
                    RETURNING id
                    "#,
                )
                .bind(parent)
                .bind(&record.title)
                .bind(&record.locator)
                .bind(&data)
                .bind(scraped_at)
                .fetch_one(&self.pool)
                .await
            }
            ResourceKind::Product => {
                let source_id = record
                    .source_id
                    .clone()
                    .or_else(|| product_source_id(&record.locator));
                sqlx::query_as(
                    r#"
                    INSERT INTO products (category_id, source_id, title, locator, data, last_scraped_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (locator) DO UPDATE
                    SET category_id = COALESCE(EXCLUDED.category_id, products.category_id),
                        source_id = COALESCE(EXCLUDED.source_id, products.source_id),
                        title = COALESCE(EXCLUDED.title, products.title),
                        data = EXCLUDED.data,
                        last_scraped_at = EXCLUDED.last_scraped_at,
                        updated_at = NOW()
                    RETURNING id
                    "#,
                )
                .bind(parent)
                .bind(source_id)
                .bind(&record.title)
                .bind(&record.locator)
                .bind(&data)
                .bind(scraped_at)
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        Ok(id.to_string())
    }

    async fn count_by_kind(
        &self,
        kind: ResourceKind,
        parent_id: Option<&str>,
    ) -> Result<i64, AppError> {
        Ok(self.collection_freshness(kind, parent_id).await?.count)
    }
}
