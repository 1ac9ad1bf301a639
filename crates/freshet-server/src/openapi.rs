use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Freshet API",
        version = "0.1.0",
        description = "Freshness-driven background scraping of a navigation → category → product catalog."
    ),
    paths(
        crate::routes::trigger_navigation,
        crate::routes::trigger_category,
        crate::routes::trigger_product,
        crate::routes::product_freshness,
        crate::routes::list_jobs,
        crate::routes::get_job,
        crate::routes::retry_job,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::TriggerResponse,
        crate::dto::ProductFreshnessResponse,
        crate::dto::JobResponse,
        crate::dto::JobListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "scrape", description = "Freshness-checked scrape triggers"),
        (name = "products", description = "Product reads"),
        (name = "jobs", description = "Scrape queue inspection and failed-job retry"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
