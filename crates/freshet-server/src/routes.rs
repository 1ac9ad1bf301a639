use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use freshet_core::error::AppError;
use freshet_core::job::JobStatus;
use freshet_core::job_queue::JobQueue;

use crate::dto::{
    HealthResponse, JobListResponse, JobResponse, ListJobsQuery, ProductFreshnessResponse,
    TriggerResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/scrape/navigation", post(trigger_navigation))
        .route("/api/scrape/category/{navigation_id}", post(trigger_category))
        .route("/api/scrape/product/{category_id}", post(trigger_product))
        .route("/api/products/{id}/freshness", get(product_freshness))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/retry", post(retry_job));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/scrape/navigation",
    responses(
        (status = 202, description = "Refresh decision", body = TriggerResponse),
        (status = 500, description = "Store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "scrape"
)]
pub async fn trigger_navigation(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.coordinator.trigger_navigation_scrape().await?;
    Ok((StatusCode::ACCEPTED, axum::Json(TriggerResponse::from(outcome))))
}

#[utoipa::path(
    post,
    path = "/api/scrape/category/{navigation_id}",
    params(
        ("navigation_id" = String, Path, description = "Navigation item whose categories to refresh")
    ),
    responses(
        (status = 202, description = "Refresh decision", body = TriggerResponse),
        (status = 500, description = "Store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "scrape"
)]
pub async fn trigger_category(
    State(state): State<Arc<AppState>>,
    Path(navigation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .coordinator
        .trigger_category_scrape(&navigation_id)
        .await?;
    Ok((StatusCode::ACCEPTED, axum::Json(TriggerResponse::from(outcome))))
}

#[utoipa::path(
    post,
    path = "/api/scrape/product/{category_id}",
    params(
        ("category_id" = String, Path, description = "Category whose products to refresh")
    ),
    responses(
        (status = 202, description = "Refresh decision", body = TriggerResponse),
        (status = 500, description = "Store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "scrape"
)]
pub async fn trigger_product(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .coordinator
        .trigger_product_scrape(&category_id)
        .await?;
    Ok((StatusCode::ACCEPTED, axum::Json(TriggerResponse::from(outcome))))
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Freshness of one product. A missing or stale product gets a background
/// scrape queued; the response never waits for it.
#[utoipa::path(
    get,
    path = "/api/products/{id}/freshness",
    params(
        ("id" = String, Path, description = "Product id or source id")
    ),
    responses(
        (status = 200, description = "Product freshness", body = ProductFreshnessResponse),
        (status = 404, description = "Not found (scrape queued)", body = crate::dto::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn product_freshness(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity = state.coordinator.read_product(&id).await?;
    Ok(axum::Json(ProductFreshnessResponse::from(entity)))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List of jobs", body = JobListResponse),
        (status = 400, description = "Unknown status filter", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query
        .status
        .map(|s| s.parse::<JobStatus>().map_err(AppError::Generic))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let jobs = state
        .coordinator
        .queue()
        .list_jobs(status_filter, limit)
        .await?;
    let total = jobs.len();

    let response = JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.coordinator.queue().get_job(&id).await? {
        Some(job) => Ok(axum::Json(JobResponse::from(job))),
        None => Err(AppError::NotFound { kind: "job", id }.into()),
    }
}

/// Put a failed job back in the queue with a fresh attempt budget.
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/retry",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job requeued", body = JobResponse),
        (status = 404, description = "No failed job with this ID", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.coordinator.queue().retry_failed(&id).await? {
        Some(job) => {
            tracing::info!(job_id = %job.id, "Failed job requeued");
            Ok(axum::Json(JobResponse::from(job)))
        }
        None => Err(AppError::NotFound {
            kind: "failed job",
            id,
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
        queue: state.coordinator.queue().name(),
    };

    (status, axum::Json(response))
}
