//! Job listing for settlement selection.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::get,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use linehaul_shared::Job;

use crate::AppState;
use crate::auth::AuthUser;
use crate::billing::extra_costs::ExtraCost;
use crate::billing::store;
use crate::billing::totals::JobTotals;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{JobListParams, PaginatedResponse, QueryBuilder};

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:id", get(get_job))
}

/// A job with its computed settlement amounts and normalized extras.
#[derive(Debug, Serialize)]
pub struct JobWithTotals {
    #[serde(flatten)]
    pub job: Job,
    pub customer_amount: Decimal,
    pub driver_amount: Decimal,
    pub extras: Vec<ExtraCost>,
}

impl JobWithTotals {
    fn from_job(job: Job) -> Self {
        let totals = JobTotals::compute(&job);
        Self {
            customer_amount: totals.customer_amount,
            driver_amount: totals.driver_amount,
            extras: totals.extras,
            job,
        }
    }
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Query(params): Query<JobListParams>,
) -> ApiResult<Json<PaginatedResponse<JobWithTotals>>> {
    let mut qb = QueryBuilder::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(pattern) = params.base.search.search_pattern() {
        qb.add_condition("(job_id ILIKE {} OR customer_name ILIKE {} OR driver_name ILIKE {})");
        binds.push(pattern);
    }
    if let Some(customer) = &params.customer_name {
        qb.add_condition("customer_name = {}");
        binds.push(customer.clone());
    }
    if let Some(driver) = &params.driver_name {
        qb.add_condition("driver_name = {}");
        binds.push(driver.clone());
    }
    if let Some(branch) = ctx.branch_scope() {
        qb.add_condition("branch_id = {}");
        binds.push(branch.to_string());
    }
    if let Some(from) = params.base.search.from_date {
        qb.add_condition("job_date >= {}::date");
        binds.push(from.to_string());
    }
    if let Some(to) = params.base.search.to_date {
        qb.add_condition("job_date <= {}::date");
        binds.push(to.to_string());
    }
    if params.unbilled {
        qb.add_raw("billing_note_id IS NULL");
    }
    if params.unpaid {
        qb.add_raw("driver_payment_id IS NULL");
    }

    let sort = params
        .base
        .pagination
        .validated_sort_field(&["job_date", "created_at", "job_id"], "created_at");
    let sql = format!(
        "SELECT {} FROM jobs {} ORDER BY {} {} LIMIT {} OFFSET {}",
        store::JOB_COLUMNS,
        qb.where_clause(),
        sort,
        params.base.pagination.sort_direction(),
        params.base.pagination.limit(),
        params.base.pagination.offset()
    );

    let mut query = sqlx::query_as::<_, Job>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let rows = query.fetch_all(&state.db_pool).await.map_err(|e| {
        tracing::error!("Error fetching jobs: {}", e);
        ApiError::internal("Failed to fetch jobs")
    })?;

    let count_sql = format!("SELECT COUNT(*) FROM jobs {}", qb.where_clause());
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total = count_query.fetch_one(&state.db_pool).await.map_err(|e| {
        tracing::error!("Error counting jobs: {}", e);
        ApiError::internal("Failed to count jobs")
    })?;

    let data: Vec<JobWithTotals> = rows.into_iter().map(JobWithTotals::from_job).collect();
    Ok(Json(PaginatedResponse::new(
        data,
        &params.base.pagination,
        total,
    )))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JobWithTotals>> {
    let sql = format!("SELECT {} FROM jobs WHERE job_id = $1", store::JOB_COLUMNS);
    let job = sqlx::query_as::<_, Job>(&sql)
        .bind(&id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Error fetching job: {}", e);
            ApiError::internal("Failed to fetch job")
        })?
        .ok_or_else(|| ApiError::not_found(format!("job {} not found", id)))?;

    if let Some(branch) = ctx.branch_scope() {
        if job.branch_id.as_deref() != Some(branch) {
            return Err(ApiError::forbidden("job belongs to another branch"));
        }
    }

    Ok(Json(JobWithTotals::from_job(job)))
}
