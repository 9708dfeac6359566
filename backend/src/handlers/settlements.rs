//! Shared settlement handler logic for both document directions.
//!
//! Billing notes and driver payments expose the same operations over their
//! own routes and request shapes; the route modules delegate here with the
//! direction pinned.

use axum::response::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use linehaul_shared::{Job, SettlementDocument, SettlementKind};

use crate::AppState;
use crate::auth::AuthContext;
use crate::billing::aggregate::withholding_for;
use crate::billing::extra_costs::ExtraCost;
use crate::billing::store::{self, BillingStore, PgBillingStore, StoreError};
use crate::billing::totals::JobTotals;
use crate::billing::writer::{self, BillingError, CreateSettlementRequest, CreatedSettlement};
use crate::error::{ApiError, ApiResult, AppError};
use crate::integrations::accounting::{self, SyncOutcome};
use crate::pagination::{PaginatedResponse, QueryBuilder, SettlementListParams};

fn store_err(err: StoreError) -> AppError {
    AppError::from(BillingError::Store(err))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// One linked job on a settlement detail view, with its direction amount.
#[derive(Debug, Serialize)]
pub struct SettlementJobLine {
    #[serde(flatten)]
    pub job: Job,
    pub amount: Decimal,
    pub extras: Vec<ExtraCost>,
}

/// Full settlement document as displayed or printed. Withholding and net are
/// derived from the stored pre-withholding subtotal on every render.
#[derive(Debug, Serialize)]
pub struct SettlementDetail {
    #[serde(flatten)]
    pub document: SettlementDocument,
    pub subtotal: Decimal,
    pub withholding: Decimal,
    pub net_total: Decimal,
    pub jobs: Vec<SettlementJobLine>,
}

pub(super) async fn list(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
    params: &SettlementListParams,
) -> ApiResult<Json<PaginatedResponse<SettlementDocument>>> {
    let mut qb = QueryBuilder::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(status) = &params.status {
        qb.add_condition("status = {}");
        binds.push(status.clone());
    }
    if let Some(counterparty) = &params.counterparty {
        qb.add_condition(&format!(
            "{} ILIKE {{}}",
            store::counterparty_column(kind)
        ));
        binds.push(format!("%{}%", counterparty.trim()));
    }
    if let Some(pattern) = params.base.search.search_pattern() {
        qb.add_condition(&format!(
            "({} ILIKE {{}} OR {} ILIKE {{}})",
            store::id_column(kind),
            store::counterparty_column(kind)
        ));
        binds.push(pattern);
    }
    if let Some(from) = params.base.search.from_date {
        qb.add_condition("billing_date >= {}::date");
        binds.push(from.to_string());
    }
    if let Some(to) = params.base.search.to_date {
        qb.add_condition("billing_date <= {}::date");
        binds.push(to.to_string());
    }
    if let Some(branch) = ctx.branch_scope() {
        qb.add_condition("branch_id = {}");
        binds.push(branch.to_string());
    }

    let sort = params.base.pagination.validated_sort_field(
        &["billing_date", "created_at", "total_amount", "status"],
        "created_at",
    );
    let sql = format!(
        "SELECT {} FROM {} {} ORDER BY {} {} LIMIT {} OFFSET {}",
        store::settlement_columns(kind),
        store::table(kind),
        qb.where_clause(),
        sort,
        params.base.pagination.sort_direction(),
        params.base.pagination.limit(),
        params.base.pagination.offset()
    );

    let mut query = sqlx::query_as::<_, SettlementDocument>(&sql);
    for bind in &binds {
        query = query.bind(bind);
    }
    let docs = query.fetch_all(&state.db_pool).await.map_err(|e| {
        tracing::error!("Error fetching settlements: {}", e);
        ApiError::internal("Failed to fetch settlements")
    })?;

    let count_sql = format!(
        "SELECT COUNT(*) FROM {} {}",
        store::table(kind),
        qb.where_clause()
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total = count_query.fetch_one(&state.db_pool).await.map_err(|e| {
        tracing::error!("Error counting settlements: {}", e);
        ApiError::internal("Failed to count settlements")
    })?;

    Ok(Json(PaginatedResponse::new(
        docs,
        &params.base.pagination,
        total,
    )))
}

pub(super) async fn detail(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
    id: &str,
) -> ApiResult<Json<SettlementDetail>> {
    let pg = PgBillingStore::new(state.db_pool.clone());

    let document = pg
        .fetch_settlement(kind, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found(format!("settlement {} not found", id)))?;

    if let Some(branch) = ctx.branch_scope() {
        if document.branch_id.as_deref() != Some(branch) {
            return Err(ApiError::forbidden("settlement belongs to another branch"));
        }
    }

    let jobs = pg.jobs_for_settlement(kind, id).await.map_err(store_err)?;

    let lines: Vec<SettlementJobLine> = jobs
        .into_iter()
        .map(|job| {
            let totals = JobTotals::compute(&job);
            SettlementJobLine {
                amount: totals.amount_for(kind),
                extras: totals.extras,
                job,
            }
        })
        .collect();

    let withholding = withholding_for(document.total_amount);
    Ok(Json(SettlementDetail {
        subtotal: document.total_amount,
        withholding,
        net_total: document.total_amount - withholding,
        jobs: lines,
        document,
    }))
}

pub(super) async fn create(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
    request: CreateSettlementRequest,
) -> ApiResult<Json<CreatedSettlement>> {
    let pg = PgBillingStore::new(state.db_pool.clone());
    let created = writer::create_settlement(&pg, kind, &request, ctx).await?;
    Ok(Json(created))
}

pub(super) async fn recall(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
    id: &str,
) -> ApiResult<Json<serde_json::Value>> {
    let pg = PgBillingStore::new(state.db_pool.clone());
    writer::recall_settlement(&pg, kind, id, ctx).await?;
    Ok(Json(json!({
        "message": format!("settlement {} recalled, jobs returned to unsettled", id)
    })))
}

pub(super) async fn update_status(
    state: &AppState,
    kind: SettlementKind,
    id: &str,
    request: &UpdateStatusRequest,
) -> ApiResult<Json<serde_json::Value>> {
    let pg = PgBillingStore::new(state.db_pool.clone());
    writer::set_status(&pg, kind, id, &request.status).await?;
    Ok(Json(json!({
        "message": format!("settlement {} marked {}", id, request.status)
    })))
}

/// Push a settlement to the bookkeeping system. Sync failures come back as a
/// structured outcome, never as an HTTP error: the settlement itself is
/// already committed and unaffected.
pub(super) async fn sync(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
    id: &str,
) -> ApiResult<Json<SyncOutcome>> {
    let pg = PgBillingStore::new(state.db_pool.clone());

    let document = pg
        .fetch_settlement(kind, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found(format!("settlement {} not found", id)))?;

    if let Some(branch) = ctx.branch_scope() {
        if document.branch_id.as_deref() != Some(branch) {
            return Err(ApiError::forbidden("settlement belongs to another branch"));
        }
    }

    let jobs = pg.jobs_for_settlement(kind, id).await.map_err(store_err)?;

    let outcome = match kind {
        SettlementKind::BillingNote => {
            accounting::sync_billing_note_to_invoice(state.accounting.as_ref(), &document, &jobs)
                .await
        }
        SettlementKind::DriverPayment => {
            accounting::sync_driver_payment_to_bill(state.accounting.as_ref(), &document, &jobs)
                .await
        }
    };

    Ok(Json(outcome))
}
