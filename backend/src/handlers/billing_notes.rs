//! Customer-facing billing note endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use linehaul_shared::{SettlementDocument, SettlementKind};

use super::settlements::{self, SettlementDetail, UpdateStatusRequest};
use crate::AppState;
use crate::auth::AuthUser;
use crate::billing::writer::{CreateSettlementRequest, CreatedSettlement};
use crate::error::ApiResult;
use crate::integrations::accounting::SyncOutcome;
use crate::pagination::{PaginatedResponse, SettlementListParams};

pub fn billing_note_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_billing_notes).post(create_billing_note))
        .route("/:id", get(get_billing_note))
        .route("/:id/status", put(update_billing_note_status))
        .route("/:id/recall", post(recall_billing_note))
        .route("/:id/sync", post(sync_billing_note))
}

#[derive(Debug, Deserialize)]
pub struct CreateBillingNoteRequest {
    pub job_ids: Vec<String>,
    pub customer_name: String,
    pub billing_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

async fn list_billing_notes(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Query(params): Query<SettlementListParams>,
) -> ApiResult<Json<PaginatedResponse<SettlementDocument>>> {
    settlements::list(&state, &ctx, SettlementKind::BillingNote, &params).await
}

async fn create_billing_note(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<CreateBillingNoteRequest>,
) -> ApiResult<Json<CreatedSettlement>> {
    let request = CreateSettlementRequest {
        job_ids: payload.job_ids,
        counterparty_name: payload.customer_name,
        billing_date: payload.billing_date,
        due_date: payload.due_date,
    };
    settlements::create(&state, &ctx, SettlementKind::BillingNote, request).await
}

async fn get_billing_note(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SettlementDetail>> {
    settlements::detail(&state, &ctx, SettlementKind::BillingNote, &id).await
}

async fn update_billing_note_status(
    State(state): State<Arc<AppState>>,
    AuthUser(_ctx): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    settlements::update_status(&state, SettlementKind::BillingNote, &id, &payload).await
}

async fn recall_billing_note(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    settlements::recall(&state, &ctx, SettlementKind::BillingNote, &id).await
}

async fn sync_billing_note(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SyncOutcome>> {
    settlements::sync(&state, &ctx, SettlementKind::BillingNote, &id).await
}
