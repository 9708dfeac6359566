//! Driver payout endpoints.

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

pub fn driver_payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_driver_payments).post(create_driver_payment))
        .route("/:id", get(get_driver_payment))
        .route("/:id/status", put(update_driver_payment_status))
        .route("/:id/recall", post(recall_driver_payment))
        .route("/:id/sync", post(sync_driver_payment))
}

#[derive(Debug, Deserialize)]
pub struct CreateDriverPaymentRequest {
    pub job_ids: Vec<String>,
    pub driver_name: String,
    pub billing_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

async fn list_driver_payments(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Query(params): Query<SettlementListParams>,
) -> ApiResult<Json<PaginatedResponse<SettlementDocument>>> {
    settlements::list(&state, &ctx, SettlementKind::DriverPayment, &params).await
}

async fn create_driver_payment(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<CreateDriverPaymentRequest>,
) -> ApiResult<Json<CreatedSettlement>> {
    let request = CreateSettlementRequest {
        job_ids: payload.job_ids,
        counterparty_name: payload.driver_name,
        billing_date: payload.billing_date,
        due_date: payload.due_date,
    };
    settlements::create(&state, &ctx, SettlementKind::DriverPayment, request).await
}

async fn get_driver_payment(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SettlementDetail>> {
    settlements::detail(&state, &ctx, SettlementKind::DriverPayment, &id).await
}

async fn update_driver_payment_status(
    State(state): State<Arc<AppState>>,
    AuthUser(_ctx): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    settlements::update_status(&state, SettlementKind::DriverPayment, &id, &payload).await
}

async fn recall_driver_payment(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    settlements::recall(&state, &ctx, SettlementKind::DriverPayment, &id).await
}

async fn sync_driver_payment(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SyncOutcome>> {
    settlements::sync(&state, &ctx, SettlementKind::DriverPayment, &id).await
}
