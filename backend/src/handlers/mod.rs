use axum::{extract::State, response::Json};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use sqlx::Row;
use std::sync::Arc;

use linehaul_shared::SettlementKind;

use crate::auth::{AuthContext, AuthUser};
use crate::billing::store;
use crate::error::{ApiError, ApiResult, AppError};
use crate::{AppState, database};

pub mod billing_notes;
pub mod driver_payments;
pub mod jobs;
pub mod settlements;

pub use billing_notes::billing_note_routes;
pub use driver_payments::driver_payment_routes;
pub use jobs::job_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_ok = database::health_check(&state.db_pool).await;
    let pool = database::get_pool_stats(&state.db_pool);

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "pool": pool,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusBucket {
    pub status: String,
    pub documents: i64,
    pub total_amount: Decimal,
}

/// Outstanding/paid totals per direction for the executive dashboard.
#[derive(Debug, Serialize)]
pub struct BillingSummary {
    pub billing_notes: Vec<StatusBucket>,
    pub driver_payments: Vec<StatusBucket>,
}

pub async fn billing_summary(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<BillingSummary>> {
    let billing_notes = summarize(&state, &ctx, SettlementKind::BillingNote).await?;
    let driver_payments = summarize(&state, &ctx, SettlementKind::DriverPayment).await?;

    Ok(Json(BillingSummary {
        billing_notes,
        driver_payments,
    }))
}

async fn summarize(
    state: &AppState,
    ctx: &AuthContext,
    kind: SettlementKind,
) -> Result<Vec<StatusBucket>, AppError> {
    let scope = ctx.branch_scope();
    let sql = if scope.is_some() {
        format!(
            "SELECT status, COUNT(*) AS documents, COALESCE(SUM(total_amount), 0) AS total_amount \
             FROM {} WHERE branch_id = $1 GROUP BY status ORDER BY status",
            store::table(kind)
        )
    } else {
        format!(
            "SELECT status, COUNT(*) AS documents, COALESCE(SUM(total_amount), 0) AS total_amount \
             FROM {} GROUP BY status ORDER BY status",
            store::table(kind)
        )
    };

    let mut query = sqlx::query(&sql);
    if let Some(branch) = scope {
        query = query.bind(branch);
    }

    let rows = query.fetch_all(&state.db_pool).await.map_err(|e| {
        tracing::error!("Error fetching billing summary: {}", e);
        ApiError::internal("Failed to fetch billing summary")
    })?;

    Ok(rows
        .into_iter()
        .map(|row| StatusBucket {
            status: row.get("status"),
            documents: row.get("documents"),
            total_amount: row.get("total_amount"),
        })
        .collect())
}
