pub mod accounting;

use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use crate::AppState;
use crate::config::AccountingConfig;
use accounting::{AccountingProvider, HttpAccountingProvider, OfflineAccountingProvider};

/// Pick the active accounting provider from configuration. Unconfigured
/// deployments fall back to the offline provider so sync endpoints stay
/// functional.
pub fn build_provider(config: &AccountingConfig) -> Arc<dyn AccountingProvider> {
    if config.is_configured() {
        tracing::info!(base_url = %config.base_url, "accounting sync enabled");
        Arc::new(HttpAccountingProvider::new(config))
    } else {
        tracing::info!("accounting sync not configured, using offline provider");
        Arc::new(OfflineAccountingProvider)
    }
}

pub fn accounting_routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(accounting_status))
}

async fn accounting_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connected = state.accounting.is_connected().await;
    Json(serde_json::json!({
        "provider": state.accounting.name(),
        "connected": connected,
    }))
}
