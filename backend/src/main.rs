use axum::{
    Router,
    http::Method,
    routing::get,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod billing;
mod config;
mod database;
mod error;
mod handlers;
mod integrations;
mod pagination;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub accounting: Arc<dyn integrations::accounting::AccountingProvider>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let accounting = integrations::build_provider(&config.accounting);
    let app_state = Arc::new(AppState { db_pool, accounting });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Linehaul TMS API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .route("/api/v1/billing/summary", get(handlers::billing_summary))
        .nest("/api/v1/jobs", handlers::job_routes())
        .nest("/api/v1/billing-notes", handlers::billing_note_routes())
        .nest("/api/v1/driver-payments", handlers::driver_payment_routes())
        .nest("/api/v1/accounting", integrations::accounting_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
