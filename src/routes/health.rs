use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub redis: String,
    pub llm: String,
    pub dropbox: String,
    pub xero: String,
}

fn ok_or_error(ok: bool) -> String {
    if ok { "ok" } else { "error" }.to_string()
}

fn configured(yes: bool) -> String {
    if yes { "configured" } else { "not_configured" }.to_string()
}

/// Overall status: the database is critical, everything else degrades
fn overall_status(database: bool, redis: bool, llm: bool) -> (&'static str, StatusCode) {
    match (database, redis && llm) {
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_ok, redis_result, llm_result) = tokio::join!(
        db::health_check(&state.db),
        state.cache.health_check(),
        state.llm_client.health_check(),
    );

    let (status, status_code) = overall_status(db_ok, redis_result.is_ok(), llm_result.is_ok());

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: ok_or_error(db_ok),
                redis: ok_or_error(redis_result.is_ok()),
                llm: ok_or_error(llm_result.is_ok()),
                dropbox: configured(state.dropbox.is_configured()),
                xero: configured(state.xero.is_some()),
            },
        }),
    )
}
