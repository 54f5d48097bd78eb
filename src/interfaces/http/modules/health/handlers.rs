//! Health check handler

use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::interfaces::http::middleware::HEALTH_PATH;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db: DatabaseConnection,
}

/// Service health response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// UP or DOWN
    pub status: String,
}

pub fn routes(state: HealthState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/actuator/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let ping = state.db.execute(Statement::from_string(
        state.db.get_database_backend(),
        "SELECT 1".to_string(),
    ));

    let healthy = match tokio::time::timeout(DB_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Health check: database ping failed");
            false
        }
        Err(_) => {
            warn!("Health check: database ping timed out");
            false
        }
    };

    let (status, label) = if healthy {
        (StatusCode::OK, "UP")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DOWN")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
        }),
    )
}
