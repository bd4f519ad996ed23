//! Health check handlers
//!
//! `/ready` fails when either the database or the deletion sweeper is down:
//! without the sweeper, due accounts stay frozen instead of being removed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use slate_core::SweeperStatus;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub deletion_sweeper: SweeperReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweeperReport {
    pub status: &'static str,
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl From<&SweeperStatus> for SweeperReport {
    fn from(status: &SweeperStatus) -> Self {
        Self {
            status: if status.is_running() { "running" } else { "stopped" },
            last_sweep_at: status.last_sweep_at(),
        }
    }
}

/// Process liveness
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Database connectivity and sweeper liveness
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database_up = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = ?e, "Database health check failed");
            false
        }
    };
    readiness(database_up, &state.sweeper)
}

fn readiness(database_up: bool, sweeper: &SweeperStatus) -> (StatusCode, Json<ReadyResponse>) {
    let sweeper_up = sweeper.is_running();
    if !sweeper_up {
        tracing::warn!("Deletion sweeper is not running");
    }

    let ready = database_up && sweeper_up;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "degraded" },
            database: if database_up { "connected" } else { "unreachable" },
            deletion_sweeper: SweeperReport::from(sweeper),
        }),
    )
}
