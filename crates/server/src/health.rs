use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use tablevoice_core::calendar::ReservationFilter;

use crate::api::ApiState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub calendar: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let calendar = calendar_check(&state).await;
    let ready = calendar.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tablevoice-server runtime initialized".to_string(),
        },
        calendar,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn calendar_check(state: &ApiState) -> HealthCheck {
    match state.calendar.list_reservations(ReservationFilter::default()).await {
        Ok(reservations) => HealthCheck {
            status: "ready",
            detail: format!("calendar reachable, {} reservations held", reservations.len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("calendar query failed: {error}") }
        }
    }
}
