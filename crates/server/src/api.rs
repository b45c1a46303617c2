//! HTTP surface for the reservation service.
//!
//! Endpoints:
//! - `GET    /`                    — service banner
//! - `GET    /health`              — readiness payload (see `health`)
//! - `POST   /availability`        — check a slot for a party size
//! - `POST   /reservations`        — create a reservation
//! - `GET    /reservations`        — list reservations (admin view; `?date=&status=`)
//! - `DELETE /reservations/{id}`   — cancel a reservation
//! - `POST   /call-events`         — voice-provider webhook; forwards the call
//!   transcript to the agent loop and returns its spoken reply
//!
//! Error mapping: invalid input 400, unknown id 404, full slot and repeat
//! cancellation 409, model transport failure 502. Every error body carries a
//! `message` phrased for voice narration.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use tablevoice_agent::runtime::{AgentRuntime, TranscriptTurn};
use tablevoice_core::calendar::{Calendar, ReservationFilter};
use tablevoice_core::domain::reservation::{
    BookingRequest, Reservation, ReservationId, ReservationStatus, Slot,
};
use tablevoice_core::errors::{ApplicationError, DomainError};

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    pub calendar: Arc<dyn Calendar>,
    pub agent: Arc<AgentRuntime>,
    pub restaurant_name: String,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub date: String,
    pub time: String,
    pub party_size: u32,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub name: String,
    pub party_size: u32,
    pub date: String,
    pub time: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: String,
    pub name: String,
    pub party_size: u32,
    pub date: String,
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: ReservationStatus,
    pub created_at: String,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id.to_string(),
            name: reservation.name,
            party_size: reservation.party_size,
            date: reservation.slot.date.format(Slot::DATE_FORMAT).to_string(),
            time: reservation.slot.time.format(Slot::TIME_FORMAT).to_string(),
            phone: reservation.phone,
            status: reservation.status,
            created_at: reservation.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub reservations: Vec<ReservationResponse>,
}

/// Call-session event from the voice provider. The transcript is handed to
/// the agent loop exactly as received.
#[derive(Debug, Deserialize)]
pub struct CallEventRequest {
    pub call_id: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
}

#[derive(Debug, Serialize)]
pub struct CallEventResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

type ErrorResponse = (StatusCode, Json<ErrorBody>);

fn domain_error_response(error: DomainError) -> ErrorResponse {
    let (status, tag) = match &error {
        DomainError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::SlotUnavailable(_) => (StatusCode::CONFLICT, "slot_unavailable"),
        DomainError::AlreadyCancelled(_) => (StatusCode::CONFLICT, "already_cancelled"),
    };
    (status, Json(ErrorBody { error: tag, message: error.user_message() }))
}

fn application_error_response(error: ApplicationError) -> ErrorResponse {
    match error {
        ApplicationError::Domain(domain) => domain_error_response(domain),
        ApplicationError::Integration(detail) => {
            warn!(event_name = "api.integration_failure", detail = %detail, "upstream failure");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody {
                    error: "integration_error",
                    message: ApplicationError::Integration(detail).user_message(),
                }),
            )
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: "internal_error", message: other.user_message() }),
        ),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::health))
        .route("/availability", post(check_availability))
        .route("/reservations", post(create_reservation).get(list_reservations))
        .route("/reservations/{id}", delete(cancel_reservation))
        .route("/call-events", post(call_event))
        // The voice provider's dashboard calls this API from the browser.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root(State(state): State<ApiState>) -> Json<BannerResponse> {
    Json(BannerResponse {
        message: format!("Welcome to {} reservations", state.restaurant_name),
        status: "operational",
    })
}

async fn check_availability(
    State(state): State<ApiState>,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, ErrorResponse> {
    let slot = Slot::parse(&request.date, &request.time).map_err(domain_error_response)?;
    let availability = state
        .calendar
        .check_availability(slot, request.party_size)
        .await
        .map_err(domain_error_response)?;
    Ok(Json(AvailabilityResponse {
        available: availability.available,
        reason: availability.reason,
    }))
}

async fn create_reservation(
    State(state): State<ApiState>,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ErrorResponse> {
    let slot = Slot::parse(&request.date, &request.time).map_err(domain_error_response)?;
    let reservation = state
        .calendar
        .create_reservation(BookingRequest {
            name: request.name,
            party_size: request.party_size,
            slot,
            phone: request.phone,
        })
        .await
        .map_err(domain_error_response)?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

async fn cancel_reservation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ErrorResponse> {
    let reservation = state
        .calendar
        .cancel_reservation(&ReservationId(id))
        .await
        .map_err(domain_error_response)?;
    Ok(Json(reservation.into()))
}

async fn list_reservations(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ErrorResponse> {
    let filter = parse_filter(&query).map_err(domain_error_response)?;
    let reservations = state
        .calendar
        .list_reservations(filter)
        .await
        .map_err(domain_error_response)?;
    Ok(Json(ListResponse {
        reservations: reservations.into_iter().map(ReservationResponse::from).collect(),
    }))
}

fn parse_filter(query: &ListQuery) -> Result<ReservationFilter, DomainError> {
    let date = query
        .date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, Slot::DATE_FORMAT).map_err(|_| {
                DomainError::InvalidRequest(format!(
                    "`{raw}` is not a valid date (expected YYYY-MM-DD)"
                ))
            })
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(DomainError::InvalidRequest(format!(
                "`{other}` is not a valid status (expected confirmed|cancelled)"
            ))),
        })
        .transpose()?;
    Ok(ReservationFilter { date, status })
}

async fn call_event(
    State(state): State<ApiState>,
    Json(request): Json<CallEventRequest>,
) -> Result<Json<CallEventResponse>, ErrorResponse> {
    info!(
        event_name = "api.call_event.received",
        call_id = %request.call_id,
        event = %request.event,
        transcript_turns = request.transcript.len(),
        "call event received"
    );

    let response = state
        .agent
        .reply(&request.call_id, &request.transcript)
        .await
        .map_err(application_error_response)?;
    Ok(Json(CallEventResponse { response }))
}
