//! The reservation tool adapter.
//!
//! Each tool parses the model's free-form JSON arguments into a typed
//! request before anything touches the calendar store, and translates every
//! store error into a `{status, message}` value the agent can narrate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use tablevoice_core::domain::reservation::{BookingRequest, ReservationId, Slot};
use tablevoice_core::errors::DomainError;
use tablevoice_core::Calendar;

use crate::tools::{Tool, ToolRegistry, ToolSpec};

pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const BOOK_TABLE: &str = "book_table";
pub const CANCEL_RESERVATION: &str = "cancel_reservation";

/// Registers the three calendar tools against one shared store.
pub fn register_reservation_tools(registry: &mut ToolRegistry, calendar: Arc<dyn Calendar>) {
    registry.register(CheckAvailabilityTool { calendar: Arc::clone(&calendar) });
    registry.register(BookTableTool { calendar: Arc::clone(&calendar) });
    registry.register(CancelReservationTool { calendar });
}

fn reply(status: &str, message: impl Into<String>) -> Value {
    json!({ "status": status, "message": message.into() })
}

fn parse_args<T: DeserializeOwned>(input: Value) -> Result<T, Value> {
    serde_json::from_value(input)
        .map_err(|error| reply("error", format!("could not understand the request: {error}")))
}

fn domain_reply(error: DomainError) -> Value {
    match &error {
        DomainError::SlotUnavailable(_) => reply("unavailable", error.user_message()),
        DomainError::NotFound(_) => reply("not_found", error.user_message()),
        // Idempotent-safe: the reservation is cancelled either way.
        DomainError::AlreadyCancelled(_) => reply("cancelled", error.user_message()),
        DomainError::InvalidRequest(_) => reply("error", error.user_message()),
    }
}

fn format_times(times: &[chrono::NaiveTime]) -> Vec<String> {
    times.iter().map(|time| time.format(Slot::TIME_FORMAT).to_string()).collect()
}

#[derive(Debug, Deserialize)]
struct CheckAvailabilityArgs {
    date: String,
    time: String,
    party_size: u32,
}

pub struct CheckAvailabilityTool {
    calendar: Arc<dyn Calendar>,
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CHECK_AVAILABILITY,
            description: "Check table availability for a date, time, and party size.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Date as YYYY-MM-DD" },
                    "time": { "type": "string", "description": "Time as HH:MM, 24-hour" },
                    "party_size": { "type": "integer", "description": "Number of guests" }
                },
                "required": ["date", "time", "party_size"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: CheckAvailabilityArgs = match parse_args(input) {
            Ok(args) => args,
            Err(error_value) => return Ok(error_value),
        };
        let slot = match Slot::parse(&args.date, &args.time) {
            Ok(slot) => slot,
            Err(error) => return Ok(domain_reply(error)),
        };

        match self.calendar.check_availability(slot, args.party_size).await {
            Ok(availability) if availability.available => Ok(reply(
                "available",
                format!("A table for {} on {slot} is available.", args.party_size),
            )),
            Ok(availability) => {
                let suggested = self
                    .calendar
                    .available_times(slot.date, args.party_size)
                    .await
                    .unwrap_or_default();
                let reason =
                    availability.reason.unwrap_or_else(|| "that slot is taken".to_string());
                let mut value = reply("unavailable", format!("Sorry, {reason}."));
                value["suggested_times"] = json!(format_times(&suggested));
                Ok(value)
            }
            Err(error) => Ok(domain_reply(error)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BookTableArgs {
    name: String,
    party_size: u32,
    date: String,
    time: String,
    phone: Option<String>,
}

pub struct BookTableTool {
    calendar: Arc<dyn Calendar>,
}

#[async_trait]
impl Tool for BookTableTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: BOOK_TABLE,
            description: "Book a table once the guest has confirmed name, date, time, and party size.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Guest name" },
                    "party_size": { "type": "integer", "description": "Number of guests" },
                    "date": { "type": "string", "description": "Date as YYYY-MM-DD" },
                    "time": { "type": "string", "description": "Time as HH:MM, 24-hour" },
                    "phone": { "type": "string", "description": "Contact phone number, optional" }
                },
                "required": ["name", "party_size", "date", "time"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: BookTableArgs = match parse_args(input) {
            Ok(args) => args,
            Err(error_value) => return Ok(error_value),
        };
        let slot = match Slot::parse(&args.date, &args.time) {
            Ok(slot) => slot,
            Err(error) => return Ok(domain_reply(error)),
        };

        let request = BookingRequest {
            name: args.name.clone(),
            party_size: args.party_size,
            slot,
            phone: args.phone,
        };
        match self.calendar.create_reservation(request).await {
            Ok(reservation) => {
                let mut value = reply(
                    "confirmed",
                    format!(
                        "Reservation confirmed for {} on {slot}, party of {}.",
                        reservation.name, reservation.party_size
                    ),
                );
                value["reservation_id"] = json!(reservation.id.to_string());
                Ok(value)
            }
            Err(error) => Ok(domain_reply(error)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CancelReservationArgs {
    reservation_id: String,
}

pub struct CancelReservationTool {
    calendar: Arc<dyn Calendar>,
}

#[async_trait]
impl Tool for CancelReservationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CANCEL_RESERVATION,
            description: "Cancel an existing reservation by its confirmation number.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "reservation_id": { "type": "string", "description": "Confirmation number, e.g. RES-..." }
                },
                "required": ["reservation_id"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args: CancelReservationArgs = match parse_args(input) {
            Ok(args) => args,
            Err(error_value) => return Ok(error_value),
        };

        let id = ReservationId(args.reservation_id);
        match self.calendar.cancel_reservation(&id).await {
            Ok(reservation) => Ok(reply(
                "cancelled",
                format!("The reservation for {} on {} is cancelled.", reservation.name, reservation.slot),
            )),
            Err(error) => Ok(domain_reply(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use tablevoice_core::calendar::{InMemoryCalendar, SlotPolicy};
    use tablevoice_core::Calendar;

    use crate::tools::ToolRegistry;

    use super::register_reservation_tools;

    fn registry() -> (ToolRegistry, Arc<InMemoryCalendar>) {
        let calendar = Arc::new(InMemoryCalendar::new(SlotPolicy::default()));
        let mut registry = ToolRegistry::default();
        register_reservation_tools(&mut registry, calendar.clone() as Arc<dyn Calendar>);
        (registry, calendar)
    }

    #[tokio::test]
    async fn exposes_the_three_reservation_tools() {
        let (registry, _) = registry();
        let names: Vec<_> = registry.specs().iter().map(|spec| spec.name).collect();
        assert_eq!(names, ["book_table", "cancel_reservation", "check_availability"]);
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_status() {
        let (registry, _) = registry();
        let result = registry
            .dispatch("check_availability", json!({"date": "2999-06-01"}))
            .await;
        assert_eq!(result["status"], "error");
    }

    #[tokio::test]
    async fn invalid_date_becomes_error_status() {
        let (registry, _) = registry();
        let result = registry
            .dispatch(
                "check_availability",
                json!({"date": "someday", "time": "19:00", "party_size": 2}),
            )
            .await;
        assert_eq!(result["status"], "error");
        assert!(result["message"].as_str().expect("message").contains("someday"));
    }

    #[tokio::test]
    async fn booking_round_trip_through_tools() {
        let (registry, _) = registry();

        let open = registry
            .dispatch(
                "check_availability",
                json!({"date": "2999-06-01", "time": "19:00", "party_size": 4}),
            )
            .await;
        assert_eq!(open["status"], "available");

        let booked = registry
            .dispatch(
                "book_table",
                json!({
                    "name": "John Doe",
                    "party_size": 4,
                    "date": "2999-06-01",
                    "time": "19:00",
                    "phone": "+1234567890"
                }),
            )
            .await;
        assert_eq!(booked["status"], "confirmed");
        let reservation_id =
            booked["reservation_id"].as_str().expect("confirmed booking carries an id").to_string();

        let full = registry
            .dispatch(
                "check_availability",
                json!({"date": "2999-06-01", "time": "19:00", "party_size": 2}),
            )
            .await;
        assert_eq!(full["status"], "unavailable");
        let suggested = full["suggested_times"].as_array().expect("suggestions are listed");
        assert!(!suggested.iter().any(|time| time == "19:00"));

        let rebook = registry
            .dispatch(
                "book_table",
                json!({"name": "Jane Roe", "party_size": 2, "date": "2999-06-01", "time": "19:00"}),
            )
            .await;
        assert_eq!(rebook["status"], "unavailable");

        let cancelled = registry
            .dispatch("cancel_reservation", json!({"reservation_id": reservation_id}))
            .await;
        assert_eq!(cancelled["status"], "cancelled");

        // Cancelling again is an idempotent-safe signal, still "cancelled".
        let again = registry
            .dispatch("cancel_reservation", json!({"reservation_id": reservation_id}))
            .await;
        assert_eq!(again["status"], "cancelled");
        assert!(again["message"].as_str().expect("message").contains("already"));
    }

    #[tokio::test]
    async fn cancelling_unknown_reservation_is_not_found() {
        let (registry, _) = registry();
        let result = registry
            .dispatch("cancel_reservation", json!({"reservation_id": "RES-unknown"}))
            .await;
        assert_eq!(result["status"], "not_found");
    }

    #[tokio::test]
    async fn zero_party_size_is_an_error_not_a_booking() {
        let (registry, calendar) = registry();
        let result = registry
            .dispatch(
                "book_table",
                json!({"name": "John Doe", "party_size": 0, "date": "2999-06-01", "time": "19:00"}),
            )
            .await;
        assert_eq!(result["status"], "error");

        let all = calendar
            .list_reservations(Default::default())
            .await
            .expect("list should succeed");
        assert!(all.is_empty());
    }
}
