use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub String);

impl ReservationId {
    /// Ids are never reused, even after cancellation.
    pub fn generate() -> Self {
        Self(format!("RES-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

/// A bookable `(date, time)` pair at the restaurant's booking granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl Slot {
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";
    pub const TIME_FORMAT: &'static str = "%H:%M";

    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    /// Parses the wire representation used by both the HTTP API and the
    /// agent tools (`2024-06-01` / `19:00`).
    pub fn parse(date: &str, time: &str) -> Result<Self, DomainError> {
        let date = NaiveDate::parse_from_str(date.trim(), Self::DATE_FORMAT).map_err(|_| {
            DomainError::InvalidRequest(format!("`{date}` is not a valid date (expected YYYY-MM-DD)"))
        })?;
        let time = NaiveTime::parse_from_str(time.trim(), Self::TIME_FORMAT).map_err(|_| {
            DomainError::InvalidRequest(format!("`{time}` is not a valid time (expected HH:MM)"))
        })?;
        Ok(Self { date, time })
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}",
            self.date.format(Self::DATE_FORMAT),
            self.time.format(Self::TIME_FORMAT)
        )
    }
}

/// Validated input for `Calendar::create_reservation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    pub name: String,
    pub party_size: u32,
    pub slot: Slot,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub name: String,
    pub party_size: u32,
    pub slot: Slot,
    pub phone: Option<String>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn confirmed(request: BookingRequest) -> Self {
        Self {
            id: ReservationId::generate(),
            name: request.name,
            party_size: request.party_size,
            slot: request.slot,
            phone: request.phone,
            status: ReservationStatus::Confirmed,
            created_at: Utc::now(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    /// The only permitted mutation: confirmed -> cancelled. Cancelling an
    /// already-cancelled reservation is an idempotent-safe signal, not a
    /// hard failure.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        match self.status {
            ReservationStatus::Confirmed => {
                self.status = ReservationStatus::Cancelled;
                Ok(())
            }
            ReservationStatus::Cancelled => Err(DomainError::AlreadyCancelled(self.id.clone())),
        }
    }
}
