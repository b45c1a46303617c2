//! Slot availability and reservation bookkeeping.
//!
//! The in-memory calendar is the single source of truth for a running
//! process. It holds every reservation ever created (cancelled rows are
//! retained, never deleted) and serializes check-then-book behind one lock
//! so concurrent bookings can never overshoot a slot's capacity.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use tracing::info;

use crate::domain::reservation::{
    BookingRequest, Reservation, ReservationId, ReservationStatus, Slot,
};
use crate::errors::DomainError;

/// Booking rules for a single restaurant.
///
/// Capacity and max party size are deliberately configuration, not
/// constants; see `RestaurantConfig` for the values that seed them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotPolicy {
    /// Confirmed reservations permitted per slot.
    pub capacity: u32,
    pub max_party_size: u32,
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub slot_minutes: u32,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self { capacity: 1, max_party_size: 8, opening_hour: 11, closing_hour: 22, slot_minutes: 30 }
    }
}

impl SlotPolicy {
    fn validate_slot(&self, slot: &Slot) -> Result<(), DomainError> {
        if slot.time.minute() % self.slot_minutes != 0 || slot.time.second() != 0 {
            return Err(DomainError::InvalidRequest(format!(
                "times must fall on {}-minute boundaries",
                self.slot_minutes
            )));
        }
        if slot.time.hour() < self.opening_hour || slot.time.hour() >= self.closing_hour {
            return Err(DomainError::InvalidRequest(format!(
                "the restaurant takes bookings between {:02}:00 and {:02}:00",
                self.opening_hour, self.closing_hour
            )));
        }
        if slot.starts_at() < Utc::now().naive_utc() {
            return Err(DomainError::InvalidRequest(format!("{slot} is in the past")));
        }
        Ok(())
    }

    fn validate_party_size(&self, party_size: u32) -> Result<(), DomainError> {
        if party_size == 0 {
            return Err(DomainError::InvalidRequest(
                "party size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Every bookable time of a day, in order.
    fn day_slots(&self) -> Vec<NaiveTime> {
        let mut times = Vec::new();
        let mut minutes = self.opening_hour * 60;
        while minutes < self.closing_hour * 60 {
            if let Some(time) = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0) {
                times.push(time);
            }
            minutes += self.slot_minutes;
        }
        times
    }
}

/// Outcome of an availability query. `reason` is set whenever the slot
/// cannot take the party, phrased for voice narration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub reason: Option<String>,
}

impl Availability {
    fn open() -> Self {
        Self { available: true, reason: None }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self { available: false, reason: Some(reason.into()) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.date.map_or(true, |date| reservation.slot.date == date)
            && self.status.map_or(true, |status| reservation.status == status)
    }
}

/// The store seam. The in-memory calendar and any future durable backend
/// are interchangeable behind this trait.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Read-only occupancy check. Available iff confirmed occupancy is
    /// below capacity and the party fits the largest table.
    async fn check_availability(
        &self,
        slot: Slot,
        party_size: u32,
    ) -> Result<Availability, DomainError>;

    /// Re-validates availability atomically with insertion, so a caller
    /// that raced another booking gets `SlotUnavailable` instead of an
    /// overbooked slot.
    async fn create_reservation(&self, request: BookingRequest)
        -> Result<Reservation, DomainError>;

    async fn cancel_reservation(&self, id: &ReservationId) -> Result<Reservation, DomainError>;

    /// Consistent snapshot in insertion order.
    async fn list_reservations(
        &self,
        filter: ReservationFilter,
    ) -> Result<Vec<Reservation>, DomainError>;

    /// Free slots of a day that could seat the party, for suggesting
    /// alternatives when the requested time is taken.
    async fn available_times(
        &self,
        date: NaiveDate,
        party_size: u32,
    ) -> Result<Vec<NaiveTime>, DomainError>;
}

pub struct InMemoryCalendar {
    policy: SlotPolicy,
    // Sole shared mutable state; never held across an await.
    records: Mutex<Vec<Reservation>>,
}

impl InMemoryCalendar {
    pub fn new(policy: SlotPolicy) -> Self {
        Self { policy, records: Mutex::new(Vec::new()) }
    }

    pub fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Vec<Reservation>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn occupancy(records: &[Reservation], slot: &Slot) -> u32 {
        records.iter().filter(|r| r.is_confirmed() && r.slot == *slot).count() as u32
    }

    fn slot_availability(&self, records: &[Reservation], slot: &Slot, party_size: u32) -> Availability {
        if party_size > self.policy.max_party_size {
            return Availability::blocked(format!(
                "we can seat parties of up to {} guests",
                self.policy.max_party_size
            ));
        }
        if Self::occupancy(records, slot) >= self.policy.capacity {
            return Availability::blocked(format!("all tables at {slot} are booked"));
        }
        Availability::open()
    }
}

#[async_trait]
impl Calendar for InMemoryCalendar {
    async fn check_availability(
        &self,
        slot: Slot,
        party_size: u32,
    ) -> Result<Availability, DomainError> {
        self.policy.validate_party_size(party_size)?;
        self.policy.validate_slot(&slot)?;

        let records = self.locked();
        Ok(self.slot_availability(&records, &slot, party_size))
    }

    async fn create_reservation(
        &self,
        request: BookingRequest,
    ) -> Result<Reservation, DomainError> {
        if request.name.trim().is_empty() {
            return Err(DomainError::InvalidRequest("guest name must not be empty".to_string()));
        }
        if request.phone.as_deref().is_some_and(|phone| phone.trim().is_empty()) {
            return Err(DomainError::InvalidRequest(
                "phone number must not be empty when given".to_string(),
            ));
        }
        self.policy.validate_party_size(request.party_size)?;
        self.policy.validate_slot(&request.slot)?;

        // Check-then-insert is one critical section; this is what keeps
        // concurrent bookings from both passing the availability check.
        let mut records = self.locked();
        let availability = self.slot_availability(&records, &request.slot, request.party_size);
        if let Some(reason) = availability.reason {
            return Err(DomainError::SlotUnavailable(reason));
        }

        let reservation = Reservation::confirmed(request);
        records.push(reservation.clone());
        drop(records);

        info!(
            event_name = "calendar.reservation.created",
            reservation_id = %reservation.id,
            slot = %reservation.slot,
            party_size = reservation.party_size,
            "reservation confirmed"
        );
        Ok(reservation)
    }

    async fn cancel_reservation(&self, id: &ReservationId) -> Result<Reservation, DomainError> {
        let mut records = self.locked();
        let reservation =
            records.iter_mut().find(|r| r.id == *id).ok_or_else(|| DomainError::NotFound(id.clone()))?;
        reservation.cancel()?;
        let cancelled = reservation.clone();
        drop(records);

        info!(
            event_name = "calendar.reservation.cancelled",
            reservation_id = %cancelled.id,
            slot = %cancelled.slot,
            "reservation cancelled"
        );
        Ok(cancelled)
    }

    async fn list_reservations(
        &self,
        filter: ReservationFilter,
    ) -> Result<Vec<Reservation>, DomainError> {
        let records = self.locked();
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn available_times(
        &self,
        date: NaiveDate,
        party_size: u32,
    ) -> Result<Vec<NaiveTime>, DomainError> {
        self.policy.validate_party_size(party_size)?;

        let now = Utc::now().naive_utc();
        let records = self.locked();
        Ok(self
            .policy
            .day_slots()
            .into_iter()
            .filter(|time| {
                let slot = Slot::new(date, *time);
                slot.starts_at() > now
                    && self.slot_availability(&records, &slot, party_size).available
            })
            .collect())
    }
}
