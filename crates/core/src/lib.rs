pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;

pub use calendar::{Availability, Calendar, InMemoryCalendar, ReservationFilter, SlotPolicy};
pub use domain::reservation::{
    BookingRequest, Reservation, ReservationId, ReservationStatus, Slot,
};
pub use errors::{ApplicationError, DomainError};
