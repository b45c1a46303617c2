use thiserror::Error;

use crate::domain::reservation::ReservationId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),
    #[error("reservation {0} not found")]
    NotFound(ReservationId),
    #[error("reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl DomainError {
    /// A message safe to hand to the voice agent for narration.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(reason) => {
                format!("I couldn't process that request: {reason}.")
            }
            Self::SlotUnavailable(reason) => {
                format!("That time is not available: {reason}.")
            }
            Self::NotFound(_) => {
                "I couldn't find a reservation with that confirmation number.".to_string()
            }
            Self::AlreadyCancelled(_) => {
                "That reservation has already been cancelled.".to_string()
            }
        }
    }
}

impl ApplicationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Domain(domain) => domain.user_message(),
            Self::Integration(_) => {
                "I'm having trouble reaching the booking system. Please try again in a moment."
                    .to_string()
            }
            Self::Configuration(_) => {
                "The booking system is misconfigured. Please call the restaurant directly."
                    .to_string()
            }
        }
    }
}
