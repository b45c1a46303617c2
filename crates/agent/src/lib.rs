//! Agent runtime - tool-calling conversation loop over the reservation calendar
//!
//! This crate is the seam between the untyped, possibly malformed output of a
//! conversational model and the strongly validated calendar store:
//!
//! 1. **Tool contract** (`tools`) - the `Tool` trait and registry the model
//!    calls into; a malformed tool call becomes a structured error value,
//!    never an unhandled failure.
//! 2. **Reservation tools** (`reservation`) - check availability, book a
//!    table, cancel a reservation.
//! 3. **Model transport** (`llm`) - pluggable `LlmClient` trait plus an
//!    OpenAI-compatible chat-completions client.
//! 4. **Loop** (`runtime`) - bounded call/respond loop that turns a call
//!    transcript into a single narratable reply.
//!
//! # Safety Principle
//!
//! The model only ever selects tools and phrases replies. Availability,
//! capacity, and reservation state are decided by the calendar store alone.

pub mod llm;
pub mod reservation;
pub mod runtime;
pub mod tools;
