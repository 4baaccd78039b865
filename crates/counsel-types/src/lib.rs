//! Shared types for the counsel directory engine.
//!
//! Wire DTOs live in `api`, provider and in-process events in `events`,
//! and the closed domain vocabularies (reasons, kinds, statuses) in `models`.

pub mod api;
pub mod events;
pub mod models;
