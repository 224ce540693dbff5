//! Timezone-aware medication dose scheduling and tracking.
//!
//! The core loop: schedules compile against per-patient time preferences
//! into concrete dose events over a rolling horizon; patients and caregivers
//! act on events through the HTTP API; background tasks detect missed doses
//! and roll completed local days into immutable daily summaries.

pub mod access;
pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod scheduling;
pub mod tasks;
pub mod views;
