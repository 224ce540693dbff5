//! Read-model assembly for the API surface.

pub mod today;
