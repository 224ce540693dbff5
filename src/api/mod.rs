//! HTTP surface: a composable axum `Router` over the scheduling core.
//!
//! Handlers are thin: extract the caller, check access, open the store, call
//! into `scheduling`/`views`, map errors. No business rules live here.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod types;
