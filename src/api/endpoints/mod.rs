pub mod events;
pub mod health;
pub mod preferences;
pub mod schedules;
pub mod views;
