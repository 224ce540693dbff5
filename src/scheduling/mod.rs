//! The scheduling core: frequency normalization, schedule compilation,
//! grace-period resolution, validation, the dose lifecycle, and event
//! generation. Everything here is either pure or talks to the store through
//! `db::repository`; no in-process scheduling state is kept anywhere.

pub mod compiler;
pub mod frequency;
pub mod generator;
pub mod grace;
pub mod lifecycle;
pub mod validation;

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::preferences::PatientTimePreferences;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Unsupported frequency: {0:?}")]
    UnsupportedFrequency(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Patient {patient_id} has a missing or invalid timezone")]
    MissingTimezone { patient_id: String },

    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Access denied for caller {caller}")]
    AccessDenied { caller: String },

    #[error("Dose event {id} is no longer in the scheduled state")]
    TransitionConflict { id: Uuid },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Resolve a patient's IANA timezone. An unset or unparseable zone is a
/// `MissingTimezone` error — never a silent UTC fallback.
pub fn patient_timezone(prefs: &PatientTimePreferences) -> Result<Tz, SchedulingError> {
    if prefs.timezone.trim().is_empty() {
        return Err(SchedulingError::MissingTimezone {
            patient_id: prefs.patient_id.clone(),
        });
    }
    Tz::from_str(&prefs.timezone).map_err(|_| SchedulingError::MissingTimezone {
        patient_id: prefs.patient_id.clone(),
    })
}

/// Map a patient-local wall-clock instant to UTC.
///
/// DST fold: the earliest of the two valid instants wins. DST gap: walk
/// forward in 15-minute steps to the first instant that exists.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = local;
    for _ in 0..12 {
        if let Some(resolved) = tz.from_local_datetime(&candidate).earliest() {
            return resolved.with_timezone(&Utc);
        }
        candidate += Duration::minutes(15);
    }
    // Three hours past any real DST gap; not reachable for IANA zones
    Utc.from_utc_datetime(&candidate)
}

/// The patient-local calendar date of a UTC instant.
pub fn local_date_of(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// The UTC `[start, end)` window of one patient-local calendar day.
pub fn local_day_bounds(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap();
    let next_midnight = (date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap();
    (local_to_utc(tz, midnight), local_to_utc(tz, next_midnight))
}
