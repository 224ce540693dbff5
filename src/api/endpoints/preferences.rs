//! Per-patient configuration: time preferences and grace periods.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{caller_id, ApiContext};
use crate::db::repository::{grace as grace_repo, preferences};
use crate::models::grace::GracePeriodConfig;
use crate::models::preferences::{FrequencyMapping, PatientTimePreferences, TimeBucket};
use crate::scheduling::validation::{validate_grace_config, validate_preferences};

/// GET /patients/:id/time-preferences
pub async fn get_time_preferences(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PatientTimePreferences>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &patient_id)?;
    let conn = ctx.open_db()?;
    preferences::get_preferences(&conn, &patient_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("time preferences {patient_id}")))
}

#[derive(Debug, Deserialize)]
pub struct PreferencesUpdate {
    pub buckets: Vec<TimeBucket>,
    pub frequency_mapping: FrequencyMapping,
    pub wake_time: NaiveTime,
    pub sleep_time: NaiveTime,
    pub timezone: String,
}

/// PUT /patients/:id/time-preferences
///
/// Validates the incoming shape, bumps the stored version, and persists. The
/// version bump is what makes stale future events regenerate on the next
/// generation cycle.
pub async fn put_time_preferences(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PreferencesUpdate>,
) -> Result<Json<PatientTimePreferences>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &patient_id)?;
    let conn = ctx.open_db()?;

    let version = match preferences::get_preferences(&conn, &patient_id)? {
        Some(existing) => existing.version + 1,
        None => 1,
    };
    let candidate = PatientTimePreferences {
        patient_id: patient_id.clone(),
        version,
        buckets: body.buckets,
        frequency_mapping: body.frequency_mapping,
        wake_time: body.wake_time,
        sleep_time: body.sleep_time,
        timezone: body.timezone,
    };

    let report = validate_preferences(&candidate);
    if !report.is_ok() {
        return Err(ApiError::Validation(report));
    }

    preferences::upsert_preferences(&conn, &candidate)?;
    Ok(Json(candidate))
}

/// GET /patients/:id/grace-config
///
/// Always answers; a patient with no stored row gets the system defaults.
pub async fn get_grace_config(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GracePeriodConfig>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &patient_id)?;
    let conn = ctx.open_db()?;
    Ok(Json(grace_repo::get_grace_config(&conn, &patient_id)?))
}

#[derive(Debug, Deserialize)]
pub struct GraceConfigUpdate {
    pub default_minutes: i64,
    #[serde(default)]
    pub bucket_defaults: BTreeMap<String, i64>,
    #[serde(default)]
    pub class_overrides: BTreeMap<String, i64>,
    #[serde(default)]
    pub medication_overrides: BTreeMap<String, i64>,
    pub weekend_multiplier: f64,
    pub holiday_multiplier: f64,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

/// PUT /patients/:id/grace-config
pub async fn put_grace_config(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<GraceConfigUpdate>,
) -> Result<Json<GracePeriodConfig>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &patient_id)?;

    let candidate = GracePeriodConfig {
        patient_id: patient_id.clone(),
        default_minutes: body.default_minutes,
        bucket_defaults: body.bucket_defaults,
        class_overrides: body.class_overrides,
        medication_overrides: body.medication_overrides,
        weekend_multiplier: body.weekend_multiplier,
        holiday_multiplier: body.holiday_multiplier,
        holidays: body.holidays,
        updated_at: Utc::now(),
    };

    let report = validate_grace_config(&candidate);
    if !report.is_ok() {
        return Err(ApiError::Validation(report));
    }

    let conn = ctx.open_db()?;
    grace_repo::upsert_grace_config(&conn, &candidate)?;
    Ok(Json(candidate))
}
