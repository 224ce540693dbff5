//! Schedule lifecycle: create, pause, resume.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{caller_id, ApiContext};
use crate::db::repository::{events, grace as grace_repo, preferences, schedules};
use crate::models::schedule::MedicationSchedule;
use crate::scheduling::frequency::normalize_frequency;
use crate::scheduling::generator::{generate_for_schedule, DEFAULT_HORIZON_DAYS};

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub patient_id: String,
    pub medication_id: String,
    pub medication_class: Option<String>,
    pub frequency: String,
    /// Per-bucket `HH:MM` overrides.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct CreateScheduleResponse {
    pub schedule: MedicationSchedule,
    pub events_created: usize,
    pub warnings: Vec<String>,
}

/// POST /medication-schedules
///
/// Creates the schedule and generates its events immediately so the first
/// doses appear without waiting for the next background cycle.
pub async fn create(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<CreateScheduleResponse>), ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &body.patient_id)?;

    let frequency = normalize_frequency(&body.frequency).map_err(ApiError::from)?;
    let overrides = schedules::parse_override_times(&body.overrides)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if let Some(end) = body.end_date {
        if end < body.start_date {
            return Err(ApiError::BadRequest(
                "end_date must not precede start_date".into(),
            ));
        }
    }

    let conn = ctx.open_db()?;
    let prefs = preferences::get_preferences(&conn, &body.patient_id)?
        .ok_or_else(|| ApiError::NotFound(format!("time preferences {}", body.patient_id)))?;

    let mut schedule =
        MedicationSchedule::new(&body.patient_id, &body.medication_id, frequency, body.start_date);
    schedule.medication_class = body.medication_class;
    schedule.overrides = overrides;
    schedule.end_date = body.end_date;
    schedule.preferences_version = prefs.version;
    schedules::insert_schedule(&conn, &schedule)?;

    let grace_config = grace_repo::get_grace_config(&conn, &body.patient_id)?;
    let outcome = generate_for_schedule(
        &conn,
        &schedule,
        &prefs,
        &grace_config,
        Utc::now(),
        DEFAULT_HORIZON_DAYS,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateScheduleResponse {
            schedule,
            events_created: outcome.created,
            warnings: outcome.warnings,
        }),
    ))
}

#[derive(Serialize)]
pub struct PauseResponse {
    pub schedule_id: Uuid,
    pub is_paused: bool,
    /// Future still-scheduled events removed by the pause.
    pub pruned: usize,
    /// Events created when resuming.
    pub events_created: usize,
}

fn load_schedule(
    conn: &rusqlite::Connection,
    id: &Uuid,
) -> Result<MedicationSchedule, ApiError> {
    schedules::get_schedule(conn, id)?
        .ok_or_else(|| ApiError::NotFound(format!("medication schedule {id}")))
}

/// POST /medication-schedules/:id/pause
///
/// Prunes future still-scheduled events; acted-upon and past events are left
/// alone for the historical record.
pub async fn pause(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PauseResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let conn = ctx.open_db()?;
    let schedule = load_schedule(&conn, &id)?;
    ctx.require_access(&caller, &schedule.patient_id)?;

    schedules::set_schedule_paused(&conn, &id, true)?;
    let pruned = events::delete_future_scheduled_events(&conn, &id, Utc::now())?;
    Ok(Json(PauseResponse {
        schedule_id: id,
        is_paused: true,
        pruned,
        events_created: 0,
    }))
}

/// POST /medication-schedules/:id/resume
///
/// Unpauses and regenerates immediately so upcoming doses reappear.
pub async fn resume(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PauseResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let conn = ctx.open_db()?;
    let schedule = load_schedule(&conn, &id)?;
    ctx.require_access(&caller, &schedule.patient_id)?;

    schedules::set_schedule_paused(&conn, &id, false)?;
    let schedule = load_schedule(&conn, &id)?;

    let prefs = preferences::get_preferences(&conn, &schedule.patient_id)?.ok_or_else(|| {
        ApiError::NotFound(format!("time preferences {}", schedule.patient_id))
    })?;
    let grace_config = grace_repo::get_grace_config(&conn, &schedule.patient_id)?;
    let outcome = generate_for_schedule(
        &conn,
        &schedule,
        &prefs,
        &grace_config,
        Utc::now(),
        DEFAULT_HORIZON_DAYS,
    )?;

    Ok(Json(PauseResponse {
        schedule_id: id,
        is_paused: false,
        pruned: 0,
        events_created: outcome.created,
    }))
}
