//! Dose-event actions and history reads.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{caller_id, ApiContext};
use crate::db::repository::{events, preferences, summaries};
use crate::models::event::DoseEvent;
use crate::models::summary::DailySummary;
use crate::scheduling::lifecycle::{plan_transition, DoseAction};
use crate::scheduling::{local_date_of, patient_timezone, SchedulingError};
use crate::tasks::daily_reset::archive_day;

#[derive(Debug, Deserialize)]
pub struct TakenRequest {
    /// Defaults to the server clock when absent.
    pub acted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub reason: String,
}

fn load_event(
    conn: &rusqlite::Connection,
    id: &Uuid,
) -> Result<DoseEvent, ApiError> {
    events::get_event(conn, id)?
        .ok_or_else(|| ApiError::NotFound(format!("dose event {id}")))
}

fn act_on_event(
    ctx: &ApiContext,
    headers: &HeaderMap,
    id: &Uuid,
    action_for: impl FnOnce(String) -> DoseAction,
) -> Result<Json<DoseEvent>, ApiError> {
    let caller = caller_id(headers)?;
    let conn = ctx.open_db()?;
    let event = load_event(&conn, id)?;
    ctx.require_access(&caller, &event.patient_id)?;

    let write = plan_transition(&event, &action_for(caller), Utc::now())
        .map_err(ApiError::from)?;
    if !events::apply_transition(&conn, id, &write)? {
        // Another writer won between the read and the guarded update
        return Err(SchedulingError::TransitionConflict { id: *id }.into());
    }
    Ok(Json(load_event(&conn, id)?))
}

/// POST /medication-events/:id/taken
pub async fn taken(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<TakenRequest>,
) -> Result<Json<DoseEvent>, ApiError> {
    act_on_event(&ctx, &headers, &id, |caller| DoseAction::MarkTaken {
        acted_by: caller,
        acted_at: body.acted_at,
        notes: body.notes.clone(),
    })
}

/// POST /medication-events/:id/skip
pub async fn skip(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SkipRequest>,
) -> Result<Json<DoseEvent>, ApiError> {
    let reason = body.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::BadRequest("skip reason must not be empty".into()));
    }
    act_on_event(&ctx, &headers, &id, |caller| DoseAction::Skip {
        acted_by: caller,
        reason,
    })
}

#[derive(Debug, Deserialize)]
pub struct ArchivedQuery {
    pub patient_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct ArchivedResponse {
    pub patient_id: String,
    pub events: Vec<DoseEvent>,
}

/// GET /medication-events/archived
pub async fn archived(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<ArchivedQuery>,
) -> Result<Json<ArchivedResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &query.patient_id)?;
    if query.end_date < query.start_date {
        return Err(ApiError::BadRequest(
            "end_date must not precede start_date".into(),
        ));
    }
    let conn = ctx.open_db()?;
    let events =
        events::list_archived_between(&conn, &query.patient_id, query.start_date, query.end_date)?;
    Ok(Json(ArchivedResponse {
        patient_id: query.patient_id,
        events,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub patient_id: String,
}

/// GET /medication-events/daily-summaries/:date
pub async fn daily_summary(
    State(ctx): State<ApiContext>,
    Path(date): Path<NaiveDate>,
    headers: HeaderMap,
    Query(query): Query<PatientQuery>,
) -> Result<Json<DailySummary>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &query.patient_id)?;
    let conn = ctx.open_db()?;
    summaries::get_summary(&conn, &query.patient_id, date)?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("daily summary for {} on {date}", query.patient_id))
        })
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub patient_id: String,
    /// Overrides the patient's stored timezone for the "is this day over"
    /// decision. Intended for support tooling.
    pub timezone: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub patient_id: String,
    pub dry_run: bool,
    pub days_processed: Vec<NaiveDate>,
    pub summaries: Vec<DailySummary>,
}

/// POST /medication-events/trigger-daily-reset
///
/// Runs the archival pass for one patient immediately instead of waiting for
/// the background cycle. With `dry_run` the summaries are computed and
/// returned but nothing is written.
pub async fn trigger_daily_reset(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &body.patient_id)?;
    let conn = ctx.open_db()?;
    let now = Utc::now();

    let tz = match &body.timezone {
        Some(raw) => Tz::from_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("{raw:?} is not a valid IANA timezone")))?,
        None => {
            let prefs = preferences::get_preferences(&conn, &body.patient_id)?.ok_or_else(
                || ApiError::NotFound(format!("time preferences {}", body.patient_id)),
            )?;
            patient_timezone(&prefs).map_err(ApiError::from)?
        }
    };

    let today = local_date_of(tz, now);
    let days = events::unarchived_days_before(&conn, &body.patient_id, today)?;

    let mut summaries_out = Vec::with_capacity(days.len());
    for day in &days {
        if body.dry_run {
            let day_events = events::list_events_for_local_date(&conn, &body.patient_id, *day)?;
            summaries_out.push(DailySummary::from_events(&body.patient_id, *day, &day_events));
        } else {
            summaries_out.push(archive_day(&conn, &body.patient_id, *day, now)?);
        }
    }

    Ok(Json(ResetResponse {
        patient_id: body.patient_id,
        dry_run: body.dry_run,
        days_processed: days,
        summaries: summaries_out,
    }))
}
