//! Read models: the today view and dry-run schedule computation.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{caller_id, ApiContext};
use crate::db::repository::{preferences, schedules};
use crate::scheduling::compiler::compile_schedule;
use crate::scheduling::frequency::normalize_frequency;
use crate::views::today::{build_day_view, TodayView};

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    pub patient_id: String,
    /// Defaults to the patient's current local day.
    pub date: Option<NaiveDate>,
}

/// GET /medication-views/today-buckets
pub async fn today_buckets(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Query(query): Query<TodayQuery>,
) -> Result<Json<TodayView>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &query.patient_id)?;
    let conn = ctx.open_db()?;
    let view = build_day_view(&conn, &query.patient_id, query.date, Utc::now())?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct ComputeScheduleRequest {
    pub patient_id: String,
    pub frequency: String,
    /// Per-bucket `HH:MM` overrides.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct ComputeScheduleResponse {
    pub times: Vec<String>,
    pub applied_buckets: Vec<String>,
    pub warnings: Vec<String>,
}

/// POST /time-buckets/compute-schedule
///
/// Pure preview: compiles a frequency against the patient's current
/// preferences without creating a schedule or any events.
pub async fn compute_schedule(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<ComputeScheduleRequest>,
) -> Result<Json<ComputeScheduleResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    ctx.require_access(&caller, &body.patient_id)?;

    let frequency = normalize_frequency(&body.frequency).map_err(ApiError::from)?;
    let overrides = schedules::parse_override_times(&body.overrides)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let conn = ctx.open_db()?;
    let prefs = preferences::get_preferences(&conn, &body.patient_id)?
        .ok_or_else(|| ApiError::NotFound(format!("time preferences {}", body.patient_id)))?;

    let compiled = compile_schedule(frequency, &prefs, &overrides).map_err(ApiError::from)?;
    Ok(Json(ComputeScheduleResponse {
        times: compiled
            .doses
            .iter()
            .map(|d| d.time.format("%H:%M").to_string())
            .collect(),
        applied_buckets: compiled.applied_buckets,
        warnings: compiled.warnings,
    }))
}
