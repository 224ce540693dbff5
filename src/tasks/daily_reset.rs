//! Daily archival reset.
//!
//! Once a patient's local midnight has passed, every unarchived event
//! attributed to an earlier local day is rolled into an immutable daily
//! summary and stamped archived. The `(patient_id, local_date)` unique key
//! on summaries makes the whole thing exactly-once; a cycle interrupted
//! between summary insert and event stamping finishes the job next time.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::repository::{events, preferences, runs, summaries};
use crate::db::sqlite::open_database;
use crate::models::enums::TaskKind;
use crate::models::run::TaskRun;
use crate::models::summary::DailySummary;
use crate::scheduling::{local_date_of, patient_timezone, SchedulingError};

use super::{start_periodic, TaskHandle, CHECK_INTERVAL_SECS};

/// Archive one completed patient-local day.
///
/// Reuses an existing summary when a previous cycle wrote it but crashed
/// before stamping the events.
pub fn archive_day(
    conn: &Connection,
    patient_id: &str,
    day: NaiveDate,
    now: DateTime<Utc>,
) -> Result<DailySummary, SchedulingError> {
    let day_events = events::list_events_for_local_date(conn, patient_id, day)?;

    let summary = match summaries::get_summary(conn, patient_id, day)? {
        Some(existing) => existing,
        None => {
            let built = DailySummary::from_events(patient_id, day, &day_events);
            summaries::insert_summary(conn, &built)?;
            built
        }
    };

    let ids: Vec<Uuid> = day_events.iter().map(|e| e.id).collect();
    let stamped = events::mark_events_archived(conn, &ids, &summary.id, now)?;
    info!(
        patient_id,
        %day,
        events = stamped,
        adherence = summary.adherence_rate,
        "archived completed day"
    );
    Ok(summary)
}

/// Archive every completed local day for one patient. Returns the number of
/// days rolled up.
///
/// A day whose last grace window has not run out yet is left alone; a
/// wrapped night dose lands after midnight while belonging to the prior
/// day, and sealing that day early would strand the dose un-actionable.
/// The next cycle picks the day up once the window closes.
pub fn archive_patient(
    conn: &Connection,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, SchedulingError> {
    let prefs = preferences::get_preferences(conn, patient_id)?.ok_or_else(|| {
        SchedulingError::MissingTimezone {
            patient_id: patient_id.to_string(),
        }
    })?;
    let tz = patient_timezone(&prefs)?;
    let today = local_date_of(tz, now);

    let mut count = 0;
    for day in events::unarchived_days_before(conn, patient_id, today)? {
        if events::day_has_open_grace(conn, patient_id, day, now)? {
            info!(patient_id, %day, "deferring archival, grace window still open");
            continue;
        }
        archive_day(conn, patient_id, day, now)?;
        count += 1;
    }
    Ok(count)
}

/// One reset cycle across all patients holding unarchived events. Per-patient
/// failures are isolated; one broken timezone never blocks the rest.
pub fn run_reset_cycle(
    conn: &Connection,
    now: DateTime<Utc>,
) -> Result<TaskRun, SchedulingError> {
    let mut run = TaskRun::begin(TaskKind::DailyReset);
    let mut details = Vec::new();

    for patient_id in events::patients_with_unarchived_events(conn)? {
        run.patients_considered += 1;
        match archive_patient(conn, &patient_id, now) {
            Ok(days) => run.successes += days as i64,
            Err(e) => {
                warn!(patient_id, error = %e, "daily reset failed for patient");
                run.failures += 1;
                details.push(format!("{patient_id}: {e}"));
            }
        }
    }

    if !details.is_empty() {
        run.detail = Some(details.join("; "));
    }
    run.finish();
    runs::record_task_run(conn, &run)?;
    Ok(run)
}

pub fn start(db_path: PathBuf) -> TaskHandle {
    start_periodic("daily-reset", CHECK_INTERVAL_SECS, move || {
        match open_database(&db_path) {
            Ok(conn) => {
                if let Err(e) = run_reset_cycle(&conn, Utc::now()) {
                    error!(error = %e, "daily reset cycle failed");
                }
            }
            Err(e) => error!(error = %e, "daily reset could not open database"),
        }
    })
}
