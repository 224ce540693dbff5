//! Missed-detection sweep.
//!
//! Every cycle pulls a bounded batch of still-scheduled events whose stored
//! grace window has passed, re-resolves each window against the current
//! grace configuration, and marks the truly overdue ones missed. An event
//! whose recomputed window has not yet passed gets its stored window
//! refreshed instead, which also removes it from the next batch's candidates.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::access::Notifier;
use crate::db::repository::{events, grace as grace_repo, runs, schedules};
use crate::db::sqlite::open_database;
use crate::models::enums::TaskKind;
use crate::models::run::TaskRun;
use crate::scheduling::grace::resolve_grace;
use crate::scheduling::lifecycle::{plan_transition, DoseAction};
use crate::scheduling::SchedulingError;

use super::{start_periodic, TaskHandle, CHECK_INTERVAL_SECS};

/// Upper bound on events handled per cycle.
pub const SWEEP_BATCH_LIMIT: usize = 500;

/// One sweep cycle over a single bounded batch.
pub fn run_sweep_cycle(
    conn: &Connection,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<TaskRun, SchedulingError> {
    let mut run = TaskRun::begin(TaskKind::MissedSweep);

    let batch = events::list_scheduled_past_grace(conn, now, SWEEP_BATCH_LIMIT)?;
    let patients: std::collections::BTreeSet<&str> =
        batch.iter().map(|e| e.patient_id.as_str()).collect();
    run.patients_considered = patients.len() as i64;

    let mut marked = 0i64;
    let mut deferred = 0i64;
    let mut conflicts = 0i64;

    for mut event in batch {
        let config = grace_repo::get_grace_config(conn, &event.patient_id)?;

        // Re-resolve against current config; the stored window may predate a
        // configuration change.
        if let Some(schedule) = schedules::get_schedule(conn, &event.schedule_id)? {
            let resolution = resolve_grace(
                &config,
                schedule.frequency,
                &event.medication_id,
                schedule.medication_class.as_deref(),
                &event.bucket,
                event.scheduled_at,
                event.belongs_to_local_date,
            );
            if resolution.grace_end != event.grace_end {
                events::update_event_grace(
                    conn,
                    &event.id,
                    resolution.grace_minutes,
                    resolution.grace_end,
                    &resolution.applied_rules,
                )?;
                event.grace_minutes = resolution.grace_minutes;
                event.grace_end = resolution.grace_end;
                event.applied_rules = resolution.applied_rules;
            }
        }

        if event.within_grace(now) {
            deferred += 1;
            continue;
        }

        match plan_transition(&event, &DoseAction::SweepMiss, now) {
            Ok(write) => {
                if events::apply_transition(conn, &event.id, &write)? {
                    marked += 1;
                    notifier.dose_missed(&event);
                } else {
                    // A user action landed between the query and this write
                    debug!(event_id = %event.id, "sweep lost the write race; skipping");
                    conflicts += 1;
                }
            }
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "sweep could not plan transition");
                run.failures += 1;
            }
        }
    }

    run.successes = marked;
    if deferred > 0 || conflicts > 0 {
        run.detail = Some(format!("deferred={deferred} conflicts={conflicts}"));
    }
    run.finish();
    runs::record_task_run(conn, &run)?;

    if marked > 0 {
        info!(marked, deferred, conflicts, "missed sweep cycle finished");
    }
    Ok(run)
}

pub fn start(db_path: PathBuf, notifier: Arc<dyn Notifier>) -> TaskHandle {
    start_periodic("missed-sweep", CHECK_INTERVAL_SECS, move || {
        match open_database(&db_path) {
            Ok(conn) => {
                if let Err(e) = run_sweep_cycle(&conn, notifier.as_ref(), Utc::now()) {
                    error!(error = %e, "missed sweep cycle failed");
                }
            }
            Err(e) => error!(error = %e, "missed sweep could not open database"),
        }
    })
}
