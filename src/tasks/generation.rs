//! Periodic event generation: keeps the rolling horizon of dose events
//! materialized for every active schedule.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{error, info};

use crate::db::repository::runs;
use crate::db::sqlite::open_database;
use crate::models::enums::TaskKind;
use crate::models::run::TaskRun;
use crate::scheduling::generator::{generate_all, DEFAULT_HORIZON_DAYS};
use crate::scheduling::SchedulingError;

use super::{start_periodic, TaskHandle, GENERATION_INTERVAL_SECS};

/// One generation cycle: fill the horizon and log the processing record.
pub fn run_generation_cycle(
    conn: &Connection,
    now: DateTime<Utc>,
) -> Result<TaskRun, SchedulingError> {
    let mut run = TaskRun::begin(TaskKind::EventGeneration);
    let outcome = generate_all(conn, now, DEFAULT_HORIZON_DAYS)?;

    run.successes = outcome.created as i64;
    run.failures = outcome.warnings.len() as i64;
    if !outcome.warnings.is_empty() {
        run.detail = Some(outcome.warnings.join("; "));
    }
    run.finish();
    runs::record_task_run(conn, &run)?;

    info!(
        created = outcome.created,
        skipped = outcome.skipped_existing,
        pruned = outcome.pruned_stale,
        warnings = outcome.warnings.len(),
        "event generation cycle finished"
    );
    Ok(run)
}

pub fn start(db_path: PathBuf) -> TaskHandle {
    start_periodic("event-generation", GENERATION_INTERVAL_SECS, move || {
        match open_database(&db_path) {
            Ok(conn) => {
                if let Err(e) = run_generation_cycle(&conn, Utc::now()) {
                    error!(error = %e, "event generation cycle failed");
                }
            }
            Err(e) => error!(error = %e, "event generation could not open database"),
        }
    })
}
