use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_utc;
use crate::db::DatabaseError;
use crate::models::enums::TaskKind;
use crate::models::run::TaskRun;

/// Record one background task cycle. Written once, after the cycle finishes.
pub fn record_task_run(conn: &Connection, run: &TaskRun) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO task_runs
         (id, task, started_at, finished_at, patients_considered, successes, failures, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run.id.to_string(),
            run.task.as_str(),
            run.started_at.to_rfc3339(),
            run.finished_at.map(|t| t.to_rfc3339()),
            run.patients_considered,
            run.successes,
            run.failures,
            run.detail,
        ],
    )?;
    Ok(())
}

/// Most recent runs of one task, newest first.
pub fn list_recent_runs(
    conn: &Connection,
    task: TaskKind,
    limit: usize,
) -> Result<Vec<TaskRun>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, task, started_at, finished_at, patients_considered, successes, failures, detail
         FROM task_runs WHERE task = ?1 ORDER BY started_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![task.as_str(), limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut runs = Vec::new();
    for row in rows {
        let (id, task, started_at, finished_at, considered, successes, failures, detail) = row?;
        runs.push(TaskRun {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            task: TaskKind::from_str(&task)?,
            started_at: parse_utc("started_at", &started_at)?,
            finished_at: finished_at
                .map(|t| parse_utc("finished_at", &t))
                .transpose()?,
            patients_considered: considered,
            successes,
            failures,
            detail,
        });
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn records_and_lists_runs() {
        let conn = open_memory_database().unwrap();
        let mut run = TaskRun::begin(TaskKind::MissedSweep);
        run.patients_considered = 3;
        run.successes = 2;
        run.failures = 1;
        run.finish();
        record_task_run(&conn, &run).unwrap();

        let runs = list_recent_runs(&conn, TaskKind::MissedSweep, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].successes, 2);
        assert!(runs[0].finished_at.is_some());

        assert!(list_recent_runs(&conn, TaskKind::DailyReset, 10)
            .unwrap()
            .is_empty());
    }
}
