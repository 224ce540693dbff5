use std::path::Path;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_initial.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // schema_version + preferences + buckets + schedules + events
        // + summaries + grace_configs + task_runs = 8
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 8, "Expected 8 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Run migrations again — should not error
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn dose_event_identity_triple_is_unique() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO medication_schedules
             (id, patient_id, medication_id, frequency, start_date, created_at, updated_at)
             VALUES ('s', 'p', 'm', 'daily', '2026-03-01',
                     '2026-03-01T00:00:00Z', '2026-03-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO dose_events
             (id, patient_id, medication_id, schedule_id, scheduled_at,
              belongs_to_local_date, bucket, grace_minutes, grace_end,
              created_at, updated_at)
             VALUES (?1, 'p', 'm', 's', '2026-03-02T08:00:00Z',
                     '2026-03-02', 'morning', 30, '2026-03-02T08:30:00Z',
                     '2026-03-02T00:00:00Z', '2026-03-02T00:00:00Z')";
        conn.execute(insert, ["e1"]).unwrap();
        let duplicate = conn.execute(insert, ["e2"]);
        assert!(duplicate.is_err(), "Duplicate identity triple must be rejected");
    }

    #[test]
    fn daily_summary_key_is_unique() {
        let conn = open_memory_database().unwrap();
        let insert = "INSERT INTO daily_summaries
             (id, patient_id, local_date, scheduled_count, taken_count,
              on_time_count, late_count, missed_count, skipped_count,
              adherence_rate, on_time_rate, average_delay_minutes,
              longest_delay_minutes, created_at)
             VALUES (?1, 'p', '2026-03-02', 0, 0, 0, 0, 0, 0, 0.0, 0.0, 0.0, 0,
                     '2026-03-03T06:00:00Z')";
        conn.execute(insert, ["s1"]).unwrap();
        assert!(conn.execute(insert, ["s2"]).is_err());
    }
}
