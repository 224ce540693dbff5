use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_date, parse_utc};
use crate::db::DatabaseError;
use crate::models::enums::DoseStatus;
use crate::models::event::DoseEvent;

/// Insert a dose event unless its identity triple already exists.
/// Returns true when a row was actually created; re-running generation for
/// an existing slot is a no-op.
pub fn insert_event_if_absent(
    conn: &Connection,
    event: &DoseEvent,
) -> Result<bool, DatabaseError> {
    let rules_json = serde_json::to_string(&event.applied_rules)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO dose_events
         (id, patient_id, medication_id, schedule_id, scheduled_at,
          belongs_to_local_date, bucket, status, grace_minutes, grace_end,
          applied_rules, schedule_version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            event.id.to_string(),
            event.patient_id,
            event.medication_id,
            event.schedule_id.to_string(),
            event.scheduled_at.to_rfc3339(),
            event.belongs_to_local_date.to_string(),
            event.bucket,
            event.status.as_str(),
            event.grace_minutes,
            event.grace_end.to_rfc3339(),
            rules_json,
            event.schedule_version,
            event.created_at.to_rfc3339(),
            event.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(inserted == 1)
}

pub fn get_event(conn: &Connection, id: &Uuid) -> Result<Option<DoseEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_EVENT} WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id.to_string()], event_row)?;
    match rows.next() {
        Some(row) => Ok(Some(event_from_row(row?)?)),
        None => Ok(None),
    }
}

/// The terminal fields written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionWrite {
    pub status: DoseStatus,
    pub acted_by: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
    pub minutes_late: Option<i64>,
    pub is_on_time: Option<bool>,
    pub notes: Option<String>,
    pub skip_reason: Option<String>,
}

/// Conditionally transition an event out of `scheduled`.
///
/// The `status = 'scheduled'` guard is the concurrency primitive: whichever
/// of a user action and the missed sweep lands second updates zero rows and
/// gets `false` back. No lock is taken.
pub fn apply_transition(
    conn: &Connection,
    event_id: &Uuid,
    write: &TransitionWrite,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE dose_events SET
             status = ?1,
             acted_by = ?2,
             acted_at = ?3,
             minutes_late = ?4,
             is_on_time = ?5,
             notes = COALESCE(?6, notes),
             skip_reason = ?7,
             updated_at = ?8
         WHERE id = ?9 AND status = 'scheduled'",
        params![
            write.status.as_str(),
            write.acted_by,
            write.acted_at.map(|t| t.to_rfc3339()),
            write.minutes_late,
            write.is_on_time.map(|b| b as i32),
            write.notes,
            write.skip_reason,
            Utc::now().to_rfc3339(),
            event_id.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

/// Refresh a still-scheduled event's grace window after a configuration
/// change. Guarded the same way as transitions; an event that already left
/// `scheduled` keeps the window it was judged against.
pub fn update_event_grace(
    conn: &Connection,
    event_id: &Uuid,
    grace_minutes: i64,
    grace_end: DateTime<Utc>,
    applied_rules: &[String],
) -> Result<bool, DatabaseError> {
    let rules_json = serde_json::to_string(applied_rules)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let changed = conn.execute(
        "UPDATE dose_events SET
             grace_minutes = ?1, grace_end = ?2, applied_rules = ?3, updated_at = ?4
         WHERE id = ?5 AND status = 'scheduled'",
        params![
            grace_minutes,
            grace_end.to_rfc3339(),
            rules_json,
            Utc::now().to_rfc3339(),
            event_id.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

/// Candidates for the missed sweep: still `scheduled`, unarchived, grace
/// window spent. Bounded to respect write-batch limits.
pub fn list_scheduled_past_grace(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<DoseEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_EVENT}
         WHERE status = 'scheduled' AND is_archived = 0 AND grace_end < ?1
         ORDER BY grace_end ASC
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![now.to_rfc3339(), limit as i64], event_row)?;
    collect_events(rows)
}

/// Today-view input: the patient's unarchived events for one local day.
pub fn list_events_for_local_date(
    conn: &Connection,
    patient_id: &str,
    local_date: NaiveDate,
) -> Result<Vec<DoseEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_EVENT}
         WHERE patient_id = ?1 AND belongs_to_local_date = ?2 AND is_archived = 0
         ORDER BY scheduled_at ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id, local_date.to_string()], event_row)?;
    collect_events(rows)
}

/// Unarchived events attributed to local days strictly before `before`.
pub fn unarchived_days_before(
    conn: &Connection,
    patient_id: &str,
    before: NaiveDate,
) -> Result<Vec<NaiveDate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT belongs_to_local_date FROM dose_events
         WHERE patient_id = ?1 AND is_archived = 0 AND belongs_to_local_date < ?2
         ORDER BY belongs_to_local_date ASC",
    )?;
    let rows = stmt.query_map(params![patient_id, before.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    let mut days = Vec::new();
    for row in rows {
        days.push(parse_date("belongs_to_local_date", &row?)?);
    }
    Ok(days)
}

/// Whether a local day still holds a scheduled dose whose grace window has
/// not run out. Wrapped night doses land after midnight but belong to the
/// prior day, so a day can stay open past its own midnight.
pub fn day_has_open_grace(
    conn: &Connection,
    patient_id: &str,
    local_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM dose_events
         WHERE patient_id = ?1 AND belongs_to_local_date = ?2
           AND is_archived = 0 AND status = 'scheduled' AND grace_end > ?3",
        params![patient_id, local_date.to_string(), now.to_rfc3339()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Patients that currently hold any unarchived events.
pub fn patients_with_unarchived_events(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT patient_id FROM dose_events WHERE is_archived = 0 ORDER BY patient_id",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Archived history between two local dates, inclusive.
pub fn list_archived_between(
    conn: &Connection,
    patient_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DoseEvent>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_EVENT}
         WHERE patient_id = ?1 AND is_archived = 1
           AND belongs_to_local_date >= ?2 AND belongs_to_local_date <= ?3
         ORDER BY scheduled_at ASC"
    ))?;
    let rows = stmt.query_map(
        params![patient_id, start.to_string(), end.to_string()],
        event_row,
    )?;
    collect_events(rows)
}

/// Stamp a day's events as archived with a back-reference to their summary.
pub fn mark_events_archived(
    conn: &Connection,
    event_ids: &[Uuid],
    summary_id: &Uuid,
    archived_at: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let mut marked = 0;
    for id in event_ids {
        marked += conn.execute(
            "UPDATE dose_events
             SET is_archived = 1, archived_at = ?1, daily_summary_id = ?2, updated_at = ?1
             WHERE id = ?3 AND is_archived = 0",
            params![
                archived_at.to_rfc3339(),
                summary_id.to_string(),
                id.to_string()
            ],
        )?;
    }
    Ok(marked)
}

/// Prune future, still-`scheduled` events for a schedule. Acted-upon and past
/// events are never touched. Used when a schedule is paused or deleted.
pub fn delete_future_scheduled_events(
    conn: &Connection,
    schedule_id: &Uuid,
    from: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM dose_events
         WHERE schedule_id = ?1 AND status = 'scheduled' AND is_archived = 0
           AND scheduled_at >= ?2",
        params![schedule_id.to_string(), from.to_rfc3339()],
    )?;
    Ok(deleted)
}

/// Regeneration prune: drop future `scheduled` events compiled from an older
/// preferences version. Events that already left `scheduled` stay put.
pub fn delete_future_scheduled_stale_version(
    conn: &Connection,
    schedule_id: &Uuid,
    current_version: i64,
    from: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM dose_events
         WHERE schedule_id = ?1 AND status = 'scheduled' AND is_archived = 0
           AND scheduled_at >= ?2 AND schedule_version < ?3",
        params![schedule_id.to_string(), from.to_rfc3339(), current_version],
    )?;
    Ok(deleted)
}

pub fn count_events_for_schedule(
    conn: &Connection,
    schedule_id: &Uuid,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM dose_events WHERE schedule_id = ?1",
        params![schedule_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

const SELECT_EVENT: &str = "SELECT id, patient_id, medication_id, schedule_id, scheduled_at,
        belongs_to_local_date, bucket, status, grace_minutes, grace_end,
        applied_rules, acted_by, acted_at, minutes_late, is_on_time, notes,
        skip_reason, is_archived, archived_at, daily_summary_id,
        schedule_version, created_at, updated_at
 FROM dose_events";

struct EventRow {
    id: String,
    patient_id: String,
    medication_id: String,
    schedule_id: String,
    scheduled_at: String,
    belongs_to_local_date: String,
    bucket: String,
    status: String,
    grace_minutes: i64,
    grace_end: String,
    applied_rules: String,
    acted_by: Option<String>,
    acted_at: Option<String>,
    minutes_late: Option<i64>,
    is_on_time: Option<i32>,
    notes: Option<String>,
    skip_reason: Option<String>,
    is_archived: i32,
    archived_at: Option<String>,
    daily_summary_id: Option<String>,
    schedule_version: i64,
    created_at: String,
    updated_at: String,
}

fn event_row(row: &rusqlite::Row<'_>) -> Result<EventRow, rusqlite::Error> {
    Ok(EventRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        medication_id: row.get(2)?,
        schedule_id: row.get(3)?,
        scheduled_at: row.get(4)?,
        belongs_to_local_date: row.get(5)?,
        bucket: row.get(6)?,
        status: row.get(7)?,
        grace_minutes: row.get(8)?,
        grace_end: row.get(9)?,
        applied_rules: row.get(10)?,
        acted_by: row.get(11)?,
        acted_at: row.get(12)?,
        minutes_late: row.get(13)?,
        is_on_time: row.get(14)?,
        notes: row.get(15)?,
        skip_reason: row.get(16)?,
        is_archived: row.get(17)?,
        archived_at: row.get(18)?,
        daily_summary_id: row.get(19)?,
        schedule_version: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn event_from_row(row: EventRow) -> Result<DoseEvent, DatabaseError> {
    let applied_rules: Vec<String> =
        serde_json::from_str(&row.applied_rules).map_err(|e| DatabaseError::MalformedValue {
            column: "applied_rules".into(),
            reason: e.to_string(),
        })?;

    Ok(DoseEvent {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        patient_id: row.patient_id,
        medication_id: row.medication_id,
        schedule_id: Uuid::parse_str(&row.schedule_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        scheduled_at: parse_utc("scheduled_at", &row.scheduled_at)?,
        belongs_to_local_date: parse_date("belongs_to_local_date", &row.belongs_to_local_date)?,
        bucket: row.bucket,
        status: DoseStatus::from_str(&row.status)?,
        grace_minutes: row.grace_minutes,
        grace_end: parse_utc("grace_end", &row.grace_end)?,
        applied_rules,
        acted_by: row.acted_by,
        acted_at: row
            .acted_at
            .map(|t| parse_utc("acted_at", &t))
            .transpose()?,
        minutes_late: row.minutes_late,
        is_on_time: row.is_on_time.map(|b| b != 0),
        notes: row.notes,
        skip_reason: row.skip_reason,
        is_archived: row.is_archived != 0,
        archived_at: row
            .archived_at
            .map(|t| parse_utc("archived_at", &t))
            .transpose()?,
        daily_summary_id: row
            .daily_summary_id
            .map(|s| {
                Uuid::parse_str(&s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
            })
            .transpose()?,
        schedule_version: row.schedule_version,
        created_at: parse_utc("created_at", &row.created_at)?,
        updated_at: parse_utc("updated_at", &row.updated_at)?,
    })
}

fn collect_events(
    rows: impl Iterator<Item = Result<EventRow, rusqlite::Error>>,
) -> Result<Vec<DoseEvent>, DatabaseError> {
    let mut events = Vec::new();
    for row in rows {
        events.push(event_from_row(row?)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Frequency;
    use crate::models::schedule::MedicationSchedule;
    use chrono::{TimeZone, Timelike};

    fn setup() -> (Connection, MedicationSchedule) {
        let conn = open_memory_database().unwrap();
        let schedule = MedicationSchedule::new(
            "patient-1",
            "med-1",
            Frequency::Daily,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        );
        super::super::schedules::insert_schedule(&conn, &schedule).unwrap();
        (conn, schedule)
    }

    fn sample_event(schedule: &MedicationSchedule, hour: u32) -> DoseEvent {
        let scheduled = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
        DoseEvent {
            id: Uuid::new_v4(),
            patient_id: schedule.patient_id.clone(),
            medication_id: schedule.medication_id.clone(),
            schedule_id: schedule.id,
            scheduled_at: scheduled,
            belongs_to_local_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            bucket: "morning".into(),
            status: DoseStatus::Scheduled,
            grace_minutes: 30,
            grace_end: scheduled + chrono::Duration::minutes(30),
            applied_rules: vec!["patient_bucket_default".into()],
            acted_by: None,
            acted_at: None,
            minutes_late: None,
            is_on_time: None,
            notes: None,
            skip_reason: None,
            is_archived: false,
            archived_at: None,
            daily_summary_id: None,
            schedule_version: 1,
            created_at: scheduled,
            updated_at: scheduled,
        }
    }

    #[test]
    fn insert_is_idempotent_on_identity_triple() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        assert!(insert_event_if_absent(&conn, &event).unwrap());

        let mut duplicate = event.clone();
        duplicate.id = Uuid::new_v4();
        assert!(!insert_event_if_absent(&conn, &duplicate).unwrap());
        assert_eq!(count_events_for_schedule(&conn, &schedule.id).unwrap(), 1);
    }

    #[test]
    fn open_grace_detection_tracks_the_clock() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        insert_event_if_absent(&conn, &event).unwrap();
        let day = event.belongs_to_local_date;

        assert!(day_has_open_grace(&conn, "patient-1", day, event.scheduled_at).unwrap());
        let after_grace = event.grace_end + chrono::Duration::minutes(1);
        assert!(!day_has_open_grace(&conn, "patient-1", day, after_grace).unwrap());
    }

    #[test]
    fn round_trips_event_fields() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        insert_event_if_absent(&conn, &event).unwrap();

        let loaded = get_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Scheduled);
        assert_eq!(loaded.scheduled_at, event.scheduled_at);
        assert_eq!(loaded.applied_rules, vec!["patient_bucket_default"]);
        assert!(!loaded.is_archived);
    }

    #[test]
    fn transition_guard_rejects_second_writer() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        insert_event_if_absent(&conn, &event).unwrap();

        let taken = TransitionWrite {
            status: DoseStatus::Taken,
            acted_by: Some("patient-1".into()),
            acted_at: Some(event.scheduled_at),
            is_on_time: Some(true),
            ..Default::default()
        };
        assert!(apply_transition(&conn, &event.id, &taken).unwrap());

        // The sweep arriving second must lose
        let missed = TransitionWrite {
            status: DoseStatus::Missed,
            ..Default::default()
        };
        assert!(!apply_transition(&conn, &event.id, &missed).unwrap());

        let loaded = get_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Taken);
    }

    #[test]
    fn sweep_query_only_sees_spent_scheduled_events() {
        let (conn, schedule) = setup();
        let past = sample_event(&schedule, 6);
        let future = sample_event(&schedule, 20);
        insert_event_if_absent(&conn, &past).unwrap();
        insert_event_if_absent(&conn, &future).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let due = list_scheduled_past_grace(&conn, now, 500).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);

        // A taken event disappears from the sweep's view
        let taken = TransitionWrite {
            status: DoseStatus::Taken,
            ..Default::default()
        };
        apply_transition(&conn, &past.id, &taken).unwrap();
        assert!(list_scheduled_past_grace(&conn, now, 500).unwrap().is_empty());
    }

    #[test]
    fn sweep_batch_is_bounded() {
        let (conn, schedule) = setup();
        for hour in 0..6 {
            insert_event_if_absent(&conn, &sample_event(&schedule, hour)).unwrap();
        }
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap();
        let due = list_scheduled_past_grace(&conn, now, 4).unwrap();
        assert_eq!(due.len(), 4);
        // Oldest grace ends first
        assert_eq!(due[0].scheduled_at.hour(), 0);
    }

    #[test]
    fn pruning_spares_acted_and_past_events() {
        let (conn, schedule) = setup();
        let past = sample_event(&schedule, 6);
        let taken = sample_event(&schedule, 10);
        let future = sample_event(&schedule, 20);
        for e in [&past, &taken, &future] {
            insert_event_if_absent(&conn, e).unwrap();
        }
        apply_transition(
            &conn,
            &taken.id,
            &TransitionWrite {
                status: DoseStatus::Taken,
                ..Default::default()
            },
        )
        .unwrap();

        let cutoff = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let deleted = delete_future_scheduled_events(&conn, &schedule.id, cutoff).unwrap();
        assert_eq!(deleted, 1); // only the future scheduled one
        assert!(get_event(&conn, &past.id).unwrap().is_some());
        assert!(get_event(&conn, &taken.id).unwrap().is_some());
        assert!(get_event(&conn, &future.id).unwrap().is_none());
    }

    #[test]
    fn stale_version_prune_spares_current_version() {
        let (conn, schedule) = setup();
        let stale = sample_event(&schedule, 9);
        let mut current = sample_event(&schedule, 18);
        current.schedule_version = 2;
        insert_event_if_absent(&conn, &stale).unwrap();
        insert_event_if_absent(&conn, &current).unwrap();

        let from = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let deleted =
            delete_future_scheduled_stale_version(&conn, &schedule.id, 2, from).unwrap();
        assert_eq!(deleted, 1);
        assert!(get_event(&conn, &stale.id).unwrap().is_none());
        assert!(get_event(&conn, &current.id).unwrap().is_some());
    }

    #[test]
    fn archival_stamps_and_excludes_from_day_view() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        insert_event_if_absent(&conn, &event).unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(list_events_for_local_date(&conn, "patient-1", day).unwrap().len(), 1);

        let summary_id = Uuid::new_v4();
        let archived_at = Utc.with_ymd_and_hms(2026, 3, 3, 6, 0, 0).unwrap();
        let marked = mark_events_archived(&conn, &[event.id], &summary_id, archived_at).unwrap();
        assert_eq!(marked, 1);

        assert!(list_events_for_local_date(&conn, "patient-1", day).unwrap().is_empty());
        let archived = list_archived_between(&conn, "patient-1", day, day).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].daily_summary_id, Some(summary_id));

        // Re-marking is a no-op
        let again = mark_events_archived(&conn, &[event.id], &summary_id, archived_at).unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn unarchived_day_tracking() {
        let (conn, schedule) = setup();
        let event = sample_event(&schedule, 8);
        insert_event_if_absent(&conn, &event).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let days = unarchived_days_before(&conn, "patient-1", today).unwrap();
        assert_eq!(days, vec![NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()]);
        assert_eq!(
            patients_with_unarchived_events(&conn).unwrap(),
            vec!["patient-1"]
        );
    }
}
