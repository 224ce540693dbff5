use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_time, parse_date, parse_time, parse_utc};
use crate::db::DatabaseError;
use crate::models::enums::Frequency;
use crate::models::schedule::MedicationSchedule;

pub fn insert_schedule(
    conn: &Connection,
    schedule: &MedicationSchedule,
) -> Result<(), DatabaseError> {
    let overrides: BTreeMap<&String, String> = schedule
        .overrides
        .iter()
        .map(|(bucket, time)| (bucket, fmt_time(*time)))
        .collect();
    let overrides_json = serde_json::to_string(&overrides)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO medication_schedules
         (id, patient_id, medication_id, medication_class, frequency, overrides,
          start_date, end_date, is_active, is_paused, preferences_version,
          created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            schedule.id.to_string(),
            schedule.patient_id,
            schedule.medication_id,
            schedule.medication_class,
            schedule.frequency.as_str(),
            overrides_json,
            schedule.start_date.to_string(),
            schedule.end_date.map(|d| d.to_string()),
            schedule.is_active as i32,
            schedule.is_paused as i32,
            schedule.preferences_version,
            schedule.created_at.to_rfc3339(),
            schedule.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_schedule(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<MedicationSchedule>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("{SELECT_SCHEDULE} WHERE id = ?1"))?;
    let mut rows = stmt.query_map(params![id.to_string()], schedule_row)?;
    match rows.next() {
        Some(row) => Ok(Some(schedule_from_row(row?)?)),
        None => Ok(None),
    }
}

/// All schedules eligible for event generation, across every patient.
pub fn list_active_schedules(conn: &Connection) -> Result<Vec<MedicationSchedule>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_SCHEDULE} WHERE is_active = 1 AND is_paused = 0 ORDER BY patient_id"
    ))?;
    let rows = stmt.query_map([], schedule_row)?;
    let mut schedules = Vec::new();
    for row in rows {
        schedules.push(schedule_from_row(row?)?);
    }
    Ok(schedules)
}

pub fn list_schedules_for_patient(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<MedicationSchedule>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_SCHEDULE} WHERE patient_id = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(params![patient_id], schedule_row)?;
    let mut schedules = Vec::new();
    for row in rows {
        schedules.push(schedule_from_row(row?)?);
    }
    Ok(schedules)
}

/// Flip the paused flag. Returns false when the schedule does not exist.
pub fn set_schedule_paused(
    conn: &Connection,
    id: &Uuid,
    paused: bool,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medication_schedules SET is_paused = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            paused as i32,
            chrono::Utc::now().to_rfc3339(),
            id.to_string()
        ],
    )?;
    Ok(changed == 1)
}

/// Stamp the preferences version a schedule was last compiled against.
pub fn set_schedule_preferences_version(
    conn: &Connection,
    id: &Uuid,
    version: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE medication_schedules SET preferences_version = ?1, updated_at = ?2 WHERE id = ?3",
        params![version, chrono::Utc::now().to_rfc3339(), id.to_string()],
    )?;
    Ok(())
}

const SELECT_SCHEDULE: &str = "SELECT id, patient_id, medication_id, medication_class, frequency,
        overrides, start_date, end_date, is_active, is_paused,
        preferences_version, created_at, updated_at
 FROM medication_schedules";

struct ScheduleRow {
    id: String,
    patient_id: String,
    medication_id: String,
    medication_class: Option<String>,
    frequency: String,
    overrides: String,
    start_date: String,
    end_date: Option<String>,
    is_active: i32,
    is_paused: i32,
    preferences_version: i64,
    created_at: String,
    updated_at: String,
}

fn schedule_row(row: &rusqlite::Row<'_>) -> Result<ScheduleRow, rusqlite::Error> {
    Ok(ScheduleRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        medication_id: row.get(2)?,
        medication_class: row.get(3)?,
        frequency: row.get(4)?,
        overrides: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
        is_active: row.get(8)?,
        is_paused: row.get(9)?,
        preferences_version: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn schedule_from_row(row: ScheduleRow) -> Result<MedicationSchedule, DatabaseError> {
    let raw_overrides: BTreeMap<String, String> =
        serde_json::from_str(&row.overrides).map_err(|e| DatabaseError::MalformedValue {
            column: "overrides".into(),
            reason: e.to_string(),
        })?;
    let mut overrides = BTreeMap::new();
    for (bucket, time) in raw_overrides {
        overrides.insert(bucket, parse_time("overrides", &time)?);
    }

    Ok(MedicationSchedule {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        patient_id: row.patient_id,
        medication_id: row.medication_id,
        medication_class: row.medication_class,
        frequency: Frequency::from_str(&row.frequency)?,
        overrides,
        start_date: parse_date("start_date", &row.start_date)?,
        end_date: row
            .end_date
            .map(|d| parse_date("end_date", &d))
            .transpose()?,
        is_active: row.is_active != 0,
        is_paused: row.is_paused != 0,
        preferences_version: row.preferences_version,
        created_at: parse_utc("created_at", &row.created_at)?,
        updated_at: parse_utc("updated_at", &row.updated_at)?,
    })
}

/// Typed override helper used by API input handling.
pub fn parse_override_times(
    raw: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, NaiveTime>, DatabaseError> {
    let mut parsed = BTreeMap::new();
    for (bucket, time) in raw {
        parsed.insert(bucket.clone(), parse_time("overrides", time)?);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;

    fn sample() -> MedicationSchedule {
        let mut s = MedicationSchedule::new(
            "patient-1",
            "med-1",
            Frequency::TwiceDaily,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        );
        s.medication_class = Some("statin".into());
        s.overrides.insert(
            "morning".into(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
        );
        s
    }

    #[test]
    fn round_trips_schedule() {
        let conn = open_memory_database().unwrap();
        let schedule = sample();
        insert_schedule(&conn, &schedule).unwrap();

        let loaded = get_schedule(&conn, &schedule.id).unwrap().unwrap();
        assert_eq!(loaded.frequency, Frequency::TwiceDaily);
        assert_eq!(loaded.medication_class.as_deref(), Some("statin"));
        assert_eq!(
            loaded.overrides.get("morning"),
            Some(&NaiveTime::from_hms_opt(7, 30, 0).unwrap())
        );
        assert!(loaded.end_date.is_none());
    }

    #[test]
    fn active_listing_excludes_paused() {
        let conn = open_memory_database().unwrap();
        let a = sample();
        let mut b = sample();
        b.id = Uuid::new_v4();
        b.medication_id = "med-2".into();
        insert_schedule(&conn, &a).unwrap();
        insert_schedule(&conn, &b).unwrap();

        assert!(set_schedule_paused(&conn, &b.id, true).unwrap());
        let active = list_active_schedules(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }

    #[test]
    fn pausing_missing_schedule_returns_false() {
        let conn = open_memory_database().unwrap();
        assert!(!set_schedule_paused(&conn, &Uuid::new_v4(), true).unwrap());
    }

    #[test]
    fn preferences_version_stamp() {
        let conn = open_memory_database().unwrap();
        let schedule = sample();
        insert_schedule(&conn, &schedule).unwrap();
        set_schedule_preferences_version(&conn, &schedule.id, 7).unwrap();
        let loaded = get_schedule(&conn, &schedule.id).unwrap().unwrap();
        assert_eq!(loaded.preferences_version, 7);
    }
}
