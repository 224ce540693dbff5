use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_utc;
use crate::db::DatabaseError;
use crate::models::summary::DailySummary;

/// Insert a summary. The `(patient_id, local_date)` unique key makes this the
/// exactly-once gate for archival: a second writer gets a constraint error.
pub fn insert_summary(conn: &Connection, summary: &DailySummary) -> Result<(), DatabaseError> {
    let event_ids: Vec<String> = summary.event_ids.iter().map(|id| id.to_string()).collect();
    let event_ids_json = serde_json::to_string(&event_ids)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO daily_summaries
         (id, patient_id, local_date, scheduled_count, taken_count, on_time_count,
          late_count, missed_count, skipped_count, adherence_rate, on_time_rate,
          average_delay_minutes, longest_delay_minutes, event_ids, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            summary.id.to_string(),
            summary.patient_id,
            summary.local_date.to_string(),
            summary.scheduled_count,
            summary.taken_count,
            summary.on_time_count,
            summary.late_count,
            summary.missed_count,
            summary.skipped_count,
            summary.adherence_rate,
            summary.on_time_rate,
            summary.average_delay_minutes,
            summary.longest_delay_minutes,
            event_ids_json,
            summary.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn summary_exists(
    conn: &Connection,
    patient_id: &str,
    local_date: NaiveDate,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM daily_summaries WHERE patient_id = ?1 AND local_date = ?2",
        params![patient_id, local_date.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_summary(
    conn: &Connection,
    patient_id: &str,
    local_date: NaiveDate,
) -> Result<Option<DailySummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, scheduled_count, taken_count, on_time_count, late_count,
                missed_count, skipped_count, adherence_rate, on_time_rate,
                average_delay_minutes, longest_delay_minutes, event_ids, created_at
         FROM daily_summaries WHERE patient_id = ?1 AND local_date = ?2",
    )?;
    let mut rows = stmt.query_map(params![patient_id, local_date.to_string()], |row| {
        Ok(SummaryRow {
            id: row.get(0)?,
            scheduled_count: row.get(1)?,
            taken_count: row.get(2)?,
            on_time_count: row.get(3)?,
            late_count: row.get(4)?,
            missed_count: row.get(5)?,
            skipped_count: row.get(6)?,
            adherence_rate: row.get(7)?,
            on_time_rate: row.get(8)?,
            average_delay_minutes: row.get(9)?,
            longest_delay_minutes: row.get(10)?,
            event_ids: row.get(11)?,
            created_at: row.get(12)?,
        })
    })?;

    match rows.next() {
        Some(row) => {
            let row = row?;
            let raw_ids: Vec<String> =
                serde_json::from_str(&row.event_ids).map_err(|e| DatabaseError::MalformedValue {
                    column: "event_ids".into(),
                    reason: e.to_string(),
                })?;
            let mut event_ids = Vec::with_capacity(raw_ids.len());
            for raw in raw_ids {
                event_ids.push(Uuid::parse_str(&raw).map_err(|e| {
                    DatabaseError::ConstraintViolation(e.to_string())
                })?);
            }
            Ok(Some(DailySummary {
                id: Uuid::parse_str(&row.id)
                    .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
                patient_id: patient_id.to_string(),
                local_date,
                scheduled_count: row.scheduled_count,
                taken_count: row.taken_count,
                on_time_count: row.on_time_count,
                late_count: row.late_count,
                missed_count: row.missed_count,
                skipped_count: row.skipped_count,
                adherence_rate: row.adherence_rate,
                on_time_rate: row.on_time_rate,
                average_delay_minutes: row.average_delay_minutes,
                longest_delay_minutes: row.longest_delay_minutes,
                event_ids,
                created_at: parse_utc("created_at", &row.created_at)?,
            }))
        }
        None => Ok(None),
    }
}

struct SummaryRow {
    id: String,
    scheduled_count: i64,
    taken_count: i64,
    on_time_count: i64,
    late_count: i64,
    missed_count: i64,
    skipped_count: i64,
    adherence_rate: f64,
    on_time_rate: f64,
    average_delay_minutes: f64,
    longest_delay_minutes: i64,
    event_ids: String,
    created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn sample(date: NaiveDate) -> DailySummary {
        DailySummary::from_events("patient-1", date, &[])
    }

    #[test]
    fn round_trips_summary() {
        let conn = open_memory_database().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut summary = sample(date);
        summary.event_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        insert_summary(&conn, &summary).unwrap();

        let loaded = get_summary(&conn, "patient-1", date).unwrap().unwrap();
        assert_eq!(loaded.id, summary.id);
        assert_eq!(loaded.event_ids, summary.event_ids);
    }

    #[test]
    fn duplicate_patient_day_rejected() {
        let conn = open_memory_database().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        insert_summary(&conn, &sample(date)).unwrap();
        assert!(summary_exists(&conn, "patient-1", date).unwrap());
        assert!(insert_summary(&conn, &sample(date)).is_err());
    }

    #[test]
    fn missing_summary_is_none() {
        let conn = open_memory_database().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(!summary_exists(&conn, "patient-1", date).unwrap());
        assert!(get_summary(&conn, "patient-1", date).unwrap().is_none());
    }
}
