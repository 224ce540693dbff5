use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_time, parse_time, parse_utc};
use crate::db::DatabaseError;
use crate::models::preferences::{FrequencyMapping, PatientTimePreferences, TimeBucket};

/// Insert or replace a patient's preferences and their buckets in one
/// transaction-shaped batch. The caller is responsible for bumping `version`.
pub fn upsert_preferences(
    conn: &Connection,
    prefs: &PatientTimePreferences,
) -> Result<(), DatabaseError> {
    let mapping_json = serde_json::to_string(&prefs.frequency_mapping)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO time_preferences
         (patient_id, version, wake_time, sleep_time, timezone, frequency_mapping, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(patient_id) DO UPDATE SET
             version = excluded.version,
             wake_time = excluded.wake_time,
             sleep_time = excluded.sleep_time,
             timezone = excluded.timezone,
             frequency_mapping = excluded.frequency_mapping,
             updated_at = excluded.updated_at",
        params![
            prefs.patient_id,
            prefs.version,
            fmt_time(prefs.wake_time),
            fmt_time(prefs.sleep_time),
            prefs.timezone,
            mapping_json,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;

    // Buckets are replaced wholesale; deactivation is represented in the
    // incoming set, never by deleting history the caller still holds.
    conn.execute(
        "DELETE FROM time_buckets WHERE patient_id = ?1",
        params![prefs.patient_id],
    )?;
    for bucket in &prefs.buckets {
        conn.execute(
            "INSERT INTO time_buckets
             (id, patient_id, name, label, default_time, earliest, latest, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                bucket.id.to_string(),
                prefs.patient_id,
                bucket.name,
                bucket.label,
                fmt_time(bucket.default_time),
                fmt_time(bucket.earliest),
                fmt_time(bucket.latest),
                bucket.is_active as i32,
            ],
        )?;
    }

    Ok(())
}

/// Load a patient's preferences. Legacy night-bucket shapes are normalized
/// on read; stored rows are never rewritten.
pub fn get_preferences(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<PatientTimePreferences>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT version, wake_time, sleep_time, timezone, frequency_mapping, updated_at
             FROM time_preferences WHERE patient_id = ?1",
            params![patient_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(DatabaseError::Sqlite(other)),
        })?;

    let Some((version, wake, sleep, timezone, mapping_json, updated_at)) = row else {
        return Ok(None);
    };
    // Touch to keep the column honest even though callers don't need it yet
    let _ = parse_utc("updated_at", &updated_at)?;

    let frequency_mapping: FrequencyMapping = serde_json::from_str(&mapping_json)
        .map_err(|e| DatabaseError::MalformedValue {
            column: "frequency_mapping".into(),
            reason: e.to_string(),
        })?;

    let mut stmt = conn.prepare(
        "SELECT id, name, label, default_time, earliest, latest, is_active
         FROM time_buckets WHERE patient_id = ?1 ORDER BY default_time ASC",
    )?;
    let rows = stmt.query_map(params![patient_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i32>(6)?,
        ))
    })?;

    let mut buckets = Vec::new();
    for row in rows {
        let (id, name, label, default_time, earliest, latest, is_active) = row?;
        let mut bucket = TimeBucket {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            name,
            label,
            default_time: parse_time("default_time", &default_time)?,
            earliest: parse_time("earliest", &earliest)?,
            latest: parse_time("latest", &latest)?,
            is_active: is_active != 0,
        };
        bucket.normalize_legacy_night();
        buckets.push(bucket);
    }

    Ok(Some(PatientTimePreferences {
        patient_id: patient_id.to_string(),
        version,
        buckets,
        frequency_mapping,
        wake_time: parse_time("wake_time", &wake)?,
        sleep_time: parse_time("sleep_time", &sleep)?,
        timezone,
    }))
}
