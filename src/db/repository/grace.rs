use rusqlite::{params, Connection};

use super::{parse_date, parse_utc};
use crate::db::DatabaseError;
use crate::models::grace::GracePeriodConfig;

/// Write (or replace) a patient's grace configuration.
pub fn upsert_grace_config(
    conn: &Connection,
    config: &GracePeriodConfig,
) -> Result<(), DatabaseError> {
    let holidays: Vec<String> = config.holidays.iter().map(|d| d.to_string()).collect();

    conn.execute(
        "INSERT INTO grace_configs
         (patient_id, default_minutes, bucket_defaults, class_overrides,
          medication_overrides, weekend_multiplier, holiday_multiplier,
          holidays, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (patient_id) DO UPDATE SET
             default_minutes = excluded.default_minutes,
             bucket_defaults = excluded.bucket_defaults,
             class_overrides = excluded.class_overrides,
             medication_overrides = excluded.medication_overrides,
             weekend_multiplier = excluded.weekend_multiplier,
             holiday_multiplier = excluded.holiday_multiplier,
             holidays = excluded.holidays,
             updated_at = excluded.updated_at",
        params![
            config.patient_id,
            config.default_minutes,
            to_json("bucket_defaults", &config.bucket_defaults)?,
            to_json("class_overrides", &config.class_overrides)?,
            to_json("medication_overrides", &config.medication_overrides)?,
            config.weekend_multiplier,
            config.holiday_multiplier,
            to_json("holidays", &holidays)?,
            config.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Load a patient's grace configuration, falling back to the system defaults
/// when the patient has never customized one.
pub fn get_grace_config(
    conn: &Connection,
    patient_id: &str,
) -> Result<GracePeriodConfig, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT patient_id, default_minutes, bucket_defaults, class_overrides,
                medication_overrides, weekend_multiplier, holiday_multiplier,
                holidays, updated_at
         FROM grace_configs WHERE patient_id = ?1",
    )?;
    let mut rows = stmt.query_map(params![patient_id], |row| {
        Ok(GraceRow {
            patient_id: row.get(0)?,
            default_minutes: row.get(1)?,
            bucket_defaults: row.get(2)?,
            class_overrides: row.get(3)?,
            medication_overrides: row.get(4)?,
            weekend_multiplier: row.get(5)?,
            holiday_multiplier: row.get(6)?,
            holidays: row.get(7)?,
            updated_at: row.get(8)?,
        })
    })?;

    match rows.next() {
        Some(row) => config_from_row(row?),
        None => Ok(GracePeriodConfig::defaults(patient_id)),
    }
}

struct GraceRow {
    patient_id: String,
    default_minutes: i64,
    bucket_defaults: String,
    class_overrides: String,
    medication_overrides: String,
    weekend_multiplier: f64,
    holiday_multiplier: f64,
    holidays: String,
    updated_at: String,
}

fn config_from_row(row: GraceRow) -> Result<GracePeriodConfig, DatabaseError> {
    let holiday_strings: Vec<String> = from_json("holidays", &row.holidays)?;
    let mut holidays = Vec::with_capacity(holiday_strings.len());
    for s in &holiday_strings {
        holidays.push(parse_date("holidays", s)?);
    }

    Ok(GracePeriodConfig {
        patient_id: row.patient_id,
        default_minutes: row.default_minutes,
        bucket_defaults: from_json("bucket_defaults", &row.bucket_defaults)?,
        class_overrides: from_json("class_overrides", &row.class_overrides)?,
        medication_overrides: from_json("medication_overrides", &row.medication_overrides)?,
        weekend_multiplier: row.weekend_multiplier,
        holiday_multiplier: row.holiday_multiplier,
        holidays,
        updated_at: parse_utc("updated_at", &row.updated_at)?,
    })
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::MalformedValue {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn from_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: &str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(value).map_err(|e| DatabaseError::MalformedValue {
        column: column.to_string(),
        reason: e.to_string(),
    })
}
