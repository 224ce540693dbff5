use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Frequency;

/// A recurring dosing schedule for one medication.
///
/// Paused rather than deleted when a medication is temporarily held; pausing
/// prunes only future still-`scheduled` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationSchedule {
    pub id: Uuid,
    pub patient_id: String,
    pub medication_id: String,
    /// Optional therapeutic class used by grace-period class overrides.
    pub medication_class: Option<String>,
    pub frequency: Frequency,
    /// Per-medication clock-time overrides, keyed by bucket name.
    pub overrides: BTreeMap<String, NaiveTime>,
    pub start_date: NaiveDate,
    /// Open-ended when absent.
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_paused: bool,
    /// Preferences version this schedule was last compiled against.
    pub preferences_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicationSchedule {
    pub fn new(
        patient_id: &str,
        medication_id: &str,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        MedicationSchedule {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            medication_id: medication_id.to_string(),
            medication_class: None,
            frequency,
            overrides: BTreeMap::new(),
            start_date,
            end_date: None,
            is_active: true,
            is_paused: false,
            preferences_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// A schedule generates events only while active, unpaused, and within
    /// its date range.
    pub fn generates_on(&self, date: NaiveDate) -> bool {
        if !self.is_active || self.is_paused {
            return false;
        }
        if date < self.start_date {
            return false;
        }
        match self.end_date {
            Some(end) => date <= end,
            None => true,
        }
    }
}
