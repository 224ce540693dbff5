use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Cascading grace-period configuration for one patient.
///
/// Read-only from the engine's point of view; written only through explicit
/// configuration changes. Multipliers are validated to be >= 1.0 so weekend
/// and holiday adjustments can only extend a window, never shrink it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GracePeriodConfig {
    pub patient_id: String,
    pub default_minutes: i64,
    /// Per-bucket patient defaults, keyed by bucket name.
    #[serde(default)]
    pub bucket_defaults: BTreeMap<String, i64>,
    /// Per-therapeutic-class overrides.
    #[serde(default)]
    pub class_overrides: BTreeMap<String, i64>,
    /// Per-medication-id overrides; the most specific rule.
    #[serde(default)]
    pub medication_overrides: BTreeMap<String, i64>,
    pub weekend_multiplier: f64,
    pub holiday_multiplier: f64,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl GracePeriodConfig {
    pub fn defaults(patient_id: &str) -> Self {
        GracePeriodConfig {
            patient_id: patient_id.to_string(),
            default_minutes: 60,
            bucket_defaults: BTreeMap::new(),
            class_overrides: BTreeMap::new(),
            medication_overrides: BTreeMap::new(),
            weekend_multiplier: 1.5,
            holiday_multiplier: 2.0,
            holidays: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}
