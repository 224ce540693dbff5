//! Grace-period engine: resolves the allowed lateness window for one
//! scheduled dose by cascading configuration rules. Every applied rule is
//! recorded by name so a transition can be audited later.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;

use crate::models::enums::Frequency;
use crate::models::grace::GracePeriodConfig;

pub const RULE_PATIENT_DEFAULT: &str = "patient_default";
pub const RULE_BUCKET_DEFAULT: &str = "patient_bucket_default";
pub const RULE_CLASS_OVERRIDE: &str = "medication_class_override";
pub const RULE_MEDICATION_OVERRIDE: &str = "medication_override";
pub const RULE_WEEKEND: &str = "weekend_multiplier";
pub const RULE_HOLIDAY: &str = "holiday_multiplier";
pub const RULE_PRN: &str = "prn_zero_grace";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceResolution {
    pub grace_minutes: i64,
    pub grace_end: DateTime<Utc>,
    pub applied_rules: Vec<String>,
}

/// Resolve the grace window for a dose.
///
/// Cascade, most specific last: bucket default (or patient default) →
/// medication-class override → medication-id override → weekend multiplier →
/// holiday multiplier. Multipliers can only extend the window; a
/// misconfigured multiplier below 1.0 is clamped by the `max`.
pub fn resolve_grace(
    config: &GracePeriodConfig,
    frequency: Frequency,
    medication_id: &str,
    medication_class: Option<&str>,
    bucket: &str,
    scheduled_at: DateTime<Utc>,
    local_date: NaiveDate,
) -> GraceResolution {
    if frequency.is_prn() {
        // Missed-detection never applies to as-needed medications
        return GraceResolution {
            grace_minutes: 0,
            grace_end: scheduled_at,
            applied_rules: vec![RULE_PRN.to_string()],
        };
    }

    let mut applied = Vec::new();

    let mut minutes = match config.bucket_defaults.get(bucket) {
        Some(m) => {
            applied.push(RULE_BUCKET_DEFAULT.to_string());
            *m
        }
        None => {
            applied.push(RULE_PATIENT_DEFAULT.to_string());
            config.default_minutes
        }
    };

    if let Some(class) = medication_class {
        if let Some(m) = config.class_overrides.get(class) {
            applied.push(RULE_CLASS_OVERRIDE.to_string());
            minutes = *m;
        }
    }

    if let Some(m) = config.medication_overrides.get(medication_id) {
        applied.push(RULE_MEDICATION_OVERRIDE.to_string());
        minutes = *m;
    }

    if matches!(local_date.weekday(), Weekday::Sat | Weekday::Sun) {
        applied.push(RULE_WEEKEND.to_string());
        minutes = apply_multiplier(minutes, config.weekend_multiplier);
    }

    if config.is_holiday(local_date) {
        applied.push(RULE_HOLIDAY.to_string());
        minutes = apply_multiplier(minutes, config.holiday_multiplier);
    }

    GraceResolution {
        grace_minutes: minutes,
        grace_end: scheduled_at + Duration::minutes(minutes),
        applied_rules: applied,
    }
}

fn apply_multiplier(base: i64, multiplier: f64) -> i64 {
    ((base as f64 * multiplier).round() as i64).max(base)
}
