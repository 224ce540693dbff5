//! Consolidated validation pass for time preferences and grace configuration.
//!
//! Returns a structured report consumed uniformly by the API boundary (as a
//! 400 with suggested fixes) and by the event generator (which refuses to
//! generate from erroring preferences). Validation never mutates anything.

use std::str::FromStr;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::grace::GracePeriodConfig;
use crate::models::preferences::{PatientTimePreferences, TimeBucket};

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: String, suggested_fix: Option<String>) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message,
            suggested_fix,
        });
    }

    fn warn(&mut self, field: &str, message: String) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message,
            suggested_fix: None,
        });
    }

    /// One-line rendering of the errors, for log lines and error payloads.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A wrapped range is only legitimate for a genuinely late-night window:
/// both ends adjacent to midnight.
fn is_late_night_wrap(bucket: &TimeBucket) -> bool {
    let evening_start = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
    let morning_end = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
    bucket.earliest >= evening_start && bucket.latest <= morning_end
}

pub fn validate_preferences(prefs: &PatientTimePreferences) -> ValidationReport {
    let mut report = ValidationReport::default();

    if Tz::from_str(&prefs.timezone).is_err() {
        report.error(
            "timezone",
            format!(
                "{:?} is not a recognized IANA timezone identifier",
                prefs.timezone
            ),
            Some("use an identifier such as America/Chicago".into()),
        );
    }

    for bucket in &prefs.buckets {
        let field = format!("buckets.{}", bucket.name);

        if bucket.wraps_midnight() && !is_late_night_wrap(bucket) {
            report.error(
                &field,
                format!(
                    "range {}-{} wraps midnight but is not a late-night window",
                    bucket.earliest.format("%H:%M"),
                    bucket.latest.format("%H:%M")
                ),
                Some("only a bucket spanning the midnight hours may wrap".into()),
            );
            continue;
        }

        if !bucket.contains(bucket.default_time) {
            let suggestion = if bucket.wraps_midnight() {
                NaiveTime::from_hms_opt(0, 0, 0).unwrap()
            } else {
                bucket.earliest
            };
            report.error(
                &field,
                format!(
                    "default time {} is outside its allowed range {}-{}",
                    bucket.default_time.format("%H:%M"),
                    bucket.earliest.format("%H:%M"),
                    bucket.latest.format("%H:%M")
                ),
                Some(format!(
                    "suggested default: {}",
                    suggestion.format("%H:%M")
                )),
            );
        }
    }

    let mut seen = std::collections::BTreeSet::new();
    for bucket in &prefs.buckets {
        if !seen.insert(bucket.name.as_str()) {
            report.error(
                "buckets",
                format!("bucket name {:?} appears more than once", bucket.name),
                None,
            );
        }
    }

    for (frequency, choice) in &prefs.frequency_mapping.0 {
        let field = format!("frequency_mapping.{}", frequency.as_str());
        for name in choice.preferred.iter().chain(choice.fallbacks.iter()) {
            if prefs.bucket(name).is_none() {
                report.error(
                    &field,
                    format!("references unknown bucket {name:?}"),
                    None,
                );
            }
        }
        let has_usable_slot = choice
            .preferred
            .iter()
            .chain(choice.fallbacks.iter())
            .any(|name| prefs.bucket(name).map(|b| b.is_active).unwrap_or(false));
        if !has_usable_slot {
            report.warn(
                &field,
                "no active bucket among preferred or fallback choices; \
                 compiled times will use hard-coded defaults"
                    .into(),
            );
        }
    }

    if prefs.version < 1 {
        report.error("version", "version must be at least 1".into(), None);
    }

    report
}

pub fn validate_grace_config(config: &GracePeriodConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.default_minutes < 0 {
        report.error(
            "default_minutes",
            "grace minutes cannot be negative".into(),
            Some("suggested default: 60".into()),
        );
    }
    for (name, minutes) in config
        .bucket_defaults
        .iter()
        .chain(config.class_overrides.iter())
        .chain(config.medication_overrides.iter())
    {
        if *minutes < 0 {
            report.error(
                name,
                format!("grace minutes for {name:?} cannot be negative"),
                None,
            );
        }
    }

    for (field, value) in [
        ("weekend_multiplier", config.weekend_multiplier),
        ("holiday_multiplier", config.holiday_multiplier),
    ] {
        if value < 1.0 {
            report.error(
                field,
                format!("{value} would shrink the grace window on adjusted days"),
                Some("suggested value: 1.0".into()),
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Frequency;

    fn prefs() -> PatientTimePreferences {
        PatientTimePreferences::system_defaults("patient-1", "America/Chicago")
    }

    #[test]
    fn defaults_pass_validation() {
        let report = validate_preferences(&prefs());
        assert!(report.is_ok(), "{}", report.error_summary());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn night_shift_evening_bucket_is_valid() {
        let mut p = prefs();
        let evening = p.buckets.iter_mut().find(|b| b.name == "evening").unwrap();
        evening.earliest = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        evening.latest = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        evening.default_time = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        assert!(validate_preferences(&p).is_ok());
    }

    #[test]
    fn daytime_wrap_is_rejected() {
        let mut p = prefs();
        let noon = p.buckets.iter_mut().find(|b| b.name == "noon").unwrap();
        noon.earliest = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        noon.latest = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        let report = validate_preferences(&p);
        assert!(!report.is_ok());
        assert!(report.errors[0].message.contains("wraps midnight"));
    }

    #[test]
    fn default_outside_range_gets_suggested_fix() {
        let mut p = prefs();
        let evening = p.buckets.iter_mut().find(|b| b.name == "evening").unwrap();
        evening.default_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let report = validate_preferences(&p);
        assert!(!report.is_ok());
        let issue = &report.errors[0];
        assert!(issue.message.contains("outside its allowed range"));
        assert!(issue.suggested_fix.as_deref().unwrap().contains("17:00"));
    }

    #[test]
    fn bogus_timezone_is_an_error() {
        let mut p = prefs();
        p.timezone = "Central Time".into();
        let report = validate_preferences(&p);
        assert!(report.errors.iter().any(|i| i.field == "timezone"));
    }

    #[test]
    fn mapping_to_unknown_bucket_is_an_error() {
        let mut p = prefs();
        p.frequency_mapping
            .0
            .get_mut(&Frequency::Daily)
            .unwrap()
            .preferred = vec!["dawn".into()];
        let report = validate_preferences(&p);
        assert!(report
            .errors
            .iter()
            .any(|i| i.message.contains("unknown bucket")));
    }

    #[test]
    fn all_inactive_choices_is_a_warning_not_error() {
        let mut p = prefs();
        for bucket in &mut p.buckets {
            bucket.is_active = false;
        }
        let report = validate_preferences(&p);
        assert!(report.is_ok());
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn grace_multiplier_below_one_is_rejected() {
        let mut config = GracePeriodConfig::defaults("patient-1");
        config.weekend_multiplier = 0.5;
        let report = validate_grace_config(&config);
        assert!(!report.is_ok());
        assert_eq!(report.errors[0].field, "weekend_multiplier");
        assert!(report.errors[0].suggested_fix.is_some());
    }

    #[test]
    fn negative_grace_minutes_rejected() {
        let mut config = GracePeriodConfig::defaults("patient-1");
        config.default_minutes = -5;
        config.medication_overrides.insert("med-1".into(), -1);
        let report = validate_grace_config(&config);
        assert_eq!(report.errors.len(), 2);
    }
}
