//! Schedule compiler: frequency + patient time preferences (+ per-medication
//! overrides) → an ordered list of concrete clock times.
//!
//! Pure: never touches the store. Duplicate resolved times are preserved and
//! surfaced as warnings rather than silently deduplicated.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::Serialize;

use crate::models::enums::Frequency;
use crate::models::preferences::PatientTimePreferences;

use super::SchedulingError;

/// One resolved dose slot: the bucket it was attributed to and its clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledDose {
    pub bucket: String,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompiledSchedule {
    pub doses: Vec<CompiledDose>,
    /// Bucket names actually consulted, in dose order.
    pub applied_buckets: Vec<String>,
    pub warnings: Vec<String>,
}

/// Hard-coded safe default when neither the preferred bucket nor any fallback
/// is usable. Keyed by bucket class.
fn class_default_time(bucket: &str) -> NaiveTime {
    let (h, m) = match bucket {
        "noon" => (12, 0),
        "evening" => (18, 0),
        "night" => (22, 0),
        _ => (8, 0),
    };
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Built-in bucket sequence used when the mapping has no entry for a
/// frequency (possible for preferences written before a category existed).
fn builtin_bucket_order(frequency: Frequency) -> Vec<&'static str> {
    match frequency.doses_per_day() {
        2 => vec!["morning", "evening"],
        3 => vec!["morning", "noon", "evening"],
        4 => vec!["morning", "noon", "evening", "night"],
        _ => vec!["morning"],
    }
}

/// Compile a frequency into concrete clock times for one patient.
///
/// Per dose slot: active preferred bucket → its default time; else the first
/// active fallback bucket; else the hard-coded class default. A
/// per-medication override for the resolved (or preferred) bucket replaces
/// the bucket-derived time last.
pub fn compile_schedule(
    frequency: Frequency,
    prefs: &PatientTimePreferences,
    overrides: &BTreeMap<String, NaiveTime>,
) -> Result<CompiledSchedule, SchedulingError> {
    if frequency.is_prn() {
        // PRN medications are never scheduled
        return Ok(CompiledSchedule::default());
    }

    let mut compiled = CompiledSchedule::default();

    let (preferred, fallbacks): (Vec<String>, Vec<String>) =
        match prefs.frequency_mapping.get(frequency) {
            Some(choice) => (choice.preferred.clone(), choice.fallbacks.clone()),
            None => {
                compiled.warnings.push(format!(
                    "no frequency mapping for {}; using built-in bucket order",
                    frequency.as_str()
                ));
                (
                    builtin_bucket_order(frequency)
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    Vec::new(),
                )
            }
        };

    if preferred.len() != frequency.doses_per_day() {
        compiled.warnings.push(format!(
            "mapping for {} lists {} buckets, expected {}",
            frequency.as_str(),
            preferred.len(),
            frequency.doses_per_day()
        ));
    }

    for name in &preferred {
        let (resolved_bucket, time) = match prefs.bucket(name) {
            Some(bucket) if bucket.is_active => (name.clone(), bucket.default_time),
            _ => match fallbacks
                .iter()
                .filter_map(|f| prefs.bucket(f))
                .find(|b| b.is_active)
            {
                Some(fallback) => {
                    compiled.warnings.push(format!(
                        "bucket {name} inactive or missing; fell back to {}",
                        fallback.name
                    ));
                    (fallback.name.clone(), fallback.default_time)
                }
                None => {
                    compiled.warnings.push(format!(
                        "bucket {name} inactive or missing with no active fallback; \
                         using class default"
                    ));
                    (name.clone(), class_default_time(name))
                }
            },
        };

        // Medication-specific override wins over everything bucket-derived
        let time = overrides
            .get(&resolved_bucket)
            .or_else(|| overrides.get(name))
            .copied()
            .unwrap_or(time);

        if compiled.doses.iter().any(|d| d.time == time) {
            compiled.warnings.push(format!(
                "duplicate dose time {} for bucket {resolved_bucket}",
                time.format("%H:%M")
            ));
        }
        compiled.applied_buckets.push(resolved_bucket.clone());
        compiled.doses.push(CompiledDose {
            bucket: resolved_bucket,
            time,
        });
    }

    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> PatientTimePreferences {
        PatientTimePreferences::system_defaults("patient-1", "America/Chicago")
    }

    fn times(compiled: &CompiledSchedule) -> Vec<String> {
        compiled
            .doses
            .iter()
            .map(|d| d.time.format("%H:%M").to_string())
            .collect()
    }

    #[test]
    fn twice_daily_uses_morning_and_evening_defaults() {
        let compiled =
            compile_schedule(Frequency::TwiceDaily, &prefs(), &BTreeMap::new()).unwrap();
        assert_eq!(times(&compiled), vec!["08:00", "18:00"]);
        assert_eq!(compiled.applied_buckets, vec!["morning", "evening"]);
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn compiled_length_matches_frequency_for_all_categories() {
        for f in [
            Frequency::Daily,
            Frequency::TwiceDaily,
            Frequency::ThreeTimesDaily,
            Frequency::FourTimesDaily,
            Frequency::Weekly,
            Frequency::Monthly,
        ] {
            let compiled = compile_schedule(f, &prefs(), &BTreeMap::new()).unwrap();
            assert_eq!(compiled.doses.len(), f.doses_per_day().max(1));
        }
    }

    #[test]
    fn every_compiled_time_lies_in_its_bucket_range() {
        let p = prefs();
        let compiled =
            compile_schedule(Frequency::FourTimesDaily, &p, &BTreeMap::new()).unwrap();
        for dose in &compiled.doses {
            let bucket = p.bucket(&dose.bucket).unwrap();
            assert!(
                bucket.contains(dose.time),
                "{} at {} outside [{}, {}]",
                dose.bucket,
                dose.time,
                bucket.earliest,
                bucket.latest
            );
        }
    }

    #[test]
    fn prn_compiles_to_nothing() {
        let compiled = compile_schedule(Frequency::AsNeeded, &prefs(), &BTreeMap::new()).unwrap();
        assert!(compiled.doses.is_empty());
        assert!(compiled.warnings.is_empty());
    }

    #[test]
    fn inactive_bucket_falls_back_to_first_active_fallback() {
        let mut p = prefs();
        p.buckets
            .iter_mut()
            .find(|b| b.name == "morning")
            .unwrap()
            .is_active = false;
        // twice_daily fallbacks are [noon, night]
        let compiled = compile_schedule(Frequency::TwiceDaily, &p, &BTreeMap::new()).unwrap();
        assert_eq!(times(&compiled), vec!["12:00", "18:00"]);
        assert_eq!(compiled.applied_buckets[0], "noon");
        assert!(!compiled.warnings.is_empty());
    }

    #[test]
    fn missing_bucket_without_fallback_uses_class_default() {
        let mut p = prefs();
        p.buckets.retain(|b| b.name != "night");
        p.frequency_mapping
            .0
            .get_mut(&Frequency::FourTimesDaily)
            .unwrap()
            .fallbacks
            .clear();
        let compiled =
            compile_schedule(Frequency::FourTimesDaily, &p, &BTreeMap::new()).unwrap();
        assert_eq!(times(&compiled), vec!["08:00", "12:00", "18:00", "22:00"]);
        assert!(compiled
            .warnings
            .iter()
            .any(|w| w.contains("class default")));
    }

    #[test]
    fn override_replaces_bucket_derived_time() {
        let mut overrides = BTreeMap::new();
        overrides.insert("evening".to_string(), NaiveTime::from_hms_opt(19, 30, 0).unwrap());
        let compiled = compile_schedule(Frequency::TwiceDaily, &prefs(), &overrides).unwrap();
        assert_eq!(times(&compiled), vec!["08:00", "19:30"]);
    }

    #[test]
    fn duplicate_times_are_kept_and_warned() {
        let mut overrides = BTreeMap::new();
        overrides.insert("evening".to_string(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let compiled = compile_schedule(Frequency::TwiceDaily, &prefs(), &overrides).unwrap();
        assert_eq!(times(&compiled), vec!["08:00", "08:00"]);
        assert!(compiled.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn missing_mapping_entry_uses_builtin_order() {
        let mut p = prefs();
        p.frequency_mapping.0.remove(&Frequency::ThreeTimesDaily);
        let compiled =
            compile_schedule(Frequency::ThreeTimesDaily, &p, &BTreeMap::new()).unwrap();
        assert_eq!(times(&compiled), vec!["08:00", "12:00", "18:00"]);
        assert!(compiled.warnings.iter().any(|w| w.contains("built-in")));
    }
}
