//! Patient time preferences: named time buckets, the frequency → bucket
//! mapping, and lifestyle metadata (wake/sleep, IANA timezone).
//!
//! Preferences are versioned: every mutation bumps `version`, and schedules
//! record the version they were compiled from so stale events can be
//! regenerated after a preference change.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Frequency;

/// A named, patient-configurable period of the day.
///
/// `latest < earliest` means the range wraps midnight; only the night bucket
/// is allowed to carry that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub default_time: NaiveTime,
    pub earliest: NaiveTime,
    pub latest: NaiveTime,
    pub is_active: bool,
}

impl TimeBucket {
    pub fn wraps_midnight(&self) -> bool {
        self.latest < self.earliest
    }

    /// The range as one or two non-wrapping `[start, end]` segments.
    /// A wrapped bucket splits into a pre-midnight and a post-midnight part.
    pub fn normalized_ranges(&self) -> Vec<(NaiveTime, NaiveTime)> {
        if self.wraps_midnight() {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
            let start_of_day = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
            vec![(self.earliest, end_of_day), (start_of_day, self.latest)]
        } else {
            vec![(self.earliest, self.latest)]
        }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.normalized_ranges()
            .iter()
            .any(|(start, end)| t >= *start && t <= *end)
    }

    /// Whether a time falls in the after-midnight segment of a wrapped bucket.
    /// Such doses are attributed to the *previous* local day.
    pub fn is_after_midnight_segment(&self, t: NaiveTime) -> bool {
        self.wraps_midnight() && t <= self.latest
    }

    /// Normalize the historical night-bucket shape on read.
    ///
    /// Older data contains two shapes for the night-shift fix: a bare
    /// `00:00` default inside a non-wrapped range starting at midnight, and
    /// the corrected wrapped `23:00-02:00` range. The wrapped shape is
    /// canonical; only the named night bucket carrying the exact legacy
    /// shape gets re-ranged here, so a deliberately configured midnight
    /// bucket elsewhere is never touched. Stored rows are not rewritten.
    pub fn normalize_legacy_night(&mut self) {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        if self.name == "night"
            && self.default_time == midnight
            && self.earliest == midnight
            && !self.wraps_midnight()
        {
            self.earliest = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
            self.latest = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        }
    }
}

/// Ordered bucket choices for one frequency: the preferred buckets in dose
/// order, plus fallbacks tried in order when a preferred bucket is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketChoice {
    pub preferred: Vec<String>,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

/// Frequency category → bucket choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyMapping(pub BTreeMap<Frequency, BucketChoice>);

impl FrequencyMapping {
    pub fn get(&self, frequency: Frequency) -> Option<&BucketChoice> {
        self.0.get(&frequency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTimePreferences {
    pub patient_id: String,
    pub version: i64,
    pub buckets: Vec<TimeBucket>,
    pub frequency_mapping: FrequencyMapping,
    pub wake_time: NaiveTime,
    pub sleep_time: NaiveTime,
    /// IANA identifier, e.g. `America/Chicago`. Validated on write; generation
    /// fails (and is skipped) for a patient whose zone no longer parses.
    pub timezone: String,
}

impl PatientTimePreferences {
    pub fn bucket(&self, name: &str) -> Option<&TimeBucket> {
        self.buckets.iter().find(|b| b.name == name)
    }

    /// System defaults stamped at patient onboarding.
    pub fn system_defaults(patient_id: &str, timezone: &str) -> Self {
        let bucket = |name: &str, label: &str, d: (u32, u32), e: (u32, u32), l: (u32, u32)| {
            TimeBucket {
                id: Uuid::new_v4(),
                name: name.to_string(),
                label: label.to_string(),
                default_time: NaiveTime::from_hms_opt(d.0, d.1, 0).unwrap(),
                earliest: NaiveTime::from_hms_opt(e.0, e.1, 0).unwrap(),
                latest: NaiveTime::from_hms_opt(l.0, l.1, 0).unwrap(),
                is_active: true,
            }
        };

        let mut mapping = BTreeMap::new();
        let choice = |preferred: &[&str], fallbacks: &[&str]| BucketChoice {
            preferred: preferred.iter().map(|s| s.to_string()).collect(),
            fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        };
        mapping.insert(Frequency::Daily, choice(&["morning"], &["noon", "evening"]));
        mapping.insert(
            Frequency::TwiceDaily,
            choice(&["morning", "evening"], &["noon", "night"]),
        );
        mapping.insert(
            Frequency::ThreeTimesDaily,
            choice(&["morning", "noon", "evening"], &["night"]),
        );
        mapping.insert(
            Frequency::FourTimesDaily,
            choice(&["morning", "noon", "evening", "night"], &[]),
        );
        mapping.insert(Frequency::Weekly, choice(&["morning"], &["noon", "evening"]));
        mapping.insert(Frequency::Monthly, choice(&["morning"], &["noon", "evening"]));

        PatientTimePreferences {
            patient_id: patient_id.to_string(),
            version: 1,
            buckets: vec![
                bucket("morning", "Morning", (8, 0), (6, 0), (10, 0)),
                bucket("noon", "Noon", (12, 0), (11, 0), (14, 0)),
                bucket("evening", "Evening", (18, 0), (17, 0), (20, 0)),
                bucket("night", "Night", (22, 0), (21, 0), (23, 59)),
            ],
            frequency_mapping: FrequencyMapping(mapping),
            wake_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            sleep_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            timezone: timezone.to_string(),
        }
    }
}
