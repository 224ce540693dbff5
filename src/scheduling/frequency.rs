//! Frequency normalization: maps the recognized dosing-instruction strings
//! and abbreviations onto the closed `Frequency` enum. Anything outside the
//! table is rejected; there is deliberately no "assume daily" fallback.

use crate::models::enums::Frequency;

use super::SchedulingError;

/// Normalize a dosing-frequency string.
///
/// Matching is case-insensitive and tolerant of underscores, hyphens and
/// repeated whitespace. Latin abbreviations (BID/TID/QID) and the
/// "every N hours" forms map onto the same categories.
pub fn normalize_frequency(input: &str) -> Result<Frequency, SchedulingError> {
    let cleaned = input
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let frequency = match cleaned.as_str() {
        "daily" | "once daily" | "once a day" | "1x daily" | "qd" | "od" | "every 24 hours" => {
            Frequency::Daily
        }
        "twice daily" | "twice a day" | "2x daily" | "bid" | "every 12 hours" => {
            Frequency::TwiceDaily
        }
        "three times daily" | "three times a day" | "3x daily" | "tid" | "every 8 hours" => {
            Frequency::ThreeTimesDaily
        }
        "four times daily" | "four times a day" | "4x daily" | "qid" | "every 6 hours" => {
            Frequency::FourTimesDaily
        }
        "weekly" | "once weekly" | "once a week" => Frequency::Weekly,
        "monthly" | "once monthly" | "once a month" => Frequency::Monthly,
        "as needed" | "prn" | "when required" => Frequency::AsNeeded,
        _ => return Err(SchedulingError::UnsupportedFrequency(input.to_string())),
    };
    Ok(frequency)
}
