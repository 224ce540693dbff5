use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DoseStatus;

/// One concrete, trackable instance of a medication being due.
///
/// Identity is the `(medication_id, schedule_id, scheduled_at)` triple, which
/// is what makes event generation idempotent. Append-mostly: a terminal
/// status is never overwritten through normal flows, and an archived event is
/// never un-archived automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub id: Uuid,
    pub patient_id: String,
    pub medication_id: String,
    pub schedule_id: Uuid,
    /// The due instant, UTC.
    pub scheduled_at: DateTime<Utc>,
    /// The patient-local calendar day this dose belongs to. Differs from the
    /// UTC date, and — for the after-midnight segment of a wrapped night
    /// bucket — from the local date of `scheduled_at` itself.
    pub belongs_to_local_date: NaiveDate,
    pub bucket: String,
    pub status: DoseStatus,
    pub grace_minutes: i64,
    pub grace_end: DateTime<Utc>,
    /// Names of the grace rules that produced `grace_minutes`, for audit.
    pub applied_rules: Vec<String>,
    pub acted_by: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
    pub minutes_late: Option<i64>,
    pub is_on_time: Option<bool>,
    pub notes: Option<String>,
    pub skip_reason: Option<String>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub daily_summary_id: Option<Uuid>,
    pub schedule_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoseEvent {
    /// Delay from grace end, counted only once the grace window is spent.
    pub fn delay_from(&self, acted_at: DateTime<Utc>) -> i64 {
        ((acted_at - self.grace_end).num_seconds().max(0) + 59) / 60
    }

    pub fn within_grace(&self, at: DateTime<Utc>) -> bool {
        at <= self.grace_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> DoseEvent {
        let scheduled = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        DoseEvent {
            id: Uuid::new_v4(),
            patient_id: "patient-1".into(),
            medication_id: "med-1".into(),
            schedule_id: Uuid::new_v4(),
            scheduled_at: scheduled,
            belongs_to_local_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            bucket: "morning".into(),
            status: DoseStatus::Scheduled,
            grace_minutes: 30,
            grace_end: scheduled + chrono::Duration::minutes(30),
            applied_rules: vec!["patient_bucket_default".into()],
            acted_by: None,
            acted_at: None,
            minutes_late: None,
            is_on_time: None,
            notes: None,
            skip_reason: None,
            is_archived: false,
            archived_at: None,
            daily_summary_id: None,
            schedule_version: 1,
            created_at: scheduled,
            updated_at: scheduled,
        }
    }

    #[test]
    fn within_grace_up_to_grace_end() {
        let e = event();
        assert!(e.within_grace(e.scheduled_at));
        assert!(e.within_grace(e.grace_end));
        assert!(!e.within_grace(e.grace_end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn delay_counts_from_grace_end_not_scheduled_time() {
        let e = event();
        // 08:00 dose, 30 min grace, acted 08:45 -> 15 minutes late
        let acted = Utc.with_ymd_and_hms(2026, 3, 2, 8, 45, 0).unwrap();
        assert_eq!(e.delay_from(acted), 15);
    }

    #[test]
    fn delay_is_zero_inside_grace() {
        let e = event();
        let acted = Utc.with_ymd_and_hms(2026, 3, 2, 8, 20, 0).unwrap();
        assert_eq!(e.delay_from(acted), 0);
    }

    #[test]
    fn partial_minutes_round_up() {
        let e = event();
        let acted = e.grace_end + chrono::Duration::seconds(61);
        assert_eq!(e.delay_from(acted), 2);
    }
}
