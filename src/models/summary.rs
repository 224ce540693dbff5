use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DoseStatus;
use super::event::DoseEvent;

/// Immutable per-patient-per-day aggregate of dose outcomes.
///
/// Created exactly once per `(patient_id, local_date)` by the daily archival
/// service; the unique key in the store is what enforces the exactly-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub id: Uuid,
    pub patient_id: String,
    pub local_date: NaiveDate,
    pub scheduled_count: i64,
    /// Doses acknowledged as taken, on time or late.
    pub taken_count: i64,
    pub on_time_count: i64,
    pub late_count: i64,
    pub missed_count: i64,
    pub skipped_count: i64,
    pub adherence_rate: f64,
    pub on_time_rate: f64,
    pub average_delay_minutes: f64,
    pub longest_delay_minutes: i64,
    pub event_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DailySummary {
    /// Aggregate a day's events. Pure; the caller decides what "the day" is.
    pub fn from_events(patient_id: &str, local_date: NaiveDate, events: &[DoseEvent]) -> Self {
        let scheduled_count = events.len() as i64;
        let mut on_time = 0i64;
        let mut late = 0i64;
        let mut missed = 0i64;
        let mut skipped = 0i64;
        let mut delays: Vec<i64> = Vec::new();

        for event in events {
            match event.status {
                DoseStatus::Taken => on_time += 1,
                DoseStatus::Late => {
                    late += 1;
                    delays.push(event.minutes_late.unwrap_or(0));
                }
                DoseStatus::Missed => missed += 1,
                DoseStatus::Skipped => skipped += 1,
                // Still-pending events at archival time count as unacknowledged
                DoseStatus::Scheduled => missed += 1,
            }
        }

        let taken = on_time + late;
        let acted = taken;
        let adherence_rate = if scheduled_count > 0 {
            taken as f64 / scheduled_count as f64
        } else {
            0.0
        };
        let on_time_rate = if acted > 0 {
            on_time as f64 / acted as f64
        } else {
            0.0
        };
        let average_delay_minutes = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<i64>() as f64 / delays.len() as f64
        };
        let longest_delay_minutes = delays.iter().copied().max().unwrap_or(0);

        DailySummary {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            local_date,
            scheduled_count,
            taken_count: taken,
            on_time_count: on_time,
            late_count: late,
            missed_count: missed,
            skipped_count: skipped,
            adherence_rate,
            on_time_rate,
            average_delay_minutes,
            longest_delay_minutes,
            event_ids: events.iter().map(|e| e.id).collect(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_with(status: DoseStatus, minutes_late: Option<i64>) -> DoseEvent {
        let scheduled = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        DoseEvent {
            id: Uuid::new_v4(),
            patient_id: "patient-1".into(),
            medication_id: "med-1".into(),
            schedule_id: Uuid::new_v4(),
            scheduled_at: scheduled,
            belongs_to_local_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            bucket: "morning".into(),
            status,
            grace_minutes: 30,
            grace_end: scheduled + chrono::Duration::minutes(30),
            applied_rules: Vec::new(),
            acted_by: None,
            acted_at: None,
            minutes_late,
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
    fn adherence_counts_taken_and_late() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let events = vec![
            event_with(DoseStatus::Taken, None),
            event_with(DoseStatus::Late, Some(20)),
            event_with(DoseStatus::Missed, None),
            event_with(DoseStatus::Skipped, None),
        ];
        let summary = DailySummary::from_events("patient-1", date, &events);
        assert_eq!(summary.scheduled_count, 4);
        assert_eq!(summary.taken_count, 2);
        assert_eq!(summary.on_time_count, 1);
        assert_eq!(summary.late_count, 1);
        assert_eq!(summary.missed_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert!((summary.adherence_rate - 0.5).abs() < f64::EPSILON);
        assert!((summary.on_time_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn delay_stats_from_late_events() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let events = vec![
            event_with(DoseStatus::Late, Some(10)),
            event_with(DoseStatus::Late, Some(30)),
        ];
        let summary = DailySummary::from_events("patient-1", date, &events);
        assert!((summary.average_delay_minutes - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary.longest_delay_minutes, 30);
    }

    #[test]
    fn empty_day_yields_zero_rates() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let summary = DailySummary::from_events("patient-1", date, &[]);
        assert_eq!(summary.scheduled_count, 0);
        assert_eq!(summary.adherence_rate, 0.0);
        assert_eq!(summary.on_time_rate, 0.0);
    }

    #[test]
    fn still_scheduled_at_archival_counts_as_missed() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let events = vec![event_with(DoseStatus::Scheduled, None)];
        let summary = DailySummary::from_events("patient-1", date, &events);
        assert_eq!(summary.missed_count, 1);
        assert_eq!(summary.taken_count, 0);
    }
}
