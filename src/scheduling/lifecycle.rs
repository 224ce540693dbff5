//! The dose-event state machine.
//!
//! `plan_transition` is pure: it inspects the event and the requested action
//! and produces the row write, or refuses. The conditional update in
//! `db::repository::events::apply_transition` is what makes the plan safe
//! under concurrent writers.

use chrono::{DateTime, Utc};

use crate::db::repository::events::TransitionWrite;
use crate::models::enums::DoseStatus;
use crate::models::event::DoseEvent;

use super::SchedulingError;

#[derive(Debug, Clone)]
pub enum DoseAction {
    MarkTaken {
        acted_by: String,
        acted_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    },
    Skip {
        acted_by: String,
        reason: String,
    },
    /// Internal: the missed-detection sweep found the grace window spent.
    SweepMiss,
}

/// Decide the transition for one event.
///
/// Only `scheduled` events can move. Taking inside the grace window yields
/// `taken`; after it, `late` with the delay counted from grace end. Skipping
/// is allowed any time before a terminal state. The sweep may only mark a
/// dose missed once its grace window is actually spent.
pub fn plan_transition(
    event: &DoseEvent,
    action: &DoseAction,
    now: DateTime<Utc>,
) -> Result<TransitionWrite, SchedulingError> {
    if event.status != DoseStatus::Scheduled {
        return Err(SchedulingError::TransitionConflict { id: event.id });
    }

    match action {
        DoseAction::MarkTaken {
            acted_by,
            acted_at,
            notes,
        } => {
            let acted_at = acted_at.unwrap_or(now);
            if event.within_grace(acted_at) {
                Ok(TransitionWrite {
                    status: DoseStatus::Taken,
                    acted_by: Some(acted_by.clone()),
                    acted_at: Some(acted_at),
                    minutes_late: Some(0),
                    is_on_time: Some(true),
                    notes: notes.clone(),
                    skip_reason: None,
                })
            } else {
                Ok(TransitionWrite {
                    status: DoseStatus::Late,
                    acted_by: Some(acted_by.clone()),
                    acted_at: Some(acted_at),
                    minutes_late: Some(event.delay_from(acted_at)),
                    is_on_time: Some(false),
                    notes: notes.clone(),
                    skip_reason: None,
                })
            }
        }
        DoseAction::Skip { acted_by, reason } => Ok(TransitionWrite {
            status: DoseStatus::Skipped,
            acted_by: Some(acted_by.clone()),
            acted_at: Some(now),
            minutes_late: None,
            is_on_time: None,
            notes: None,
            skip_reason: Some(reason.clone()),
        }),
        DoseAction::SweepMiss => {
            if event.within_grace(now) {
                // Grace not yet spent; the sweep came too early for this one
                return Err(SchedulingError::TransitionConflict { id: event.id });
            }
            Ok(TransitionWrite {
                status: DoseStatus::Missed,
                acted_by: None,
                acted_at: None,
                minutes_late: None,
                is_on_time: None,
                notes: None,
                skip_reason: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use uuid::Uuid;

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
            grace_end: scheduled + Duration::minutes(30),
            applied_rules: vec!["patient_default".into()],
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

    fn take(at: DateTime<Utc>) -> DoseAction {
        DoseAction::MarkTaken {
            acted_by: "patient-1".into(),
            acted_at: Some(at),
            notes: None,
        }
    }

    #[test]
    fn taken_within_grace_is_on_time() {
        let e = event();
        let at = e.scheduled_at + Duration::minutes(20);
        let write = plan_transition(&e, &take(at), at).unwrap();
        assert_eq!(write.status, DoseStatus::Taken);
        assert_eq!(write.is_on_time, Some(true));
        assert_eq!(write.minutes_late, Some(0));
    }

    #[test]
    fn taken_at_grace_boundary_is_still_on_time() {
        let e = event();
        let write = plan_transition(&e, &take(e.grace_end), e.grace_end).unwrap();
        assert_eq!(write.status, DoseStatus::Taken);
        assert_eq!(write.is_on_time, Some(true));
    }

    #[test]
    fn taken_after_grace_is_late_with_delay_from_grace_end() {
        let e = event();
        // 08:00 dose, 30 min grace, acted 08:45
        let at = e.scheduled_at + Duration::minutes(45);
        let write = plan_transition(&e, &take(at), at).unwrap();
        assert_eq!(write.status, DoseStatus::Late);
        assert_eq!(write.is_on_time, Some(false));
        assert_eq!(write.minutes_late, Some(15));
    }

    #[test]
    fn skip_records_reason() {
        let e = event();
        let now = e.scheduled_at;
        let action = DoseAction::Skip {
            acted_by: "caregiver-1".into(),
            reason: "nausea".into(),
        };
        let write = plan_transition(&e, &action, now).unwrap();
        assert_eq!(write.status, DoseStatus::Skipped);
        assert_eq!(write.skip_reason.as_deref(), Some("nausea"));
        assert_eq!(write.acted_at, Some(now));
    }

    #[test]
    fn sweep_cannot_miss_before_grace_end() {
        let e = event();
        let early = e.grace_end - Duration::seconds(1);
        assert!(matches!(
            plan_transition(&e, &DoseAction::SweepMiss, early),
            Err(SchedulingError::TransitionConflict { .. })
        ));
        let write = plan_transition(
            &e,
            &DoseAction::SweepMiss,
            e.grace_end + Duration::seconds(1),
        )
        .unwrap();
        assert_eq!(write.status, DoseStatus::Missed);
        assert!(write.acted_by.is_none());
    }

    #[test]
    fn terminal_states_reject_every_action() {
        for status in [
            DoseStatus::Taken,
            DoseStatus::Late,
            DoseStatus::Missed,
            DoseStatus::Skipped,
        ] {
            let mut e = event();
            e.status = status;
            let now = e.grace_end + Duration::hours(1);
            for action in [
                take(now),
                DoseAction::Skip {
                    acted_by: "patient-1".into(),
                    reason: "changed mind".into(),
                },
                DoseAction::SweepMiss,
            ] {
                assert!(matches!(
                    plan_transition(&e, &action, now),
                    Err(SchedulingError::TransitionConflict { .. })
                ));
            }
        }
    }
}
