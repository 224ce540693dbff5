//! Event generation: compiles active schedules against the owning patient's
//! time preferences and materializes concrete dose events over a rolling
//! horizon. Idempotent end to end; re-running over the same window creates
//! nothing new.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::repository::{events, grace as grace_repo, preferences, schedules};
use crate::models::event::DoseEvent;
use crate::models::grace::GracePeriodConfig;
use crate::models::preferences::PatientTimePreferences;
use crate::models::schedule::MedicationSchedule;

use super::compiler::compile_schedule;
use super::grace::resolve_grace;
use super::validation::validate_preferences;
use super::{local_date_of, local_to_utc, patient_timezone, SchedulingError};

pub const DEFAULT_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub created: usize,
    pub skipped_existing: usize,
    pub pruned_stale: usize,
    pub warnings: Vec<String>,
}

impl GenerationOutcome {
    fn absorb(&mut self, other: GenerationOutcome) {
        self.created += other.created;
        self.skipped_existing += other.skipped_existing;
        self.pruned_stale += other.pruned_stale;
        self.warnings.extend(other.warnings);
    }
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Whether a schedule's cadence lands on `date`. Daily cadences hit every
/// day; weekly repeats on the start weekday; monthly repeats on the start
/// day-of-month, clamped to the last day of shorter months.
fn cadence_hits(schedule: &MedicationSchedule, date: NaiveDate) -> bool {
    use crate::models::enums::Frequency;
    match schedule.frequency {
        Frequency::Weekly => (date - schedule.start_date).num_days() % 7 == 0,
        Frequency::Monthly => {
            date.day() == schedule.start_date.day().min(last_day_of_month(date))
        }
        _ => true,
    }
}

/// Generate dose events for one schedule over `[now, now + horizon_days)`.
///
/// Preferences that fail validation block generation for the schedule rather
/// than producing events at nonsense times. A preferences version newer than
/// the one the schedule was compiled against first prunes future
/// still-scheduled events carrying the stale version.
pub fn generate_for_schedule(
    conn: &Connection,
    schedule: &MedicationSchedule,
    prefs: &PatientTimePreferences,
    grace_config: &GracePeriodConfig,
    now: DateTime<Utc>,
    horizon_days: i64,
) -> Result<GenerationOutcome, SchedulingError> {
    let mut outcome = GenerationOutcome::default();

    if schedule.frequency.is_prn() {
        return Ok(outcome);
    }

    let tz = patient_timezone(prefs)?;

    let report = validate_preferences(prefs);
    if !report.is_ok() {
        return Err(SchedulingError::Validation(report.error_summary()));
    }

    if schedule.preferences_version < prefs.version {
        outcome.pruned_stale =
            events::delete_future_scheduled_stale_version(conn, &schedule.id, prefs.version, now)?;
        schedules::set_schedule_preferences_version(conn, &schedule.id, prefs.version)?;
        debug!(
            schedule_id = %schedule.id,
            pruned = outcome.pruned_stale,
            from_version = schedule.preferences_version,
            to_version = prefs.version,
            "pruned stale future events before regeneration"
        );
    }

    let compiled = compile_schedule(schedule.frequency, prefs, &schedule.overrides)?;
    outcome.warnings.extend(compiled.warnings.clone());

    let today = local_date_of(tz, now);
    for offset in 0..horizon_days {
        let day = today + Duration::days(offset);
        if !schedule.generates_on(day) || !cadence_hits(schedule, day) {
            continue;
        }

        for dose in &compiled.doses {
            // A dose in the after-midnight segment of a wrapped bucket lands
            // on the next calendar day but belongs to this one.
            let after_midnight = prefs
                .bucket(&dose.bucket)
                .map(|b| b.is_after_midnight_segment(dose.time))
                .unwrap_or(false);
            let calendar_day = if after_midnight {
                day + Duration::days(1)
            } else {
                day
            };

            let scheduled_at = local_to_utc(tz, calendar_day.and_time(dose.time));
            if scheduled_at < now {
                continue;
            }

            let grace = resolve_grace(
                grace_config,
                schedule.frequency,
                &schedule.medication_id,
                schedule.medication_class.as_deref(),
                &dose.bucket,
                scheduled_at,
                day,
            );

            let event = DoseEvent {
                id: Uuid::new_v4(),
                patient_id: schedule.patient_id.clone(),
                medication_id: schedule.medication_id.clone(),
                schedule_id: schedule.id,
                scheduled_at,
                belongs_to_local_date: day,
                bucket: dose.bucket.clone(),
                status: Default::default(),
                grace_minutes: grace.grace_minutes,
                grace_end: grace.grace_end,
                applied_rules: grace.applied_rules,
                acted_by: None,
                acted_at: None,
                minutes_late: None,
                is_on_time: None,
                notes: None,
                skip_reason: None,
                is_archived: false,
                archived_at: None,
                daily_summary_id: None,
                schedule_version: prefs.version,
                created_at: now,
                updated_at: now,
            };

            if events::insert_event_if_absent(conn, &event)? {
                outcome.created += 1;
            } else {
                outcome.skipped_existing += 1;
            }
        }
    }

    Ok(outcome)
}

/// Generate for every active schedule. A failing patient (missing timezone,
/// invalid preferences) is logged and skipped without blocking the rest.
pub fn generate_all(
    conn: &Connection,
    now: DateTime<Utc>,
    horizon_days: i64,
) -> Result<GenerationOutcome, SchedulingError> {
    let mut outcome = GenerationOutcome::default();

    for schedule in schedules::list_active_schedules(conn)? {
        let prefs = match preferences::get_preferences(conn, &schedule.patient_id)? {
            Some(p) => p,
            None => {
                warn!(
                    patient_id = %schedule.patient_id,
                    schedule_id = %schedule.id,
                    "no time preferences on record; skipping schedule"
                );
                outcome.warnings.push(format!(
                    "patient {} has no time preferences",
                    schedule.patient_id
                ));
                continue;
            }
        };
        let grace_config = grace_repo::get_grace_config(conn, &schedule.patient_id)?;

        match generate_for_schedule(conn, &schedule, &prefs, &grace_config, now, horizon_days) {
            Ok(one) => outcome.absorb(one),
            Err(e) => {
                warn!(
                    patient_id = %schedule.patient_id,
                    schedule_id = %schedule.id,
                    error = %e,
                    "generation failed for schedule"
                );
                outcome
                    .warnings
                    .push(format!("schedule {}: {e}", schedule.id));
            }
        }
    }

    Ok(outcome)
}
