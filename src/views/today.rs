//! The "today" read model: the patient's current local day grouped by time
//! bucket, with urgency lanes derived from the clock. Archived events never
//! appear here; a night-shift dose due shortly after midnight shows up on the
//! day it belongs to, not the calendar day it lands on.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::repository::{events, preferences};
use crate::models::enums::DoseStatus;
use crate::models::event::DoseEvent;
use crate::scheduling::{local_date_of, patient_timezone, SchedulingError};

/// How far ahead a pending dose counts as "due soon".
pub const DUE_SOON_WINDOW_MINUTES: i64 = 120;

#[derive(Debug, Clone, Serialize)]
pub struct TodayBucket {
    pub name: String,
    pub label: String,
    pub events: Vec<DoseEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayView {
    pub patient_id: String,
    pub local_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// Buckets in the patient's configured order; a bucket with no doses
    /// today is omitted.
    pub buckets: Vec<TodayBucket>,
    /// Pending doses whose grace window has already passed.
    pub overdue: Vec<DoseEvent>,
    /// Pending doses inside their grace window right now.
    #[serde(rename = "now")]
    pub due_now: Vec<DoseEvent>,
    /// Pending doses coming up within the due-soon window.
    pub due_soon: Vec<DoseEvent>,
}

/// Assemble the today view for one patient's current local day.
pub fn build_today_view(
    conn: &Connection,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<TodayView, SchedulingError> {
    build_day_view(conn, patient_id, None, now)
}

/// Assemble the view for one patient-local day; `date` defaults to the
/// current local day.
pub fn build_day_view(
    conn: &Connection,
    patient_id: &str,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<TodayView, SchedulingError> {
    let prefs = preferences::get_preferences(conn, patient_id)?.ok_or_else(|| {
        SchedulingError::NotFound {
            entity: "time preferences",
            id: patient_id.to_string(),
        }
    })?;
    let tz = patient_timezone(&prefs)?;
    let local_date = date.unwrap_or_else(|| local_date_of(tz, now));

    let day_events = events::list_events_for_local_date(conn, patient_id, local_date)?;

    let mut overdue = Vec::new();
    let mut due_now = Vec::new();
    let mut due_soon = Vec::new();
    let soon_cutoff = now + Duration::minutes(DUE_SOON_WINDOW_MINUTES);

    for event in &day_events {
        if event.status != DoseStatus::Scheduled {
            continue;
        }
        if now > event.grace_end {
            overdue.push(event.clone());
        } else if event.scheduled_at <= now {
            due_now.push(event.clone());
        } else if event.scheduled_at <= soon_cutoff {
            due_soon.push(event.clone());
        }
    }

    // Patient bucket order first, then any bucket name the preferences no
    // longer know about, in scheduled order.
    let mut buckets: Vec<TodayBucket> = Vec::new();
    for bucket in &prefs.buckets {
        let events: Vec<DoseEvent> = day_events
            .iter()
            .filter(|e| e.bucket == bucket.name)
            .cloned()
            .collect();
        if !events.is_empty() {
            buckets.push(TodayBucket {
                name: bucket.name.clone(),
                label: bucket.label.clone(),
                events,
            });
        }
    }
    for event in &day_events {
        if prefs.bucket(&event.bucket).is_none() {
            match buckets.iter_mut().find(|b| b.name == event.bucket) {
                Some(group) => group.events.push(event.clone()),
                None => buckets.push(TodayBucket {
                    name: event.bucket.clone(),
                    label: event.bucket.clone(),
                    events: vec![event.clone()],
                }),
            }
        }
    }

    Ok(TodayView {
        patient_id: patient_id.to_string(),
        local_date,
        generated_at: now,
        buckets,
        overdue,
        due_now,
        due_soon,
    })
}
