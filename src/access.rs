//! Caller-authorization and outbound-notification seams.
//!
//! Both are deliberately small traits so deployments can plug in a real
//! policy store or push channel. The defaults keep a standalone instance
//! fully functional: every caller is allowed and notifications go to the log.

use crate::models::event::DoseEvent;

/// Decides whether a caller may act on a patient's doses.
pub trait AccessPolicy: Send + Sync {
    fn can_act(&self, caller: &str, patient_id: &str) -> bool;
}

/// Permissive default: any identified caller may act on any patient.
#[derive(Debug, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_act(&self, _caller: &str, _patient_id: &str) -> bool {
        true
    }
}

/// Receives dose-outcome notifications from the background sweep.
pub trait Notifier: Send + Sync {
    fn dose_missed(&self, event: &DoseEvent);
}

/// Default notifier: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dose_missed(&self, event: &DoseEvent) {
        tracing::info!(
            event_id = %event.id,
            patient_id = %event.patient_id,
            medication_id = %event.medication_id,
            scheduled_at = %event.scheduled_at,
            "dose marked missed"
        );
    }
}
