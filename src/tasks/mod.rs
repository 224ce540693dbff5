//! Background services: periodic event generation, the missed-detection
//! sweep, and the daily archival reset.
//!
//! Each service runs on its own thread against its own database connection,
//! wakes on a fixed interval, and sleeps in small increments so shutdown
//! stays responsive. All three cycles are idempotent, so an interval firing
//! twice (or a restart mid-cycle) is harmless.

pub mod daily_reset;
pub mod generation;
pub mod missed_sweep;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sweep and reset check interval: every 15 minutes.
pub const CHECK_INTERVAL_SECS: u64 = 15 * 60;

/// Generation runs less often; the horizon gives it plenty of slack.
pub const GENERATION_INTERVAL_SECS: u64 = 60 * 60;

/// Sleep granularity for shutdown responsiveness (5 seconds).
const SLEEP_GRANULARITY_SECS: u64 = 5;

/// Handle for one background service thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on
/// `Drop`. Keep it alive for as long as the service should run.
pub struct TaskHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TaskHandle {
    /// Request graceful shutdown. A cycle in progress completes; no new
    /// cycle starts.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Spawn a named periodic service. `work` runs once per interval; its errors
/// are the service's to log, not to propagate.
pub fn start_periodic(
    name: &'static str,
    interval_secs: u64,
    work: impl Fn() + Send + 'static,
) -> TaskHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(task = name, interval_secs, "background service started");
        periodic_loop(name, interval_secs, &flag, work);
    });

    TaskHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn periodic_loop(
    name: &'static str,
    interval_secs: u64,
    shutdown: &AtomicBool,
    work: impl Fn(),
) {
    // First cycle runs immediately so a restart does not delay catch-up
    work();

    while !shutdown.load(Ordering::Relaxed) {
        // Sleep in small increments for responsive shutdown
        for _ in 0..(interval_secs / SLEEP_GRANULARITY_SECS) {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!(task = name, "background service shutting down");
                return;
            }
            std::thread::sleep(Duration::from_secs(SLEEP_GRANULARITY_SECS));
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        work();
    }
    tracing::info!(task = name, "background service shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn check_interval_is_15_minutes() {
        assert_eq!(CHECK_INTERVAL_SECS, 900);
    }

    #[test]
    fn sleep_granularity_divides_both_intervals() {
        assert_eq!(CHECK_INTERVAL_SECS % SLEEP_GRANULARITY_SECS, 0);
        assert_eq!(GENERATION_INTERVAL_SECS % SLEEP_GRANULARITY_SECS, 0);
    }

    #[test]
    fn shutdown_flag_sets_atomic() {
        let handle = TaskHandle {
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        assert!(!handle.shutdown.load(Ordering::Relaxed));
        handle.shutdown();
        assert!(handle.shutdown.load(Ordering::Relaxed));
    }

    #[test]
    fn periodic_service_runs_first_cycle_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handle = start_periodic("test", 60, move || {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        // The immediate first cycle fires before any sleeping
        for _ in 0..100 {
            if count.load(Ordering::Relaxed) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(handle);
        assert!(count.load(Ordering::Relaxed) >= 1);
    }
}
