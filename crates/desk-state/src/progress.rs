//! Task progress mirror with a linger-then-hide display policy.

use desk_core::{ProgressSnapshot, ProgressUpdate, Scheduler, Timer};
use std::time::Duration;
use tracing::debug;

/// Default time a final snapshot stays visible.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(3);

/// Progress tracker.
#[derive(Debug)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
    linger: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LINGER)
    }
}

impl ProgressTracker {
    pub fn new(linger: Duration) -> Self {
        Self {
            snapshot: ProgressSnapshot::default(),
            linger,
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn is_visible(&self) -> bool {
        self.snapshot.visible
    }

    /// Apply a pushed update. Dropped while a stop is in flight.
    pub fn update(&mut self, update: ProgressUpdate, stopping: bool, sched: &mut dyn Scheduler) {
        if stopping {
            debug!(task = %update.task_name, "Progress update ignored while stopping");
            return;
        }

        sched.cancel(Timer::ProgressHide);
        self.snapshot = ProgressSnapshot::from_update(update);
        if self.snapshot.is_final {
            sched.schedule(Timer::ProgressHide, self.linger);
        }
    }

    /// Fresh snapshot for a task that was just launched.
    pub fn seed(&mut self, task_name: &str, total: u64, sched: &mut dyn Scheduler) {
        sched.cancel(Timer::ProgressHide);
        self.snapshot = ProgressSnapshot::seeded(task_name, total);
    }

    /// Clear visibility and the final flag. Counters are kept.
    pub fn hide(&mut self, sched: &mut dyn Scheduler) {
        sched.cancel(Timer::ProgressHide);
        self.snapshot.visible = false;
        self.snapshot.is_final = false;
    }

    /// The run ended: let a final snapshot linger, hide anything else now.
    pub fn on_run_ended(&mut self, sched: &mut dyn Scheduler) {
        if self.snapshot.is_final {
            sched.schedule(Timer::ProgressHide, self.linger);
        } else {
            self.hide(sched);
        }
    }

    pub fn on_timer(&mut self, sched: &mut dyn Scheduler, timer: Timer) {
        if timer == Timer::ProgressHide {
            self.hide(sched);
        }
    }
}
