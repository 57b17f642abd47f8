//! Client-side mirrors of engine state.
//!
//! Each mirror owns its state and is mutated only through its own
//! operations:
//! - [`StatusTracker`]: run/stop flags, status line and derived severity
//! - [`ProgressTracker`]: last task progress with linger-then-hide display
//! - [`PositionMirror`]: open positions, close patches, selection, aggregates
//! - [`LogBook`]: bounded operator log
//!
//! [`Mirrors`] wires the one cross-mirror rule: the end of a run winds the
//! progress display down, and progress pushes are dropped while stopping.

pub mod logbook;
pub mod positions;
pub mod progress;
pub mod status;

pub use logbook::LogBook;
pub use positions::{CloseOutcome, PositionMirror, FULL_CLOSE_EPSILON};
pub use progress::ProgressTracker;
pub use status::{StatusChange, StatusTracker};

use desk_core::{ProgressUpdate, Scheduler, Timer};
use std::time::Duration;

/// The status, progress, position and log mirrors of one console.
#[derive(Debug, Default)]
pub struct Mirrors {
    pub status: StatusTracker,
    pub progress: ProgressTracker,
    pub positions: PositionMirror,
    pub log: LogBook,
}

impl Mirrors {
    pub fn new(progress_linger: Duration, log_capacity: usize) -> Self {
        Self {
            status: StatusTracker::new(),
            progress: ProgressTracker::new(progress_linger),
            positions: PositionMirror::new(),
            log: LogBook::new(log_capacity),
        }
    }

    /// Status write that also winds progress down when the run ends.
    pub fn set_status(
        &mut self,
        message: impl Into<String>,
        running: Option<bool>,
        sched: &mut dyn Scheduler,
    ) {
        if self.status.set_status(message, running) == StatusChange::RunEnded {
            self.progress.on_run_ended(sched);
        }
    }

    /// Progress push, gated on the stop state.
    pub fn update_progress(&mut self, update: ProgressUpdate, sched: &mut dyn Scheduler) {
        self.progress
            .update(update, self.status.is_stopping(), sched);
    }

    pub fn on_timer(&mut self, sched: &mut dyn Scheduler, timer: Timer) {
        self.progress.on_timer(sched, timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::ManualScheduler;

    fn final_update() -> ProgressUpdate {
        ProgressUpdate {
            success_count: 2,
            failed_count: 0,
            total: 2,
            task_name: "open".to_string(),
            is_final: true,
        }
    }

    #[test]
    fn test_stop_blocks_progress_until_run_ends() {
        let mut mirrors = Mirrors::default();
        let mut sched = ManualScheduler::new();
        mirrors.set_status("Working", Some(true), &mut sched);
        mirrors.status.initiate_stop();

        mirrors.update_progress(final_update(), &mut sched);
        assert!(!mirrors.progress.is_visible());

        mirrors.set_status("Stopped", Some(false), &mut sched);
        mirrors.update_progress(final_update(), &mut sched);
        assert!(mirrors.progress.is_visible());
    }

    #[test]
    fn test_run_end_hides_running_progress() {
        let mut mirrors = Mirrors::default();
        let mut sched = ManualScheduler::new();
        mirrors.set_status("Working", Some(true), &mut sched);
        mirrors.progress.seed("sync", 5, &mut sched);

        mirrors.set_status("Ready", Some(false), &mut sched);
        assert!(!mirrors.progress.is_visible());
    }

    #[test]
    fn test_final_progress_lingers_after_run_end() {
        let mut mirrors = Mirrors::default();
        let mut sched = ManualScheduler::new();
        mirrors.set_status("Working", Some(true), &mut sched);
        mirrors.update_progress(final_update(), &mut sched);
        mirrors.set_status("Ready", Some(false), &mut sched);
        assert!(mirrors.progress.is_visible());

        for timer in sched.advance(Duration::from_secs(3)) {
            mirrors.on_timer(&mut sched, timer);
        }
        assert!(!mirrors.progress.is_visible());
    }
}
