//! Timer scheduling abstraction.
//!
//! Every timed effect in the console (heartbeat, liveness deadline, reconnect
//! delay, progress linger, settings debounce) is armed through [`Scheduler`].
//! Timers are keyed by kind: arming a kind that is already pending replaces it,
//! so at most one timer of each kind exists at any time.
//!
//! Production code drives a tokio `DelayQueue`; tests use [`ManualScheduler`],
//! a simulated clock that only moves when told to.

use std::collections::HashMap;
use std::time::Duration;

/// Kinds of timed effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timer {
    /// Emit the next liveness ping.
    Heartbeat,
    /// No inbound frame arrived in time, force-close the link.
    Liveness,
    /// Re-open the link after a closure.
    Reconnect,
    /// Hide a final progress snapshot after the linger window.
    ProgressHide,
    /// Persist the settings snapshot after the debounce window.
    SettingsSave,
}

impl Timer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Liveness => "liveness",
            Self::Reconnect => "reconnect",
            Self::ProgressHide => "progress_hide",
            Self::SettingsSave => "settings_save",
        }
    }
}

/// Schedule-after / cancel interface for single-shot timers.
pub trait Scheduler {
    /// Arm `timer` to fire after `delay`, replacing any pending instance.
    fn schedule(&mut self, timer: Timer, delay: Duration);

    /// Disarm `timer`. No-op when it is not pending.
    fn cancel(&mut self, timer: Timer);

    /// Whether `timer` is armed.
    fn is_pending(&self, timer: Timer) -> bool;
}

/// Simulated clock for deterministic tests.
///
/// Time starts at zero and only advances through [`ManualScheduler::next_due`]
/// or [`ManualScheduler::advance`].
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    seq: u64,
    /// Timer -> (deadline, arming sequence). The sequence breaks deadline ties
    /// in arming order.
    pending: HashMap<Timer, (Duration, u64)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time since start.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of armed timers.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Absolute deadline of an armed timer.
    pub fn deadline(&self, timer: Timer) -> Option<Duration> {
        self.pending.get(&timer).map(|(at, _)| *at)
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to its
    /// deadline. Returns `None` (and leaves the clock alone) when nothing is due.
    ///
    /// Callers dispatch the returned timer before asking again, so timers armed
    /// by the handler are seen by the next call.
    pub fn next_due(&mut self, until: Duration) -> Option<Timer> {
        let (timer, (at, _)) = self
            .pending
            .iter()
            .filter(|(_, (at, _))| *at <= until)
            .min_by_key(|(_, (at, seq))| (*at, *seq))
            .map(|(t, v)| (*t, *v))?;
        self.pending.remove(&timer);
        self.now = self.now.max(at);
        Some(timer)
    }

    /// Move the clock to `until` without firing anything. Used after a
    /// `next_due` loop has dispatched every timer up to `until`. The clock
    /// never moves backwards.
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Advance the clock by `by`, returning every timer that fired in
    /// deadline order. Timers are not re-armed here.
    pub fn advance(&mut self, by: Duration) -> Vec<Timer> {
        let target = self.now + by;
        let mut fired = Vec::new();
        while let Some(timer) = self.next_due(target) {
            fired.push(timer);
        }
        self.now = target;
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, timer: Timer, delay: Duration) {
        self.seq += 1;
        self.pending.insert(timer, (self.now + delay, self.seq));
    }

    fn cancel(&mut self, timer: Timer) {
        self.pending.remove(&timer);
    }

    fn is_pending(&self, timer: Timer) -> bool {
        self.pending.contains_key(&timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_replaces_pending_timer() {
        let mut sched = ManualScheduler::new();
        sched.schedule(Timer::Reconnect, Duration::from_secs(5));
        sched.schedule(Timer::Reconnect, Duration::from_secs(7));
        assert_eq!(sched.pending_count(), 1);
        assert_eq!(sched.deadline(Timer::Reconnect), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_advance_fires_in_deadline_order() {
        let mut sched = ManualScheduler::new();
        sched.schedule(Timer::Liveness, Duration::from_secs(30));
        sched.schedule(Timer::Heartbeat, Duration::from_secs(25));
        sched.schedule(Timer::SettingsSave, Duration::from_secs(60));

        let fired = sched.advance(Duration::from_secs(30));
        assert_eq!(fired, vec![Timer::Heartbeat, Timer::Liveness]);
        assert_eq!(sched.now(), Duration::from_secs(30));
        assert!(sched.is_pending(Timer::SettingsSave));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut sched = ManualScheduler::new();
        sched.schedule(Timer::ProgressHide, Duration::from_secs(3));
        sched.cancel(Timer::ProgressHide);
        assert!(sched.advance(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_next_due_moves_clock_to_deadline() {
        let mut sched = ManualScheduler::new();
        sched.schedule(Timer::Heartbeat, Duration::from_secs(25));
        assert_eq!(sched.next_due(Duration::from_secs(10)), None);
        assert_eq!(sched.now(), Duration::ZERO);
        assert_eq!(
            sched.next_due(Duration::from_secs(100)),
            Some(Timer::Heartbeat)
        );
        assert_eq!(sched.now(), Duration::from_secs(25));
    }

    #[test]
    fn test_dispatch_loops_accumulate_time() {
        let mut sched = ManualScheduler::new();
        sched.schedule(Timer::ProgressHide, Duration::from_secs(3));

        // Two quiet one-second steps, then the timer is due on the third.
        for _ in 0..2 {
            let until = sched.now() + Duration::from_secs(1);
            assert_eq!(sched.next_due(until), None);
            sched.advance_to(until);
        }
        assert_eq!(sched.now(), Duration::from_secs(2));

        let until = sched.now() + Duration::from_secs(1);
        assert_eq!(sched.next_due(until), Some(Timer::ProgressHide));
        sched.advance_to(until);
        assert_eq!(sched.now(), Duration::from_secs(3));

        sched.advance_to(Duration::from_secs(1));
        assert_eq!(sched.now(), Duration::from_secs(3));
    }
}
