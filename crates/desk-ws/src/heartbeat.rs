//! Heartbeat and liveness tracking for the engine link.
//!
//! While the link is open a ping is sent every `interval`, and a rolling
//! liveness deadline of `interval + grace` is kept. Any inbound frame pushes
//! the deadline out; when it elapses the link is presumed dead.

use desk_core::{Scheduler, Timer};
use std::time::Duration;
use tracing::debug;

/// Heartbeat manager for link health.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// How often to send a ping.
    interval: Duration,
    /// Extra slack on top of `interval` before the link is presumed dead.
    grace: Duration,
    /// Pings sent on the current link.
    pings_sent: u64,
}

impl HeartbeatManager {
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            grace,
            pings_sent: 0,
        }
    }

    /// Time without inbound frames after which the link is force-closed.
    pub fn liveness_timeout(&self) -> Duration {
        self.interval + self.grace
    }

    /// Arm the ping and liveness timers for a freshly opened link.
    pub fn start(&mut self, sched: &mut dyn Scheduler) {
        self.pings_sent = 0;
        sched.schedule(Timer::Heartbeat, self.interval);
        sched.schedule(Timer::Liveness, self.liveness_timeout());
    }

    /// Disarm both timers.
    pub fn stop(&mut self, sched: &mut dyn Scheduler) {
        sched.cancel(Timer::Heartbeat);
        sched.cancel(Timer::Liveness);
    }

    /// Any inbound frame: push the liveness deadline out.
    pub fn record_message(&mut self, sched: &mut dyn Scheduler) {
        sched.schedule(Timer::Liveness, self.liveness_timeout());
    }

    /// A ping went out: arm the next one.
    pub fn record_ping(&mut self, sched: &mut dyn Scheduler) {
        self.pings_sent += 1;
        sched.schedule(Timer::Heartbeat, self.interval);
        debug!(pings_sent = self.pings_sent, "Sent heartbeat ping");
    }

    /// Pings sent since the link opened.
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::ManualScheduler;

    fn manager() -> HeartbeatManager {
        HeartbeatManager::new(Duration::from_secs(25), Duration::from_secs(5))
    }

    #[test]
    fn test_start_arms_both_timers() {
        let mut hb = manager();
        let mut sched = ManualScheduler::new();
        hb.start(&mut sched);
        assert_eq!(sched.deadline(Timer::Heartbeat), Some(Duration::from_secs(25)));
        assert_eq!(sched.deadline(Timer::Liveness), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_message_pushes_deadline_out() {
        let mut hb = manager();
        let mut sched = ManualScheduler::new();
        hb.start(&mut sched);

        assert!(sched.advance(Duration::from_secs(20)).is_empty());
        hb.record_message(&mut sched);
        assert_eq!(sched.deadline(Timer::Liveness), Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_stop_disarms_timers() {
        let mut hb = manager();
        let mut sched = ManualScheduler::new();
        hb.start(&mut sched);
        hb.stop(&mut sched);
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_record_ping_counts_and_rearms() {
        let mut hb = manager();
        let mut sched = ManualScheduler::new();
        hb.start(&mut sched);
        assert_eq!(sched.advance(Duration::from_secs(25)), vec![Timer::Heartbeat]);
        hb.record_ping(&mut sched);
        assert_eq!(hb.pings_sent(), 1);
        assert_eq!(sched.deadline(Timer::Heartbeat), Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_start_resets_ping_count() {
        let mut hb = manager();
        let mut sched = ManualScheduler::new();
        hb.start(&mut sched);
        hb.record_ping(&mut sched);
        hb.record_ping(&mut sched);
        assert_eq!(hb.pings_sent(), 2);

        hb.stop(&mut sched);
        hb.start(&mut sched);
        assert_eq!(hb.pings_sent(), 0);
    }
}
