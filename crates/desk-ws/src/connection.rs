//! Engine link connection manager.
//!
//! Owns exactly one logical connection to the engine event stream and drives
//! its lifecycle from three inputs: explicit `connect()`/`disconnect()` calls,
//! socket lifecycle events, and timer expiries. Nothing here blocks or sleeps;
//! every delay is armed through the [`Scheduler`].
//!
//! Closure handling:
//! - An explicit `disconnect()` detaches the socket before closing it, so its
//!   eventual close event is stale and never schedules a reconnect.
//! - Every other closure (remote close, socket error, failed send, liveness
//!   timeout) schedules exactly one reconnect after a fixed delay, replacing
//!   any reconnect already pending. There is no attempt limit.

use crate::heartbeat::HeartbeatManager;
use crate::message::OutboundFrame;
use crate::socket::{Connector, Socket, SocketEvent, SocketId};
use desk_core::{ConnectionState, Scheduler, Timer};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Event stream URL (ws:// or wss://).
    pub url: String,
    /// Ping interval.
    pub heartbeat_interval_ms: u64,
    /// Slack on top of the ping interval before the link is presumed dead.
    pub liveness_grace_ms: u64,
    /// Delay before re-opening a closed link.
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single connect attempt (enforced by the transport).
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval_ms: 25_000,
            liveness_grace_ms: 5_000,
            reconnect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn liveness_grace(&self) -> Duration {
        Duration::from_millis(self.liveness_grace_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Why a link went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The socket reported closure.
    Remote { code: u16, reason: String },
    /// The socket reported an error.
    Error(String),
    /// A ping could not be written.
    SendFailed(String),
    /// No inbound frame within the liveness window.
    LivenessTimeout,
}

impl CloseReason {
    /// Label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote_close",
            Self::Error(_) => "socket_error",
            Self::SendFailed(_) => "send_failed",
            Self::LivenessTimeout => "liveness_timeout",
        }
    }
}

/// Link-level events surfaced to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    /// The link went down; a reconnect is scheduled.
    Disconnected(CloseReason),
    /// Raw inbound text frame, for the event router.
    Frame(String),
}

struct ActiveSocket<S> {
    id: SocketId,
    socket: S,
}

/// Engine link connection manager.
pub struct ConnectionManager<C: Connector> {
    config: ConnectionConfig,
    connector: C,
    state: ConnectionState,
    /// Set when an attempt starts, cleared when it opens or fails. Socket state
    /// lags attempt initiation, so this flag is the guard against overlapping
    /// `connect()` calls.
    connecting: bool,
    socket: Option<ActiveSocket<C::Socket>>,
    heartbeat: HeartbeatManager,
    /// Closures since the link was last open.
    reconnect_count: u32,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(config: ConnectionConfig, connector: C) -> Self {
        let heartbeat = HeartbeatManager::new(config.heartbeat_interval(), config.liveness_grace());
        Self {
            config,
            connector,
            state: ConnectionState::Disconnected,
            connecting: false,
            socket: None,
            heartbeat,
            reconnect_count: 0,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Id of the socket currently owned, if any.
    pub fn current_socket(&self) -> Option<SocketId> {
        self.socket.as_ref().map(|s| s.id)
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    /// Start a connection attempt unless one is in flight or the link is open.
    pub fn connect(&mut self, sched: &mut dyn Scheduler) {
        if self.connecting || self.socket.is_some() {
            debug!(state = %self.state, "Connect skipped, attempt in flight or link open");
            return;
        }

        // An explicit connect supersedes a scheduled one.
        sched.cancel(Timer::Reconnect);

        self.connecting = true;
        self.state = ConnectionState::Connecting;
        let id = SocketId::next();

        info!(url = %self.config.url, socket = %id, "Connecting to engine event stream");
        let socket = self.connector.open(id, &self.config.url);
        self.socket = Some(ActiveSocket { id, socket });
    }

    /// Tear the link down without scheduling a reconnect.
    ///
    /// Cancels the heartbeat, liveness and reconnect timers, then detaches
    /// and closes the socket.
    pub fn disconnect(&mut self, sched: &mut dyn Scheduler) {
        self.heartbeat.stop(sched);
        sched.cancel(Timer::Reconnect);
        self.connecting = false;

        // Detach before closing: the close event for this id is now stale.
        if let Some(mut active) = self.socket.take() {
            info!(socket = %active.id, "Disconnecting from engine event stream");
            active.socket.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Apply a lifecycle event from socket `id`.
    pub fn handle_socket_event(
        &mut self,
        sched: &mut dyn Scheduler,
        id: SocketId,
        event: SocketEvent,
    ) -> Option<LinkEvent> {
        if self.current_socket() != Some(id) {
            debug!(socket = %id, kind = event.kind(), "Ignoring event from detached socket");
            return None;
        }

        match event {
            SocketEvent::Opened => {
                self.connecting = false;
                self.state = ConnectionState::Open;
                self.reconnect_count = 0;
                self.heartbeat.start(sched);
                info!(socket = %id, "Engine event stream connected");
                Some(LinkEvent::Connected)
            }
            SocketEvent::Frame(text) => {
                self.heartbeat.record_message(sched);
                Some(LinkEvent::Frame(text))
            }
            SocketEvent::Error(reason) => {
                warn!(socket = %id, %reason, "Engine event stream error");
                Some(self.close_and_reschedule(sched, CloseReason::Error(reason)))
            }
            SocketEvent::Closed { code, reason } => {
                warn!(socket = %id, code, %reason, "Engine event stream closed");
                Some(self.close_and_reschedule(sched, CloseReason::Remote { code, reason }))
            }
        }
    }

    /// Handle an expired link timer. Timers owned by other components are
    /// ignored.
    pub fn handle_timer(&mut self, sched: &mut dyn Scheduler, timer: Timer) -> Option<LinkEvent> {
        match timer {
            Timer::Heartbeat => self.send_heartbeat(sched),
            Timer::Liveness => {
                if self.socket.is_none() {
                    return None;
                }
                error!(
                    timeout_ms = self.heartbeat.liveness_timeout().as_millis() as u64,
                    "No inbound frame within liveness window, forcing close"
                );
                Some(self.close_and_reschedule(sched, CloseReason::LivenessTimeout))
            }
            Timer::Reconnect => {
                info!(attempt = self.reconnect_count, "Reconnect timer fired");
                self.connect(sched);
                None
            }
            Timer::ProgressHide | Timer::SettingsSave => None,
        }
    }

    fn send_heartbeat(&mut self, sched: &mut dyn Scheduler) -> Option<LinkEvent> {
        if self.state != ConnectionState::Open {
            return None;
        }
        let active = self.socket.as_mut()?;

        let sent = OutboundFrame::ping()
            .to_json()
            .and_then(|frame| active.socket.send(frame));
        match sent {
            Ok(()) => {
                self.heartbeat.record_ping(sched);
                None
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat send failed");
                Some(self.close_and_reschedule(sched, CloseReason::SendFailed(e.to_string())))
            }
        }
    }

    /// Drop the current socket and schedule the single reconnect attempt.
    fn close_and_reschedule(&mut self, sched: &mut dyn Scheduler, reason: CloseReason) -> LinkEvent {
        self.heartbeat.stop(sched);
        if let Some(mut active) = self.socket.take() {
            active.socket.close();
        }
        self.connecting = false;
        self.state = ConnectionState::Disconnected;
        self.reconnect_count = self.reconnect_count.saturating_add(1);

        let delay = self.config.reconnect_delay();
        sched.schedule(Timer::Reconnect, delay);
        warn!(
            reason = reason.label(),
            attempt = self.reconnect_count,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );

        LinkEvent::Disconnected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::MemoryConnector;
    use desk_core::ManualScheduler;

    fn setup() -> (ConnectionManager<MemoryConnector>, MemoryConnector, ManualScheduler) {
        let connector = MemoryConnector::new();
        let config = ConnectionConfig {
            url: "ws://engine.test/ws".to_string(),
            ..Default::default()
        };
        (
            ConnectionManager::new(config, connector.clone()),
            connector,
            ManualScheduler::new(),
        )
    }

    fn open(
        manager: &mut ConnectionManager<MemoryConnector>,
        sched: &mut ManualScheduler,
    ) -> SocketId {
        manager.connect(sched);
        let id = manager.current_socket().unwrap();
        assert_eq!(
            manager.handle_socket_event(sched, id, SocketEvent::Opened),
            Some(LinkEvent::Connected)
        );
        id
    }

    fn drive(
        manager: &mut ConnectionManager<MemoryConnector>,
        sched: &mut ManualScheduler,
        by: Duration,
    ) -> Vec<LinkEvent> {
        let until = sched.now() + by;
        let mut events = Vec::new();
        while let Some(timer) = sched.next_due(until) {
            events.extend(manager.handle_timer(sched, timer));
        }
        sched.advance_to(until);
        events
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.heartbeat_interval_ms, 25_000);
        assert_eq!(config.liveness_grace_ms, 5_000);
        assert_eq!(config.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn test_overlapping_connects_open_one_socket() {
        let (mut manager, connector, mut sched) = setup();
        manager.connect(&mut sched);
        manager.connect(&mut sched);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(connector.opened().len(), 1);

        let id = manager.current_socket().unwrap();
        manager.handle_socket_event(&mut sched, id, SocketEvent::Opened);
        manager.connect(&mut sched);
        assert_eq!(connector.opened().len(), 1);
        assert!(manager.is_open());
    }

    #[test]
    fn test_heartbeat_sent_on_interval() {
        let (mut manager, connector, mut sched) = setup();
        let id = open(&mut manager, &mut sched);

        // Keep the link alive with inbound frames; pings still go out.
        for _ in 0..3 {
            drive(&mut manager, &mut sched, Duration::from_secs(20));
            manager.handle_socket_event(&mut sched, id, SocketEvent::Frame("{}".to_string()));
        }

        let pings: Vec<_> = connector
            .sent()
            .into_iter()
            .filter(|(_, frame)| frame == r#"{"type":"ping"}"#)
            .collect();
        assert_eq!(pings.len(), 2);
        assert!(manager.is_open());
    }

    #[test]
    fn test_liveness_timeout_forces_close_and_schedules_reconnect() {
        let (mut manager, connector, mut sched) = setup();
        let id = open(&mut manager, &mut sched);

        let events = drive(&mut manager, &mut sched, Duration::from_secs(30));
        assert_eq!(
            events,
            vec![LinkEvent::Disconnected(CloseReason::LivenessTimeout)]
        );
        assert_eq!(connector.closed(), vec![id]);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            sched.deadline(Timer::Reconnect),
            Some(Duration::from_secs(35))
        );
        assert!(!sched.is_pending(Timer::Heartbeat));
    }

    #[test]
    fn test_any_frame_resets_liveness_deadline() {
        let (mut manager, _connector, mut sched) = setup();
        let id = open(&mut manager, &mut sched);

        drive(&mut manager, &mut sched, Duration::from_secs(29));
        manager.handle_socket_event(
            &mut sched,
            id,
            SocketEvent::Frame(r#"{"type":"log","payload":{}}"#.to_string()),
        );
        let events = drive(&mut manager, &mut sched, Duration::from_secs(29));
        assert!(events.is_empty());
        assert!(manager.is_open());
    }

    #[test]
    fn test_repeated_closures_keep_single_reconnect_timer() {
        let (mut manager, connector, mut sched) = setup();

        for round in 0..5 {
            manager.connect(&mut sched);
            let id = manager.current_socket().unwrap();
            let event = manager.handle_socket_event(
                &mut sched,
                id,
                SocketEvent::Closed {
                    code: 1006,
                    reason: format!("drop {round}"),
                },
            );
            assert!(matches!(event, Some(LinkEvent::Disconnected(_))));
            assert!(sched.is_pending(Timer::Reconnect));
            assert!(connector.live().is_empty());
        }
        assert_eq!(sched.pending_count(), 1);
        assert_eq!(manager.reconnect_count(), 5);
    }

    #[test]
    fn test_reconnect_timer_opens_new_socket() {
        let (mut manager, connector, mut sched) = setup();
        let first = open(&mut manager, &mut sched);
        manager.handle_socket_event(
            &mut sched,
            first,
            SocketEvent::Closed {
                code: 1001,
                reason: "restart".to_string(),
            },
        );

        drive(&mut manager, &mut sched, Duration::from_secs(5));
        let second = manager.current_socket().unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(connector.live(), vec![second]);
    }

    #[test]
    fn test_error_closes_socket_and_reschedules() {
        let (mut manager, connector, mut sched) = setup();
        manager.connect(&mut sched);
        let id = manager.current_socket().unwrap();

        let event = manager.handle_socket_event(
            &mut sched,
            id,
            SocketEvent::Error("refused".to_string()),
        );
        assert_eq!(
            event,
            Some(LinkEvent::Disconnected(CloseReason::Error("refused".to_string())))
        );
        assert_eq!(connector.closed(), vec![id]);

        // The trailing close event from the same socket is stale.
        let trailing = manager.handle_socket_event(
            &mut sched,
            id,
            SocketEvent::Closed {
                code: 1006,
                reason: String::new(),
            },
        );
        assert_eq!(trailing, None);
        assert_eq!(sched.pending_count(), 1);
    }

    #[test]
    fn test_disconnect_cancels_timers_and_suppresses_reconnect() {
        let (mut manager, connector, mut sched) = setup();
        let id = open(&mut manager, &mut sched);

        manager.disconnect(&mut sched);
        assert_eq!(sched.pending_count(), 0);
        assert_eq!(connector.closed(), vec![id]);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let late_close = manager.handle_socket_event(
            &mut sched,
            id,
            SocketEvent::Closed {
                code: 1000,
                reason: "closed by client".to_string(),
            },
        );
        assert_eq!(late_close, None);
        assert!(!sched.is_pending(Timer::Reconnect));
    }

    #[test]
    fn test_disconnect_cancels_pending_reconnect() {
        let (mut manager, connector, mut sched) = setup();
        let id = open(&mut manager, &mut sched);
        manager.handle_socket_event(
            &mut sched,
            id,
            SocketEvent::Closed {
                code: 1006,
                reason: String::new(),
            },
        );
        assert!(sched.is_pending(Timer::Reconnect));

        manager.disconnect(&mut sched);
        assert!(drive(&mut manager, &mut sched, Duration::from_secs(60)).is_empty());
        assert_eq!(connector.opened().len(), 1);
    }

    #[test]
    fn test_failed_heartbeat_send_closes_link() {
        let (mut manager, connector, mut sched) = setup();
        open(&mut manager, &mut sched);
        connector.set_fail_sends(true);

        let events = drive(&mut manager, &mut sched, Duration::from_secs(25));
        assert!(matches!(
            events.as_slice(),
            [LinkEvent::Disconnected(CloseReason::SendFailed(_))]
        ));
        assert!(sched.is_pending(Timer::Reconnect));
    }

    #[test]
    fn test_foreign_timers_ignored() {
        let (mut manager, _connector, mut sched) = setup();
        assert_eq!(manager.handle_timer(&mut sched, Timer::ProgressHide), None);
        assert_eq!(manager.handle_timer(&mut sched, Timer::SettingsSave), None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
