//! Socket abstraction used by the connection manager.
//!
//! A [`Connector`] starts a connection attempt and hands back a [`Socket`]
//! handle immediately. Everything that happens afterwards (open, frames,
//! errors, closure) is reported back as a [`SocketEvent`] tagged with the
//! [`SocketId`] the attempt was started with, so events from a socket the
//! manager has already let go of can be told apart and ignored.

use crate::error::WsResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide source of socket ids.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection attempt, unique across every manager in the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl SocketId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle events reported by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed { code: u16, reason: String },
}

impl SocketEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Frame(_) => "frame",
            Self::Error(_) => "error",
            Self::Closed { .. } => "closed",
        }
    }
}

/// Handle to a live (or opening) socket.
pub trait Socket: Send {
    /// Queue a text frame.
    fn send(&mut self, frame: String) -> WsResult<()>;

    /// Close the socket. Idempotent.
    fn close(&mut self);
}

/// Starts connection attempts.
pub trait Connector: Send {
    type Socket: Socket;

    /// Begin connecting to `url`. Lifecycle events for this attempt are
    /// reported with `id`.
    fn open(&mut self, id: SocketId, url: &str) -> Self::Socket;
}

// ============================================================================
// In-memory connector
// ============================================================================

#[derive(Debug, Default)]
struct MemoryLog {
    opened: Vec<SocketId>,
    closed: Vec<SocketId>,
    sent: Vec<(SocketId, String)>,
    fail_sends: bool,
}

/// Connector that records activity instead of touching the network.
///
/// Clones share the same record, so a test can keep one clone for
/// inspection and hand the other to a connection manager. Socket events are
/// fed back to the manager by the test itself.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every socket opened so far.
    pub fn opened(&self) -> Vec<SocketId> {
        self.log.lock().opened.clone()
    }

    /// Ids of every socket closed by its owner so far.
    pub fn closed(&self) -> Vec<SocketId> {
        self.log.lock().closed.clone()
    }

    /// Frames sent, in order.
    pub fn sent(&self) -> Vec<(SocketId, String)> {
        self.log.lock().sent.clone()
    }

    /// Sockets opened and not yet closed by their owner.
    pub fn live(&self) -> Vec<SocketId> {
        let log = self.log.lock();
        log.opened
            .iter()
            .filter(|id| !log.closed.contains(id))
            .copied()
            .collect()
    }

    /// Most recently opened socket.
    pub fn last_opened(&self) -> Option<SocketId> {
        self.log.lock().opened.last().copied()
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.log.lock().fail_sends = fail;
    }
}

impl Connector for MemoryConnector {
    type Socket = MemorySocket;

    fn open(&mut self, id: SocketId, _url: &str) -> MemorySocket {
        self.log.lock().opened.push(id);
        MemorySocket {
            id,
            log: self.log.clone(),
            closed: false,
        }
    }
}

/// Socket handed out by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemorySocket {
    id: SocketId,
    log: Arc<Mutex<MemoryLog>>,
    closed: bool,
}

impl Socket for MemorySocket {
    fn send(&mut self, frame: String) -> WsResult<()> {
        let mut log = self.log.lock();
        if log.fail_sends || self.closed {
            return Err(crate::error::WsError::SendFailed(format!(
                "socket {} not writable",
                self.id
            )));
        }
        log.sent.push((self.id, frame));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().closed.push(self.id);
        }
    }
}
