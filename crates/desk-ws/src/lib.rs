//! Engine event stream link for the operator console.
//!
//! Provides:
//! - A sans-IO connection manager (idempotent connect, explicit teardown,
//!   heartbeat pings, liveness deadline, fixed-delay reconnect)
//! - A tagged frame decoder and event router
//! - A named registry that owns connection managers across reloads
//! - A tokio-tungstenite transport and an in-memory one for tests

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod registry;
pub mod router;
pub mod socket;
pub mod transport;

pub use connection::{CloseReason, ConnectionConfig, ConnectionManager, LinkEvent};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;
pub use message::{InboundEvent, OutboundFrame, PositionClosed, RawFrame, StatusPush};
pub use registry::{LinkRegistry, ENGINE_LINK};
pub use router::{EventRouter, FrameSink, RouteOutcome};
pub use socket::{Connector, MemoryConnector, MemorySocket, Socket, SocketEvent, SocketId};
pub use transport::{TaggedSocketEvent, WsConnector, WsSocket};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
