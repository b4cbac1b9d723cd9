//! Wire protocol and transport for the session connection.
//!
//! Provides:
//! - Envelope codec (JSON text frames)
//! - WebSocket transport (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientEnvelope, Envelope, EnvelopeKind, Handshake, ProtocolError};

#[cfg(feature = "websocket")]
pub use websocket::{WsTransport, ws_url};
