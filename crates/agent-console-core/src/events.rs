//! Events the engine emits to view-layer consumers.

use serde::{Deserialize, Serialize};

use crate::message::TranscriptEntry;
use crate::session::Session;

/// Lifecycle status of the one connection the engine owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No session selected yet.
    Idle,
    /// Opening the underlying connection.
    Initializing,
    /// Connection open, handshake sent, liveness ack pending.
    Handshaking,
    /// Handshake acknowledged; envelopes flow.
    Live,
    /// Deterministic teardown in progress.
    Closing,
    /// Torn down, either deliberately or by a mid-session drop.
    Closed,
}

impl ConnectionStatus {
    /// True only for the `Live` state.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

/// One-way notification from the engine to the view layer.
///
/// Views consume these over a broadcast channel; they never mutate engine
/// state except through `submit` and `select_session`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A transcript entry was materialized or its open snapshot grew.
    Entry(TranscriptEntry),
    /// The connection status changed.
    Status(ConnectionStatus),
    /// The input affordance flipped.
    InputEnabled(bool),
    /// First liveness ack for the selected session; carries its metadata.
    SessionReady(Session),
    /// The busy indicator flipped.
    Busy(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_live_counts_as_live() {
        assert!(ConnectionStatus::Live.is_live());
        for status in [
            ConnectionStatus::Idle,
            ConnectionStatus::Initializing,
            ConnectionStatus::Handshaking,
            ConnectionStatus::Closing,
            ConnectionStatus::Closed,
        ] {
            assert!(!status.is_live());
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionStatus::Handshaking).unwrap();
        assert_eq!(json, "\"handshaking\"");
    }
}
