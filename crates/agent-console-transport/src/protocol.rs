//! Wire protocol for the session connection.
//!
//! All frames are JSON text. Inbound envelopes share one flat shape with a
//! `type` tag; outbound frames are the handshake plus a small tagged set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agent_console_core::message::Details;

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kind tag of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Echo of the user's own submission.
    User,
    /// Assistant output, streamed or complete.
    Assistant,
    /// Tool invocation notification.
    Tool,
    /// Plan announcement.
    Plan,
    /// End of the current turn.
    Finish,
    /// Server-side diagnostic.
    Error,
    /// Server keepalive probe.
    Ping,
    /// Liveness acknowledgment.
    Pong,
    /// Forward-compatibility catch-all for kinds this client predates.
    #[serde(other)]
    Unknown,
}

/// One inbound protocol message (server to client).
///
/// Unknown extra fields are ignored so the server may grow the protocol
/// without breaking older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Only meaningful for `assistant` envelopes.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_stream: bool,
    #[serde(flatten)]
    pub details: Details,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// Decode one frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a valid envelope.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Encode to a frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    fn bare(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            content: None,
            is_stream: false,
            details: Details::default(),
        }
    }

    /// Liveness acknowledgment.
    #[must_use]
    pub fn pong() -> Self {
        Self::bare(EnvelopeKind::Pong)
    }

    /// End-of-turn marker.
    #[must_use]
    pub fn finish() -> Self {
        Self::bare(EnvelopeKind::Finish)
    }

    /// Server diagnostic.
    #[must_use]
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            content: Some(message.into()),
            ..Self::bare(EnvelopeKind::Error)
        }
    }

    /// Echo of a user submission.
    #[must_use]
    pub fn user_echo<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(EnvelopeKind::User)
        }
    }

    /// One streamed assistant fragment.
    #[must_use]
    pub fn stream_chunk<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            is_stream: true,
            ..Self::bare(EnvelopeKind::Assistant)
        }
    }

    /// A complete, self-contained assistant message.
    #[must_use]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(EnvelopeKind::Assistant)
        }
    }

    /// Tool invocation notification.
    #[must_use]
    pub fn tool<S: Into<String>>(tool_name: S, status: S) -> Self {
        Self {
            details: Details {
                tool_name: Some(tool_name.into()),
                status: Some(status.into()),
                ..Default::default()
            },
            ..Self::bare(EnvelopeKind::Tool)
        }
    }

    /// Plan announcement.
    #[must_use]
    pub fn plan<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::bare(EnvelopeKind::Plan)
        }
    }

    /// Attach a detail bundle.
    #[must_use]
    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }
}

/// The first frame on every connection: binds it to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub session_id: String,
}

impl Handshake {
    /// Handshake for `session_id`.
    #[must_use]
    pub fn new<S: Into<String>>(session_id: S) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    /// Encode to a frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outbound protocol messages after the handshake (client to server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    /// User-submitted text.
    UserMessage { content: String },
    /// Heartbeat probe.
    Ping,
}

impl ClientEnvelope {
    /// User submission carrying `content`.
    #[must_use]
    pub fn user_message<S: Into<String>>(content: S) -> Self {
        Self::UserMessage {
            content: content.into(),
        }
    }

    /// Encode to a frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_console_core::message::AgentInfo;

    #[test]
    fn decodes_streamed_assistant_chunk() {
        let frame = r#"{
            "type": "assistant",
            "content": "Hel",
            "is_stream": true,
            "agent_id": "agent-1",
            "agent_info": {"agent_id": "agent-1", "task_id": "t-9", "agent_index": 0}
        }"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Assistant);
        assert_eq!(env.content.as_deref(), Some("Hel"));
        assert!(env.is_stream);
        assert_eq!(env.details.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(
            env.details.agent_info,
            Some(AgentInfo {
                agent_id: Some("agent-1".to_string()),
                task_id: Some("t-9".to_string()),
                agent_index: Some(0),
            })
        );
    }

    #[test]
    fn decodes_tool_with_details() {
        let frame = r#"{
            "type": "tool",
            "tool_name": "read_file",
            "status": "running",
            "args": {"path": "src/main.rs"},
            "confirmation": "allow once?"
        }"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Tool);
        assert!(!env.is_stream);
        assert_eq!(env.details.tool_name.as_deref(), Some("read_file"));
        assert_eq!(env.details.status.as_deref(), Some("running"));
        assert_eq!(env.details.confirmation.as_deref(), Some("allow once?"));
    }

    #[test]
    fn decodes_bare_pong() {
        let env = Envelope::decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Pong);
        assert!(env.content.is_none());
        assert!(env.details.is_empty());
    }

    #[test]
    fn ignores_unknown_fields() {
        let frame = r#"{"type":"finish","reason":"completed","stop_reason":"end_turn"}"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Finish);
    }

    #[test]
    fn unknown_kind_survives_decoding() {
        let env = Envelope::decode(r#"{"type":"usage_report","tokens":99}"#).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Unknown);
    }

    #[test]
    fn rejects_non_envelope_frame() {
        assert!(Envelope::decode("not json").is_err());
        assert!(Envelope::decode(r#"{"content":"no tag"}"#).is_err());
    }

    #[test]
    fn stream_flag_omitted_when_false() {
        let json = Envelope::assistant("done").encode().unwrap();
        assert!(!json.contains("is_stream"));

        let json = Envelope::stream_chunk("part").encode().unwrap();
        assert!(json.contains(r#""is_stream":true"#));
    }

    #[test]
    fn user_message_frame_shape() {
        let json = ClientEnvelope::user_message("hi there").encode().unwrap();
        assert_eq!(json, r#"{"type":"user_message","content":"hi there"}"#);
    }

    #[test]
    fn ping_frame_shape() {
        let json = ClientEnvelope::Ping.encode().unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn handshake_frame_shape() {
        let json = Handshake::new("abc123").encode().unwrap();
        assert_eq!(json, r#"{"session_id":"abc123"}"#);
    }

    #[test]
    fn tool_envelope_round_trips() {
        let env = Envelope::tool("search", "completed");
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }
}
