//! Traits the engine needs from its collaborators.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ModelCatalog, Session, SessionId};

/// Directory error.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session rejected: {0}")]
    Rejected(String),
    #[error("Directory error: {0}")]
    Internal(String),
}

/// Request body for creating a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    /// Human-readable title.
    pub title: String,
    /// Directory the remote command session should execute in.
    pub working_dir: PathBuf,
    /// Requested model; the directory substitutes its default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// CRUD surface of the session directory.
///
/// The engine consumes this only to resolve the selected session's metadata
/// for the welcome signal; it never manages session records itself.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// List all sessions.
    async fn list_sessions(&self) -> Result<Vec<Session>, DirectoryError>;

    /// Fetch one session by id.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, DirectoryError>;

    /// Create a session from the title/working-dir/model triple.
    async fn create_session(&self, req: NewSession) -> Result<Session, DirectoryError>;

    /// Delete a session by id.
    async fn delete_session(&self, id: &str) -> Result<(), DirectoryError>;

    /// Model catalog the directory offers.
    async fn models(&self) -> Result<ModelCatalog, DirectoryError>;
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Connection closed")]
    Closed,
}

/// Outbound half of a framed full-duplex connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Transmit one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection; best effort.
    async fn close(&mut self);
}

/// Inbound half of a framed full-duplex connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` once the peer has closed.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;
}

/// Factory for framed connections.
///
/// The engine depends on this seam so its protocol handling can be driven
/// without real sockets; the production implementation dials a WebSocket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`, returning its two halves.
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError>;
}
