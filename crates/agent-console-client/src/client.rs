//! Public handle to a running client engine.

use std::sync::Arc;

use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use agent_console_core::{
    ClientEvent, DirectoryError, Session, SessionDirectory, Transcript, TranscriptEntry, Transport,
};

use crate::config::ClientConfig;
use crate::engine::{Command, Engine, SubmitError};

/// Console client: session selection, message submission and the
/// transcript feed, backed by one engine task.
///
/// The handle is cheap to share behind an `Arc`. Dropping every handle
/// shuts the engine down; [`SessionClient::close`] does so deterministically.
pub struct SessionClient {
    commands: mpsc::UnboundedSender<Command>,
    transcript: Arc<Transcript>,
    directory: Arc<dyn SessionDirectory>,
    driver: JoinHandle<()>,
}

impl SessionClient {
    /// Spawn an engine talking to `server_url` over `transport`.
    #[must_use]
    pub fn new(
        server_url: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn SessionDirectory>,
    ) -> Self {
        let transcript = Arc::new(Transcript::new());
        let (engine, link_events) = Engine::new(
            server_url.into(),
            config,
            transport,
            Arc::clone(&transcript),
        );
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(engine.run(commands_rx, link_events));
        Self {
            commands: commands_tx,
            transcript,
            directory,
            driver,
        }
    }

    /// Resolve `id` in the directory and make it the active session.
    ///
    /// The previous connection, if any, is torn down; the transcript is
    /// cleared and a fresh connection is dialed in the background.
    ///
    /// # Errors
    /// [`ClientError::UnknownSession`] when the directory has no such id,
    /// [`ClientError::Directory`] when the lookup itself fails.
    pub async fn select_session(&self, id: &str) -> Result<Session, ClientError> {
        let session = self
            .directory
            .get_session(id)
            .await?
            .ok_or_else(|| ClientError::UnknownSession(id.to_string()))?;
        self.commands
            .send(Command::Select(session.clone()))
            .map_err(|_| ClientError::Stopped)?;
        Ok(session)
    }

    /// Submit one user message on the active session.
    ///
    /// On acceptance the text is echoed into the transcript immediately
    /// and transmitted. Rejections other than empty input render a
    /// diagnostic entry in the transcript as well.
    ///
    /// # Errors
    /// See [`SubmitError`] for the rejection reasons.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply: reply_tx,
            })
            .map_err(|_| SubmitError::NotConnected)?;
        reply_rx.await.map_err(|_| SubmitError::NotConnected)?
    }

    /// Receiver for live client events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.transcript.subscribe()
    }

    /// Snapshot of the transcript so far.
    #[must_use]
    pub fn history(&self) -> Vec<TranscriptEntry> {
        self.transcript.history()
    }

    /// Stream that replays the transcript, then follows live events.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, ClientEvent> {
        self.transcript.history_plus_events()
    }

    /// The session directory this client resolves sessions against.
    #[must_use]
    pub fn directory(&self) -> Arc<dyn SessionDirectory> {
        Arc::clone(&self.directory)
    }

    /// Shut the engine down and wait for it to finish.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        let _ = self.driver.await;
    }
}

/// Facade-level failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The directory has no session with the requested id.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    /// The directory lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// The engine task is gone.
    #[error("Client stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use agent_console_session::MemoryDirectory;

    fn fresh_client() -> SessionClient {
        let (transport, _conns) = FakeTransport::new();
        let directory: Arc<dyn SessionDirectory> = Arc::new(MemoryDirectory::new());
        SessionClient::new(
            "fake://server",
            ClientConfig::default(),
            transport,
            directory,
        )
    }

    #[tokio::test]
    async fn selecting_unknown_session_is_rejected() {
        let client = fresh_client();
        let err = client.select_session("no-such-id").await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownSession(id) if id == "no-such-id"));
    }

    #[tokio::test]
    async fn close_ends_the_event_feed() {
        let client = fresh_client();
        let mut events = client.subscribe();
        client.close().await;
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn submit_after_close_reports_not_connected() {
        let client = fresh_client();
        let commands = client.commands.clone();
        client.close().await;

        let (reply_tx, _reply_rx) = oneshot::channel();
        let sent = commands.send(Command::Submit {
            text: "hi".to_string(),
            reply: reply_tx,
        });
        assert!(sent.is_err(), "the command channel must be closed");
    }
}
