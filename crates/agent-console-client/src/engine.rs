//! Session protocol dispatcher.
//!
//! The engine is a single task owning all client state: the selected
//! session, the connection driver, the stream assembler and the turn
//! gate. Every mutation happens on delivery of one discrete event, either
//! a caller command or a link event, so envelope handling is strictly
//! ordered and needs no locking.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use agent_console_core::{
    ClientEvent, ConnectionStatus, Details, EntryId, EntryKind, Session, StreamAssembler,
    Transcript, TranscriptEntry, Transport, TurnState,
};
use agent_console_transport::{ClientEnvelope, Envelope, EnvelopeKind};

use crate::config::ClientConfig;
use crate::link::{LinkEvent, SessionLink};

/// Why a submission was turned away without transmission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No session has been selected yet.
    #[error("No session selected")]
    NoSession,
    /// The connection is not live.
    #[error("Not connected")]
    NotConnected,
    /// The previous request is still being processed.
    #[error("Busy processing the previous request")]
    Busy,
    /// The text was empty after trimming.
    #[error("Nothing to send")]
    EmptyInput,
}

/// Instructions from the facade.
pub(crate) enum Command {
    Select(Session),
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },
    Close,
}

pub(crate) struct Engine {
    transport: Arc<dyn Transport>,
    url: String,
    config: ClientConfig,
    transcript: Arc<Transcript>,
    assembler: StreamAssembler,
    turn: TurnState,
    status: ConnectionStatus,
    session: Option<Session>,
    link: Option<SessionLink>,
    /// Bumped on every selection; events tagged with an older value are
    /// from a superseded connection and must not mutate anything.
    generation: u64,
    welcomed: bool,
    next_entry_id: EntryId,
    input_enabled: bool,
    busy_shown: bool,
    link_events: mpsc::UnboundedSender<(u64, LinkEvent)>,
}

impl Engine {
    pub(crate) fn new(
        url: String,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        transcript: Arc<Transcript>,
    ) -> (Self, mpsc::UnboundedReceiver<(u64, LinkEvent)>) {
        let (link_events_tx, link_events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            transport,
            url,
            config,
            transcript,
            assembler: StreamAssembler::new(),
            turn: TurnState::new(),
            status: ConnectionStatus::Idle,
            session: None,
            link: None,
            generation: 0,
            welcomed: false,
            next_entry_id: 0,
            input_enabled: false,
            busy_shown: false,
            link_events: link_events_tx,
        };
        (engine, link_events_rx)
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut link_events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Select(session)) => self.select(session),
                    Some(Command::Submit { text, reply }) => {
                        let _ = reply.send(self.submit(&text));
                    }
                    Some(Command::Close) | None => break,
                },
                Some((generation, event)) = link_events.recv() => {
                    if generation == self.generation {
                        self.on_link_event(event);
                    } else {
                        tracing::trace!(generation, "Dropping stale link event");
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Activate `session`, tearing down whatever connection exists.
    fn select(&mut self, session: Session) {
        tracing::info!(session_id = %session.id, title = %session.title, "Selecting session");
        self.generation += 1;
        if self.link.take().is_some() {
            self.set_status(ConnectionStatus::Closed);
        }
        self.assembler = StreamAssembler::new();
        self.turn = TurnState::new();
        self.turn.session_selected();
        self.welcomed = false;
        self.transcript.clear();
        let session_id = session.id.clone();
        self.session = Some(session);
        self.set_status(ConnectionStatus::Initializing);
        self.link = Some(SessionLink::activate(
            Arc::clone(&self.transport),
            self.url.clone(),
            session_id,
            self.config.clone(),
            self.generation,
            self.link_events.clone(),
        ));
        self.refresh_signals();
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opening { attempt } => {
                if attempt > 1 {
                    tracing::info!(attempt, "Reconnecting");
                }
                self.set_status(ConnectionStatus::Initializing);
            }
            LinkEvent::Opened => self.set_status(ConnectionStatus::Handshaking),
            LinkEvent::Inbound(envelope) => self.dispatch(envelope),
            LinkEvent::Dropped { was_live } => {
                self.turn.connection_lost();
                if was_live {
                    self.set_status(ConnectionStatus::Closed);
                } else {
                    // An attempt that never went live keeps the neutral
                    // initializing status rather than showing a disconnect.
                    self.set_status(ConnectionStatus::Initializing);
                }
                self.refresh_signals();
            }
            LinkEvent::Exhausted => {
                self.turn.connection_lost();
                self.set_status(ConnectionStatus::Closed);
                self.push_diagnostic("Connection failed. Please try again.");
                self.refresh_signals();
            }
        }
    }

    /// Route one inbound envelope, in arrival order.
    fn dispatch(&mut self, envelope: Envelope) {
        if !matches!(
            envelope.kind,
            EnvelopeKind::User | EnvelopeKind::Pong | EnvelopeKind::Error
        ) {
            // Any substantive response clears the processing indicator.
            self.turn.response_observed();
        }
        match envelope.kind {
            EnvelopeKind::Pong => self.on_pong(),
            EnvelopeKind::Error => self.on_error(envelope),
            // The user's own text was already echoed at submit time.
            EnvelopeKind::User => {}
            EnvelopeKind::Assistant => self.on_assistant(envelope),
            EnvelopeKind::Tool => self.on_tool(envelope),
            EnvelopeKind::Plan => self.on_plan(envelope),
            EnvelopeKind::Finish => self.on_finish(),
            EnvelopeKind::Ping => tracing::debug!("Server ping"),
            EnvelopeKind::Unknown => tracing::debug!("Ignoring unrecognized envelope kind"),
        }
        self.refresh_signals();
    }

    fn on_pong(&mut self) {
        self.set_status(ConnectionStatus::Live);
        if !self.welcomed {
            self.welcomed = true;
            if let Some(session) = &self.session {
                self.transcript.push(ClientEvent::SessionReady(session.clone()));
            }
        }
    }

    fn on_error(&mut self, envelope: Envelope) {
        self.seal_stream();
        let text = envelope
            .content
            .unwrap_or_else(|| "Unknown server error".to_string());
        let id = self.next_id();
        self.transcript.push_entry(TranscriptEntry::sealed(
            id,
            EntryKind::Error,
            text,
            envelope.details,
        ));
        // A server-side error always unblocks input, even mid-stream.
        self.turn.turn_ended();
    }

    fn on_assistant(&mut self, envelope: Envelope) {
        let Some(content) = envelope.content else {
            return;
        };
        if content.is_empty() {
            return;
        }
        if envelope.is_stream {
            let next_entry_id = &mut self.next_entry_id;
            let snapshot = self.assembler.append(&content, envelope.details, || {
                let id = *next_entry_id;
                *next_entry_id += 1;
                id
            });
            self.transcript.push_entry(snapshot);
        } else {
            // Complete assistant output stands alone; an open streamed
            // entry keeps accepting fragments around it.
            let id = self.next_id();
            self.transcript.push_entry(TranscriptEntry::sealed(
                id,
                EntryKind::Assistant,
                content,
                envelope.details,
            ));
        }
    }

    fn on_tool(&mut self, envelope: Envelope) {
        self.seal_stream();
        let tool_name = envelope.details.tool_name.as_deref().unwrap_or("tool");
        let status = envelope.details.status.as_deref().unwrap_or("running");
        let text = format!("{tool_name}: {status}");
        let id = self.next_id();
        self.transcript.push_entry(TranscriptEntry::sealed(
            id,
            EntryKind::Tool,
            text,
            envelope.details,
        ));
    }

    fn on_plan(&mut self, envelope: Envelope) {
        self.seal_stream();
        let Some(content) = envelope.content else {
            return;
        };
        let id = self.next_id();
        self.transcript.push_entry(TranscriptEntry::sealed(
            id,
            EntryKind::Plan,
            content,
            envelope.details,
        ));
    }

    fn on_finish(&mut self) {
        self.seal_stream();
        self.turn.turn_ended();
    }

    /// Gate, echo and transmit one user submission.
    fn submit(&mut self, text: &str) -> Result<(), SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        if self.session.is_none() {
            self.push_diagnostic("No session selected.");
            return Err(SubmitError::NoSession);
        }
        if !self.status.is_live() || self.link.is_none() {
            self.push_diagnostic("Not connected to the server.");
            return Err(SubmitError::NotConnected);
        }
        if !self.turn.can_submit(true) {
            self.push_diagnostic("Still processing the previous request.");
            return Err(SubmitError::Busy);
        }

        // Optimistic echo; the server's own echo is ignored on arrival.
        let id = self.next_id();
        self.transcript.push_entry(TranscriptEntry::sealed(
            id,
            EntryKind::User,
            text,
            Details::default(),
        ));
        self.turn.submission_accepted();

        let sent = match ClientEnvelope::user_message(text).encode() {
            Ok(frame) => self
                .link
                .as_ref()
                .is_some_and(|link| link.send(frame).is_ok()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode user message");
                false
            }
        };
        if sent {
            self.turn.transmitted();
            self.refresh_signals();
            Ok(())
        } else {
            self.turn.transmit_failed();
            self.push_diagnostic("Failed to send message. Please retry.");
            self.refresh_signals();
            Err(SubmitError::NotConnected)
        }
    }

    fn shutdown(&mut self) {
        tracing::debug!("Engine shutting down");
        self.link = None;
        self.turn.connection_lost();
        if self.status != ConnectionStatus::Idle {
            self.set_status(ConnectionStatus::Closing);
            self.set_status(ConnectionStatus::Closed);
        }
        self.refresh_signals();
    }

    /// Seal the open streamed entry, delivering its final snapshot.
    fn seal_stream(&mut self) {
        if let Some(entry) = self.assembler.close() {
            self.transcript.push_entry(entry);
        }
    }

    fn push_diagnostic(&mut self, text: &str) {
        let id = self.next_id();
        self.transcript.push_entry(TranscriptEntry::sealed(
            id,
            EntryKind::Error,
            text,
            Details::default(),
        ));
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            tracing::debug!(?status, "Connection status");
            self.transcript.push(ClientEvent::Status(status));
            if status.is_live() {
                self.turn.connection_live();
            }
            self.refresh_signals();
        }
    }

    /// Re-derive the busy and input-availability signals, emitting only
    /// actual changes.
    fn refresh_signals(&mut self) {
        let busy = self.turn.is_busy();
        if busy != self.busy_shown {
            self.busy_shown = busy;
            self.transcript.push(ClientEvent::Busy(busy));
        }
        let enabled = self.turn.can_submit(self.status.is_live());
        if enabled != self.input_enabled {
            self.input_enabled = enabled;
            self.transcript.push(ClientEvent::InputEnabled(enabled));
        }
    }

    fn next_id(&mut self) -> EntryId {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        id
    }
}
