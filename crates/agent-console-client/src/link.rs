//! Connection lifecycle driver.
//!
//! One driver task per session activation owns the socket. It dials the
//! server, sends the handshake, pumps decoded inbound envelopes to the
//! engine, heartbeats while live, and redials dropped connections on a
//! fixed delay with a bounded attempt budget. Every event it emits is
//! tagged with the activation's generation so the engine can discard
//! stragglers from a superseded connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};

use agent_console_core::{FrameSink, FrameSource, SessionId, Transport};
use agent_console_transport::{ClientEnvelope, Envelope, EnvelopeKind, Handshake};

use crate::config::ClientConfig;

/// What the driver reports to the engine.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// A dial is starting; `attempt` is 1-based within the current budget.
    Opening { attempt: u32 },
    /// The socket is open and the handshake frame has been transmitted.
    Opened,
    /// One decoded inbound envelope.
    Inbound(Envelope),
    /// The connection went away. `was_live` distinguishes a mid-session
    /// drop from a dial that never produced a liveness acknowledgment.
    Dropped { was_live: bool },
    /// The attempt budget is spent; the driver has stopped for good.
    Exhausted,
}

/// Handle to the driver task for one session activation.
///
/// Dropping the handle aborts the driver, which tears down whatever
/// connection it holds.
pub(crate) struct SessionLink {
    outbound: mpsc::UnboundedSender<String>,
    driver: JoinHandle<()>,
}

impl SessionLink {
    /// Spawn a driver for `session_id` against `url`.
    pub(crate) fn activate(
        transport: Arc<dyn Transport>,
        url: String,
        session_id: SessionId,
        config: ClientConfig,
        generation: u64,
        events: mpsc::UnboundedSender<(u64, LinkEvent)>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            transport,
            url,
            session_id,
            config,
            generation,
            events,
            outbound: outbound_rx,
        };
        Self {
            outbound: outbound_tx,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Queue one frame for transmission on the current connection.
    ///
    /// # Errors
    /// Returns [`SendError::NotConnected`] when the driver has stopped.
    pub(crate) fn send(&self, frame: String) -> Result<(), SendError> {
        self.outbound.send(frame).map_err(|_| SendError::NotConnected)
    }
}

impl Drop for SessionLink {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Transmission failure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SendError {
    #[error("Not connected")]
    NotConnected,
}

/// How one connection ended, from the driver's point of view.
enum ConnectionEnd {
    /// The connection dropped; redialing may be warranted.
    Dropped { was_live: bool },
    /// The engine went away; stop driving entirely.
    Detached,
}

struct Driver {
    transport: Arc<dyn Transport>,
    url: String,
    session_id: SessionId,
    config: ClientConfig,
    generation: u64,
    events: mpsc::UnboundedSender<(u64, LinkEvent)>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if !self.emit(LinkEvent::Opening { attempt: attempts }) {
                return;
            }
            let end = match self.transport.connect(&self.url).await {
                Ok((sink, source)) => self.run_connection(sink, source).await,
                Err(e) => {
                    tracing::debug!(error = %e, attempt = attempts, "Dial failed");
                    ConnectionEnd::Dropped { was_live: false }
                }
            };
            match end {
                ConnectionEnd::Detached => return,
                ConnectionEnd::Dropped { was_live } => {
                    if was_live {
                        // A liveness acknowledgment restores the full budget.
                        attempts = 0;
                    }
                    if !self.emit(LinkEvent::Dropped { was_live }) {
                        return;
                    }
                    if attempts >= self.config.max_reconnect_attempts {
                        tracing::warn!(attempts, "Reconnect budget spent, giving up");
                        self.emit(LinkEvent::Exhausted);
                        return;
                    }
                    sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    /// Pump one open connection until it drops or the engine detaches.
    async fn run_connection(
        &mut self,
        mut sink: Box<dyn FrameSink>,
        mut source: Box<dyn FrameSource>,
    ) -> ConnectionEnd {
        // Frames queued against a previous connection die with it.
        while self.outbound.try_recv().is_ok() {}

        let hello = match Handshake::new(self.session_id.clone()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Handshake encode failed");
                return ConnectionEnd::Dropped { was_live: false };
            }
        };
        if sink.send(hello).await.is_err() {
            return ConnectionEnd::Dropped { was_live: false };
        }
        if !self.emit(LinkEvent::Opened) {
            return ConnectionEnd::Detached;
        }

        let mut live = false;
        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        let handshake_deadline = sleep(self.config.handshake_timeout);
        tokio::pin!(handshake_deadline);

        let end = loop {
            tokio::select! {
                frame = source.next_frame() => match frame {
                    Some(Ok(text)) => match Envelope::decode(&text) {
                        Ok(envelope) => {
                            if envelope.kind == EnvelopeKind::Pong {
                                live = true;
                            }
                            if !self.emit(LinkEvent::Inbound(envelope)) {
                                break ConnectionEnd::Detached;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Discarding undecodable frame"),
                    },
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Connection errored");
                        break ConnectionEnd::Dropped { was_live: live };
                    }
                    None => break ConnectionEnd::Dropped { was_live: live },
                },
                () = &mut handshake_deadline, if !live => {
                    tracing::warn!("No liveness acknowledgment, dropping connection");
                    break ConnectionEnd::Dropped { was_live: false };
                }
                _ = heartbeat.tick(), if live => {
                    match ClientEnvelope::Ping.encode() {
                        Ok(frame) => {
                            if sink.send(frame).await.is_err() {
                                break ConnectionEnd::Dropped { was_live: live };
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "Heartbeat encode failed"),
                    }
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if sink.send(frame).await.is_err() {
                            break ConnectionEnd::Dropped { was_live: live };
                        }
                    }
                    None => break ConnectionEnd::Detached,
                },
            }
        };
        sink.close().await;
        end
    }

    fn emit(&self, event: LinkEvent) -> bool {
        self.events.send((self.generation, event)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::testing::{FakeConn, FakeTransport};

    fn test_config() -> ClientConfig {
        ClientConfig::default()
    }

    fn spawn_link(
        transport: Arc<FakeTransport>,
        config: ClientConfig,
    ) -> (SessionLink, mpsc::UnboundedReceiver<(u64, LinkEvent)>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = SessionLink::activate(
            transport,
            "fake://server".to_string(),
            "session-1".to_string(),
            config,
            7,
            events_tx,
        );
        (link, events_rx)
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<(u64, LinkEvent)>) -> LinkEvent {
        let (generation, event) = timeout(Duration::from_secs(600), events.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("link event channel closed");
        assert_eq!(generation, 7);
        event
    }

    async fn accept(conns: &mut mpsc::UnboundedReceiver<FakeConn>) -> FakeConn {
        timeout(Duration::from_secs(600), conns.recv())
            .await
            .expect("timed out waiting for dial")
            .expect("transport gone")
    }

    async fn sent_frame(conn: &mut FakeConn) -> String {
        timeout(Duration::from_secs(600), conn.sent.recv())
            .await
            .expect("timed out waiting for outbound frame")
            .expect("client side closed")
    }

    #[tokio::test]
    async fn handshake_frame_carries_session_id() {
        let (transport, mut conns) = FakeTransport::new();
        let (_link, mut events) = spawn_link(transport, test_config());

        let mut conn = accept(&mut conns).await;
        assert_eq!(sent_frame(&mut conn).await, r#"{"session_id":"session-1"}"#);

        assert!(matches!(next_event(&mut events).await, LinkEvent::Opening { attempt: 1 }));
        assert!(matches!(next_event(&mut events).await, LinkEvent::Opened));
    }

    #[tokio::test]
    async fn inbound_frames_are_decoded_and_forwarded() {
        let (transport, mut conns) = FakeTransport::new();
        let (_link, mut events) = spawn_link(transport, test_config());

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;
        conn.push_frame(r#"{"type":"pong"}"#);

        loop {
            if let LinkEvent::Inbound(envelope) = next_event(&mut events).await {
                assert_eq!(envelope.kind, EnvelopeKind::Pong);
                break;
            }
        }
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped_without_dropping() {
        let (transport, mut conns) = FakeTransport::new();
        let (_link, mut events) = spawn_link(transport, test_config());

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;
        conn.push_frame("not json");
        conn.push_frame(r#"{"type":"pong"}"#);

        loop {
            match next_event(&mut events).await {
                LinkEvent::Inbound(envelope) => {
                    assert_eq!(envelope.kind, EnvelopeKind::Pong);
                    break;
                }
                LinkEvent::Dropped { .. } | LinkEvent::Exhausted => {
                    panic!("bad frame must not drop the connection")
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn outbound_frames_reach_the_socket() {
        let (transport, mut conns) = FakeTransport::new();
        let (link, _events) = spawn_link(transport, test_config());

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;

        link.send(r#"{"type":"user_message","content":"hi"}"#.to_string()).unwrap();
        assert_eq!(
            sent_frame(&mut conn).await,
            r#"{"type":"user_message","content":"hi"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_every_interval_while_live() {
        let (transport, mut conns) = FakeTransport::new();
        let (_link, _events) = spawn_link(transport, test_config());

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;
        conn.push_frame(r#"{"type":"pong"}"#);

        // Two consecutive interval expirations, no other traffic.
        assert_eq!(sent_frame(&mut conn).await, r#"{"type":"ping"}"#);
        assert_eq!(sent_frame(&mut conn).await, r#"{"type":"ping"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_handshake_is_dropped_and_redialed() {
        let (transport, mut conns) = FakeTransport::new();
        let (_link, mut events) = spawn_link(Arc::clone(&transport), test_config());

        let mut first = accept(&mut conns).await;
        sent_frame(&mut first).await;
        // No pong: the handshake deadline fires, then the retry delay.
        loop {
            if let LinkEvent::Dropped { was_live } = next_event(&mut events).await {
                assert!(!was_live);
                break;
            }
        }

        let mut second = accept(&mut conns).await;
        sent_frame(&mut second).await;
        assert_eq!(transport.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_spent_emits_exhausted_once() {
        let (transport, mut conns) = FakeTransport::new();
        transport.set_refuse(true);
        let (_link, mut events) = spawn_link(Arc::clone(&transport), test_config());

        let mut exhausted = 0;
        let mut drops = 0;
        loop {
            match next_event(&mut events).await {
                LinkEvent::Exhausted => {
                    exhausted += 1;
                    break;
                }
                LinkEvent::Dropped { .. } => drops += 1,
                _ => {}
            }
        }
        assert_eq!(exhausted, 1);
        assert_eq!(drops, 10);
        assert_eq!(transport.dials(), 10);

        // The driver has returned; no further dial can happen.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(conns.try_recv().is_err());
        assert_eq!(transport.dials(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_restores_the_attempt_budget() {
        let (transport, mut conns) = FakeTransport::new();
        let config = test_config();
        let (_link, mut events) = spawn_link(Arc::clone(&transport), config);

        // Nine failed dials, then one that goes live.
        transport.set_refuse(true);
        let mut drops = 0;
        while drops < 9 {
            if let LinkEvent::Dropped { .. } = next_event(&mut events).await {
                drops += 1;
            }
        }
        transport.set_refuse(false);

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;
        conn.push_frame(r#"{"type":"pong"}"#);
        loop {
            if let LinkEvent::Inbound(envelope) = next_event(&mut events).await {
                assert_eq!(envelope.kind, EnvelopeKind::Pong);
                break;
            }
        }

        // Drop the live connection: the budget starts over rather than
        // terminating on the next failure.
        drop(conn);
        loop {
            if let LinkEvent::Dropped { was_live } = next_event(&mut events).await {
                assert!(was_live);
                break;
            }
        }
        accept(&mut conns).await;
        assert_eq!(transport.dials(), 11);
    }

    #[tokio::test]
    async fn dropping_the_link_stops_the_driver() {
        let (transport, mut conns) = FakeTransport::new();
        let (link, _events) = spawn_link(Arc::clone(&transport), test_config());

        let mut conn = accept(&mut conns).await;
        sent_frame(&mut conn).await;

        drop(link);
        // The aborted driver never dials again.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conns.try_recv().is_err());
        assert_eq!(transport.dials(), 1);
    }
}
