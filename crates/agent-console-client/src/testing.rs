//! In-process transport fake for driving the client without sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use agent_console_core::{FrameSink, FrameSource, Transport, TransportError};

/// Transport whose connections are handed to the test as [`FakeConn`]s.
///
/// Each dial produces a connection pair; the test side reads what the
/// client transmitted from `sent` and injects server frames with
/// [`FakeConn::push_frame`]. Dropping the `FakeConn` severs the
/// connection, as a closing peer would.
pub(crate) struct FakeTransport {
    conns: mpsc::UnboundedSender<FakeConn>,
    dials: AtomicU32,
    refuse: AtomicBool,
}

impl FakeTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeConn>) {
        let (conns_tx, conns_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            conns: conns_tx,
            dials: AtomicU32::new(0),
            refuse: AtomicBool::new(false),
        });
        (transport, conns_rx)
    }

    /// How many dials have been attempted, refused ones included.
    pub(crate) fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    /// Make subsequent dials fail as if the server were unreachable.
    pub(crate) fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.conns
            .send(FakeConn {
                sent: sent_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| TransportError::Connect("no acceptor".to_string()))?;
        Ok((
            Box::new(FakeSink { sent: sent_tx }),
            Box::new(FakeSource { inbound: inbound_rx }),
        ))
    }
}

/// Server side of one fake connection.
pub(crate) struct FakeConn {
    /// Frames the client transmitted, in order.
    pub(crate) sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl FakeConn {
    /// Deliver one server frame to the client.
    ///
    /// Silently discarded when the client has already torn the
    /// connection down, matching frames in flight on a real socket.
    pub(crate) fn push_frame(&self, frame: &str) {
        let _ = self.inbound.send(Ok(frame.to_string()));
    }
}

struct FakeSink {
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.sent.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {}
}

struct FakeSource {
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await
    }
}
