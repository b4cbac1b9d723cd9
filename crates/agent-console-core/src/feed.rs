//! Broadcast + history transcript feed.
//!
//! Views that attach after the conversation started receive the transcript
//! so far, then seamlessly switch to live events.

use std::{
    collections::VecDeque,
    sync::RwLock,
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::events::ClientEvent;
use crate::message::TranscriptEntry;

/// History size limit (10 MB of transcript text).
const HISTORY_BYTES: usize = 10_000 * 1024;

struct StoredEntry {
    entry: TranscriptEntry,
    bytes: usize,
}

struct Inner {
    entries: VecDeque<StoredEntry>,
    total_bytes: usize,
}

/// Transcript feed with broadcast and history support.
///
/// Streamed snapshots sharing an id coalesce in history, so a replayed
/// transcript contains each logical message once, at its latest text.
pub struct Transcript {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<ClientEvent>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Publish an event to live listeners, recording entries in history.
    pub fn push(&self, event: ClientEvent) {
        if let ClientEvent::Entry(entry) = &event {
            self.store(entry.clone());
        }
        let _ = self.sender.send(event); // no listeners is fine
    }

    /// Publish a transcript entry.
    pub fn push_entry(&self, entry: TranscriptEntry) {
        self.push(ClientEvent::Entry(entry));
    }

    fn store(&self, entry: TranscriptEntry) {
        let bytes = entry.approx_bytes();
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;

        // A growing stream snapshot replaces its previous snapshot in place.
        if let Some(back) = inner.entries.back_mut() {
            if back.entry.id == entry.id {
                inner.total_bytes = inner
                    .total_bytes
                    .saturating_sub(back.bytes)
                    .saturating_add(bytes);
                *back = StoredEntry { entry, bytes };
                evict_over_cap(inner);
                return;
            }
        }

        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            let Some(front) = inner.entries.pop_front() else {
                break;
            };
            tracing::debug!(evicted_bytes = front.bytes, "transcript over cap, dropping oldest entry");
            inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
        }
        inner.entries.push_back(StoredEntry { entry, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Drop all history. Live subscriptions stay open.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    /// Receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Snapshot of the transcript so far.
    #[must_use]
    pub fn history(&self) -> Vec<TranscriptEntry> {
        self.inner
            .read()
            .unwrap()
            .entries
            .iter()
            .map(|s| s.entry.clone())
            .collect()
    }

    /// Stream that yields history entries first, then live events.
    #[must_use]
    pub fn history_plus_events(&self) -> futures::stream::BoxStream<'static, ClientEvent> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history.into_iter().map(ClientEvent::Entry));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}

fn evict_over_cap(inner: &mut Inner) {
    while inner.total_bytes > HISTORY_BYTES && inner.entries.len() > 1 {
        let Some(front) = inner.entries.pop_front() else {
            break;
        };
        inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
    }
}
