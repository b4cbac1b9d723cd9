//! Folds streamed assistant fragments into one open transcript entry.

use crate::message::{Details, EntryId, TranscriptEntry};

/// Accumulates streamed assistant content.
///
/// At most one entry is open at a time. The first fragment fixes the
/// entry's detail bundle; later fragments only extend its text. Sealing is
/// idempotent, and an append after sealing starts a fresh entry.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    open: Option<TranscriptEntry>,
}

impl StreamAssembler {
    /// Create an assembler with no open entry.
    #[must_use]
    pub const fn new() -> Self {
        Self { open: None }
    }

    /// Whether an entry is currently accepting fragments.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Id of the open entry, if any.
    #[must_use]
    pub fn open_id(&self) -> Option<EntryId> {
        self.open.as_ref().map(|e| e.id)
    }

    /// Fold a fragment into the open entry, creating one if needed.
    ///
    /// `next_id` is consulted only when a new entry is opened. Returns a
    /// snapshot of the open entry for delivery to the view layer.
    pub fn append<F>(&mut self, content: &str, details: Details, next_id: F) -> TranscriptEntry
    where
        F: FnOnce() -> EntryId,
    {
        let entry = match self.open.as_mut() {
            Some(entry) => {
                entry.text.push_str(content);
                entry
            }
            None => self
                .open
                .insert(TranscriptEntry::open_stream(next_id(), content, details)),
        };
        entry.clone()
    }

    /// Seal the open entry, if any. Idempotent.
    ///
    /// Returns the sealed entry so the caller can deliver a final snapshot.
    pub fn close(&mut self) -> Option<TranscriptEntry> {
        self.open.take().map(|mut entry| {
            entry.sealed = true;
            entry
        })
    }
}
