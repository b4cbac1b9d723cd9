//! Transcript entries: the materialized units handed to the view layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry identifier, unique within one client run.
pub type EntryId = u64;

/// Kind tag for a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Text the user submitted (rendered optimistically).
    User,
    /// Assistant output, streamed or complete.
    Assistant,
    /// A tool invocation summary.
    Tool,
    /// A plan announcement.
    Plan,
    /// A server-sent or locally generated diagnostic.
    Error,
}

/// Provenance of agent output (sub-agent routing data).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_index: Option<u32>,
}

/// Optional detail fields carried by envelopes and entries.
///
/// Every field is optional; senders only populate what applies. Tool
/// envelopes carry `tool_name`/`status`, streamed assistant output may carry
/// agent provenance, and confirmation prompts ride along unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Details {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Value>,
}

impl Details {
    /// True when no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.agent_id.is_none()
            && self.agent_info.is_none()
            && self.tool_name.is_none()
            && self.status.is_none()
            && self.args.is_none()
            && self.confirmation.is_none()
            && self.tool_content.is_none()
            && self.locations.is_none()
    }
}

/// One materialized message in the transcript.
///
/// A streamed assistant entry is delivered as successive snapshots sharing
/// one `id` while `sealed` is false; views replace their rendition by id.
/// All other kinds arrive once, already sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Details::is_empty")]
    pub details: Details,
    pub sealed: bool,
}

impl TranscriptEntry {
    /// Create a sealed entry.
    #[must_use]
    pub fn sealed<S: Into<String>>(id: EntryId, kind: EntryKind, text: S, details: Details) -> Self {
        Self {
            id,
            kind,
            text: text.into(),
            details,
            sealed: true,
        }
    }

    /// Create an open streamed assistant entry.
    #[must_use]
    pub fn open_stream<S: Into<String>>(id: EntryId, text: S, details: Details) -> Self {
        Self {
            id,
            kind: EntryKind::Assistant,
            text: text.into(),
            details,
            sealed: false,
        }
    }

    /// Approximate in-memory size, used for history eviction.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        let detail_bytes = if self.details.is_empty() {
            0
        } else {
            serde_json::to_string(&self.details).map_or(0, |s| s.len())
        };
        std::mem::size_of::<Self>() + self.text.len() + detail_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_details_report_empty() {
        assert!(Details::default().is_empty());

        let details = Details {
            tool_name: Some("read_file".to_string()),
            ..Default::default()
        };
        assert!(!details.is_empty());
    }

    #[test]
    fn entry_kind_uses_snake_case() {
        let json = serde_json::to_string(&EntryKind::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let kind: EntryKind = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(kind, EntryKind::Tool);
    }

    #[test]
    fn sealed_entry_round_trips() {
        let entry = TranscriptEntry::sealed(7, EntryKind::Plan, "Plan created", Details::default());
        let json = serde_json::to_string(&entry).unwrap();
        let back: TranscriptEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert!(!json.contains("details"));
    }

    #[test]
    fn approx_bytes_grows_with_text() {
        let short = TranscriptEntry::sealed(1, EntryKind::Assistant, "hi", Details::default());
        let long = TranscriptEntry::sealed(2, EntryKind::Assistant, "hi".repeat(100), Details::default());
        assert!(long.approx_bytes() > short.approx_bytes());
    }
}
