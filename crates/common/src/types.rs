//! Canonical message and knowledge-record types.
//!
//! Every source pipeline (live bridge buffer, export transcripts, session
//! logs) decodes its raw records exactly once at the boundary and produces a
//! [`CanonicalMessage`]. Downstream code never probes source-specific shapes.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Which pipeline a message or knowledge record came from. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Buffered messages from the live chat bridge.
    Bridge,
    /// Plain-text chat export transcripts.
    Export,
    /// Per-session JSONL conversation logs.
    Session,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Export => "export",
            Self::Session => "session",
        }
    }

    /// Parse a stored discriminant. Unknown values are rejected at the
    /// boundary rather than passed through.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bridge" => Some(Self::Bridge),
            "export" => Some(Self::Export),
            "session" => Some(Self::Session),
            _ => None,
        }
    }
}

/// Media kind of a source-native message. Closed set; unrecognized source
/// values map to `Other` at normalization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Reaction,
    Other,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Reaction => "reaction",
            Self::Other => "other",
        }
    }
}

/// Conversation role in a session log. Only these two are retained; system
/// and tool-only lines are filtered out during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One source-native message in canonical shape.
///
/// Created once at ingestion. The sender display name may be backfilled
/// later; everything else is immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub source: SourceType,
    /// Unique per source.
    pub message_id: String,
    /// Chat or session identifier.
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub body: String,
    pub kind: MessageKind,
    pub is_outbound: bool,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    /// Reference to a quoted message, if the source carried one.
    pub quoted_id: Option<String>,
    /// Opaque raw payload as received from the source.
    pub raw: serde_json::Value,
}

/// A unified knowledge record about to be inserted.
///
/// The store enforces uniqueness on `(source_type, source_id)` and,
/// independently, on `content_hash`: two logically identical messages from
/// different pipelines collapse to one record.
#[derive(Debug, Clone)]
pub struct NewKnowledgeRecord {
    pub source_type: SourceType,
    /// Original id within the source; composite with `source_type`.
    pub source_id: String,
    /// SHA-256 hex of `raw_content`, computed at write time.
    pub content_hash: String,
    pub raw_content: String,
    pub processed_content: String,
    pub metadata: serde_json::Value,
    pub source_timestamp: DateTime<Utc>,
}
