//! Live-buffer normalizer: one buffered bridge record in, one canonical
//! message out.
//!
//! The bridge hands over loosely-typed maps; they are decoded into
//! [`LiveRecord`] exactly once at this boundary, so nothing downstream probes
//! raw keys.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use recall_common::{CanonicalMessage, MessageKind, NormalizeError, SourceType};

/// Chat-id suffix convention for group chats.
const GROUP_SUFFIX: &str = "@g.us";

/// One raw buffered message as supplied by the bridge.
///
/// Required fields are `Option` here so their absence surfaces as a counted
/// validation failure instead of a decode error for the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveRecord {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub chat_jid: Option<String>,
    #[serde(default)]
    pub sender_jid: Option<String>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub is_from_me: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
    /// Anything else the bridge sent; kept opaque in the raw payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Explicit mapping from bridge message types to the closed kind set.
/// Unrecognized types fall back to `Other`; a missing type means text.
fn map_kind(message_type: Option<&str>) -> MessageKind {
    match message_type.unwrap_or("text") {
        "text" => MessageKind::Text,
        "image" => MessageKind::Image,
        "video" => MessageKind::Video,
        "audio" => MessageKind::Audio,
        "document" => MessageKind::Document,
        "sticker" => MessageKind::Sticker,
        "reaction" => MessageKind::Reaction,
        _ => MessageKind::Other,
    }
}

/// Normalize one buffered record. Pure except for the timestamp fallback:
/// an unparseable timestamp becomes ingestion-time now(), a documented
/// approximation, not an error.
pub fn normalize_live(record: LiveRecord) -> Result<CanonicalMessage, NormalizeError> {
    let message_id = record
        .message_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NormalizeError::Validation("missing message_id".to_string()))?;
    let chat_id = record
        .chat_jid
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NormalizeError::Validation("missing chat_jid".to_string()))?;
    let sender_id = record
        .sender_jid
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NormalizeError::Validation("missing sender_jid".to_string()))?;

    let timestamp = match record.timestamp.as_deref() {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                debug!(timestamp = raw, "unparseable bridge timestamp, falling back to now");
                Utc::now()
            },
        },
        None => Utc::now(),
    };

    let is_group = chat_id.ends_with(GROUP_SUFFIX);
    let kind = map_kind(record.message_type.as_deref());
    let raw = serde_json::to_value(&record)
        .map_err(|e| NormalizeError::Parse(format!("unserializable record: {e}")))?;

    Ok(CanonicalMessage {
        source: SourceType::Bridge,
        message_id,
        chat_id,
        sender_id,
        sender_name: record.push_name.filter(|n| !n.is_empty()),
        body: record.content.unwrap_or_default(),
        kind,
        is_outbound: record.is_from_me.unwrap_or(false),
        is_group,
        timestamp,
        quoted_id: record.quoted_message_id.filter(|q| !q.is_empty()),
        raw,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn record() -> LiveRecord {
        LiveRecord {
            message_id: Some("ABCDEF".to_string()),
            chat_jid: Some("12345@s.whatsapp.net".to_string()),
            sender_jid: Some("12345@s.whatsapp.net".to_string()),
            push_name: Some("Alice".to_string()),
            content: Some("hello there".to_string()),
            message_type: Some("text".to_string()),
            is_from_me: Some(true),
            timestamp: Some("2024-01-15T10:30:15Z".to_string()),
            quoted_message_id: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn normalizes_a_complete_record() {
        let msg = normalize_live(record()).unwrap();
        assert_eq!(msg.source, SourceType::Bridge);
        assert_eq!(msg.message_id, "ABCDEF");
        assert_eq!(msg.body, "hello there");
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.is_outbound);
        assert!(!msg.is_group);
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-01-15T10:30:15+00:00");
    }

    #[test]
    fn group_chats_detected_by_jid_suffix() {
        let mut r = record();
        r.chat_jid = Some("9876-group@g.us".to_string());
        assert!(normalize_live(r).unwrap().is_group);
    }

    #[test]
    fn unknown_message_type_falls_back_to_other() {
        let mut r = record();
        r.message_type = Some("poll_update".to_string());
        assert_eq!(normalize_live(r).unwrap().kind, MessageKind::Other);
    }

    #[test]
    fn known_kinds_map_through_the_table() {
        for (raw, kind) in [
            ("image", MessageKind::Image),
            ("video", MessageKind::Video),
            ("audio", MessageKind::Audio),
            ("document", MessageKind::Document),
            ("sticker", MessageKind::Sticker),
            ("reaction", MessageKind::Reaction),
        ] {
            let mut r = record();
            r.message_type = Some(raw.to_string());
            assert_eq!(normalize_live(r).unwrap().kind, kind);
        }
    }

    #[test]
    fn bad_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let mut r = record();
        r.timestamp = Some("not a time".to_string());
        let msg = normalize_live(r).unwrap();
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn missing_required_field_is_a_validation_failure() {
        let mut r = record();
        r.message_id = None;
        match normalize_live(r) {
            Err(NormalizeError::Validation(reason)) => {
                assert!(reason.contains("message_id"));
            },
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn extra_fields_survive_in_raw_payload() {
        let value = serde_json::json!({
            "message_id": "X1",
            "chat_jid": "c@s.whatsapp.net",
            "sender_jid": "s@s.whatsapp.net",
            "media_path": "/tmp/img.jpg"
        });
        let record: LiveRecord = serde_json::from_value(value).unwrap();
        let msg = normalize_live(record).unwrap();
        assert_eq!(msg.raw["media_path"], "/tmp/img.jpg");
    }
}
