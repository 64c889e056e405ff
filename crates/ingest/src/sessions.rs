//! Session-log parser: newline-delimited JSON, one event per line, streamed
//! without loading the whole file.
//!
//! Only `"user"` and `"assistant"` events are retained; system and tool-only
//! lines are filtered out without erroring, and a line that fails to decode
//! is skipped and counted. The zero-based *physical* line offset is the
//! per-session message index: it counts every line, retained or not, so it
//! stays a stable ordering and uniqueness key.

use std::io::BufRead;

use {
    chrono::{DateTime, Utc},
    serde::Deserialize,
    tracing::debug,
};

use recall_common::{CanonicalMessage, MessageKind, Role, SourceType};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SessionLine {
    User {
        #[serde(default)]
        message: Option<SessionMessage>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Assistant {
        #[serde(default)]
        message: Option<SessionMessage>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Summary, tool-result, progress and any future event types: filtered
    /// out, not an error.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct SessionMessage {
    #[serde(default)]
    content: Option<SessionContent>,
}

/// Message content is either a plain string or a list of typed blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Body and structured tool metadata extracted from one content value.
fn extract_content(content: &SessionContent) -> (String, Vec<serde_json::Value>) {
    match content {
        SessionContent::Text(text) => (text.clone(), Vec::new()),
        SessionContent::Blocks(blocks) => {
            let mut texts = Vec::new();
            let mut tools = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text.as_str()),
                    ContentBlock::ToolUse { name, input } => {
                        // Tool invocations become structured metadata, never
                        // part of the body text.
                        tools.push(serde_json::json!({
                            "kind": "tool_use",
                            "name": name,
                            "input": input,
                        }));
                    },
                    ContentBlock::ToolResult { tool_use_id } => {
                        tools.push(serde_json::json!({
                            "kind": "tool_result",
                            "tool_use_id": tool_use_id,
                        }));
                    },
                    ContentBlock::Other => {},
                }
            }
            (texts.join("\n\n"), tools)
        },
    }
}

#[derive(Debug, Default)]
pub struct SessionParse {
    pub messages: Vec<CanonicalMessage>,
    /// Lines filtered out by event type (not errors).
    pub skipped: usize,
    /// Lines that failed to decode.
    pub errors: usize,
}

/// Parse one session log. Line-level failures are counted, never fatal; an
/// I/O error reading the stream is fatal to the file.
pub fn parse_session<R: BufRead>(session_id: &str, reader: R) -> std::io::Result<SessionParse> {
    let mut parse = SessionParse::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                debug!(session = session_id, index, error = %err, "skipping malformed session line");
                parse.errors += 1;
                continue;
            },
        };
        let event: SessionLine = match serde_json::from_value(value.clone()) {
            Ok(event) => event,
            Err(err) => {
                debug!(session = session_id, index, error = %err, "skipping undecodable session event");
                parse.errors += 1;
                continue;
            },
        };

        let (role, message, timestamp) = match event {
            SessionLine::User { message, timestamp } => (Role::User, message, timestamp),
            SessionLine::Assistant { message, timestamp } => {
                (Role::Assistant, message, timestamp)
            },
            SessionLine::Other => {
                parse.skipped += 1;
                continue;
            },
        };

        let (body, tools) = message
            .as_ref()
            .and_then(|m| m.content.as_ref())
            .map(extract_content)
            .unwrap_or_default();

        let timestamp = timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut raw = value;
        if !tools.is_empty()
            && let Some(map) = raw.as_object_mut()
        {
            map.insert("tool_blocks".to_string(), serde_json::Value::Array(tools));
        }

        parse.messages.push(CanonicalMessage {
            source: SourceType::Session,
            // The physical line offset keys the message within its session.
            message_id: format!("{session_id}:{index}"),
            chat_id: session_id.to_string(),
            sender_id: role.as_str().to_string(),
            sender_name: None,
            body,
            kind: MessageKind::Text,
            is_outbound: role == Role::User,
            is_group: false,
            timestamp,
            quoted_id: None,
            raw,
        });
    }

    Ok(parse)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Cursor;

    use super::*;

    fn parse(lines: &[&str]) -> SessionParse {
        parse_session("sess-1", Cursor::new(lines.join("\n"))).unwrap()
    }

    #[test]
    fn physical_line_offset_is_the_message_index() {
        let parse = parse(&[
            r#"{"type":"summary","summary":"irrelevant"}"#,
            r#"not json at all"#,
            r#"{"type":"progress"}"#,
            r#"{"type":"system","content":"boot"}"#,
            r#"{"type":"user","message":{"content":"hi"},"timestamp":"2024-01-01T00:00:00Z"}"#,
        ]);
        assert_eq!(parse.messages.len(), 1);
        let msg = &parse.messages[0];
        // Line index 4, counting every physical line including skipped ones.
        assert_eq!(msg.message_id, "sess-1:4");
        assert_eq!(msg.sender_id, "user");
        assert_eq!(msg.body, "hi");
        assert_eq!(parse.errors, 1);
        assert_eq!(parse.skipped, 3);
    }

    #[test]
    fn only_user_and_assistant_are_retained() {
        let parse = parse(&[
            r#"{"type":"user","message":{"content":"question"}}"#,
            r#"{"type":"assistant","message":{"content":"answer"}}"#,
            r#"{"type":"tool","message":{"content":"output"}}"#,
        ]);
        assert_eq!(parse.messages.len(), 2);
        assert_eq!(parse.skipped, 1);
        assert!(parse.messages[0].is_outbound);
        assert!(!parse.messages[1].is_outbound);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let parse = parse(&[
            r#"{{{"#,
            r#"{"type":"user","message":{"content":"still here"}}"#,
        ]);
        assert_eq!(parse.errors, 1);
        assert_eq!(parse.messages.len(), 1);
        assert_eq!(parse.messages[0].message_id, "sess-1:1");
    }

    #[test]
    fn text_blocks_are_concatenated_blank_line_separated() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"},{"type":"tool_use","name":"search","input":{"q":"x"}},{"type":"text","text":"second"}]}}"#;
        let parse = parse(&[line]);
        assert_eq!(parse.messages.len(), 1);
        let msg = &parse.messages[0];
        assert_eq!(msg.body, "first\n\nsecond");
        // Tool invocation went to structured metadata, not the body.
        let tools = msg.raw["tool_blocks"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "search");
        assert!(!msg.body.contains("search"));
    }

    #[test]
    fn unknown_block_types_are_ignored() {
        let line = r#"{"type":"user","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"visible"}]}}"#;
        let parse = parse(&[line]);
        assert_eq!(parse.messages[0].body, "visible");
    }

    #[test]
    fn missing_content_yields_empty_body() {
        let parse = parse(&[r#"{"type":"user","message":{}}"#]);
        assert_eq!(parse.messages.len(), 1);
        assert!(parse.messages[0].body.is_empty());
    }

    #[test]
    fn timestamp_parsed_from_rfc3339() {
        let parse = parse(&[
            r#"{"type":"user","message":{"content":"hi"},"timestamp":"2024-06-01T12:00:00Z"}"#,
        ]);
        assert_eq!(
            parse.messages[0].timestamp.to_rfc3339(),
            "2024-06-01T12:00:00+00:00"
        );
    }
}
