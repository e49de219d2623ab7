//! Claude Code JSONL record decoding
//!
//! Each log line is decoded independently into a [`LogEntry`]. Raw records use
//! `#[serde(default)]` liberally so missing fields never reject a line; only
//! lines that are not valid JSON objects fail.

use crate::error::Result;
use crate::types::{Content, ContentBlock, LogEntry, Role};
use serde::Deserialize;
use serde_json::Value;

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from a Claude Code session log.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    is_meta: Option<bool>,
    request_id: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    id: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    // thinking, image, and anything newer
    #[serde(other)]
    Unknown,
}

impl From<RawBlock> for ContentBlock {
    fn from(block: RawBlock) -> Self {
        match block {
            RawBlock::Text { text } => ContentBlock::Text(text),
            RawBlock::ToolUse { name, input } => ContentBlock::ToolCall { name, input },
            RawBlock::ToolResult { content, is_error } => ContentBlock::ToolResult {
                is_error,
                content: flatten_result(&content),
            },
            RawBlock::Unknown => ContentBlock::Other,
        }
    }
}

/// Decode one JSONL line into a [`LogEntry`].
///
/// Records without a `message` (summaries, file snapshots) decode as
/// [`Role::Other`] with empty text so callers can skip them uniformly.
pub fn decode_line(line: &str) -> Result<LogEntry> {
    let record: RawRecord = serde_json::from_str(line)?;

    let message = record.message.unwrap_or_default();
    let role = message
        .role
        .as_deref()
        .or(record.record_type.as_deref())
        .map(Role::parse)
        .unwrap_or(Role::Other);

    let content = match message.content {
        Some(RawContent::Text(text)) => Content::Text(text),
        Some(RawContent::Blocks(blocks)) => {
            Content::Blocks(blocks.into_iter().map(ContentBlock::from).collect())
        }
        None => Content::default(),
    };

    Ok(LogEntry {
        role,
        content,
        correlation_id: message.id.or(record.request_id),
        is_meta: record.is_meta.unwrap_or(false),
    })
}

/// Flatten tool result content into plain text.
///
/// Results arrive either as a string or as an array of typed parts; text parts
/// are joined with newlines and anything else is serialized.
fn flatten_result(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                Value::Object(obj) => match obj.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => part.to_string(),
                },
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_user_text() {
        let line = r#"{"type":"user","message":{"role":"user","content":"Hello"},"uuid":"u1"}"#;
        let entry = decode_line(line).unwrap();
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.content, Content::Text("Hello".to_string()));
        assert!(!entry.is_meta);
        assert!(entry.correlation_id.is_none());
    }

    #[test]
    fn test_decode_meta_flag() {
        let line = r#"{"type":"user","isMeta":true,"message":{"role":"user","content":"<caveat>"}}"#;
        let entry = decode_line(line).unwrap();
        assert!(entry.is_meta);
    }

    #[test]
    fn test_decode_tool_use_with_message_id() {
        let line = r#"{"type":"assistant","requestId":"req_1","message":{"id":"msg_1","role":"assistant","content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls"}}]}}"#;
        let entry = decode_line(line).unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.correlation_id.as_deref(), Some("msg_1"));
        assert_eq!(
            entry.first_tool_call(),
            Some(("Bash", &json!({"command": "ls"})))
        );
    }

    #[test]
    fn test_decode_falls_back_to_request_id() {
        let line = r#"{"type":"assistant","requestId":"req_9","message":{"role":"assistant","content":[{"type":"text","text":"hi"}]}}"#;
        let entry = decode_line(line).unwrap();
        assert_eq!(entry.correlation_id.as_deref(), Some("req_9"));
    }

    #[test]
    fn test_decode_tool_result_array_content() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","is_error":true,"content":[{"type":"text","text":"line one"},{"type":"text","text":"line two"}]}]}}"#;
        let entry = decode_line(line).unwrap();
        assert!(entry.is_error_result());
        assert_eq!(entry.error_text(), "line one\nline two");
    }

    #[test]
    fn test_decode_unknown_blocks_become_other() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"}]}}"#;
        let entry = decode_line(line).unwrap();
        assert_eq!(entry.blocks(), &[ContentBlock::Other]);
        assert!(entry.is_commentary());
    }

    #[test]
    fn test_decode_record_without_message() {
        let line = r#"{"type":"summary","summary":"Refactor","leafUuid":"x"}"#;
        let entry = decode_line(line).unwrap();
        assert_eq!(entry.role, Role::Other);
        assert_eq!(entry.content, Content::Text(String::new()));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(decode_line(r#"{"type":"user","message":{"#).is_err());
    }
}
