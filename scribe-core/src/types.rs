//! Core domain types for scribe
//!
//! Entries are transient: they are decoded from a [`DeltaSegment`], rendered,
//! and dropped within one processing cycle. Cursors live in the
//! [`crate::cursor::CursorStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================
// Log entries
// ============================================

/// Who authored an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Other,
}

impl Role {
    /// Parse a role from its string representation; unknown values map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Other => "other",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block of structured message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain text
    Text(String),
    /// A tool invocation with its input arguments
    ToolCall { name: String, input: Value },
    /// The outcome of a tool invocation, flattened to text
    ToolResult { is_error: bool, content: String },
    /// Thinking, images and anything else not relevant to the digest
    Other,
}

/// Entry content: either a bare string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// One decoded record from a session log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub role: Role,
    pub content: Content,
    /// Shared by entries emitted in the same model turn
    pub correlation_id: Option<String>,
    /// Injected by the harness rather than typed by the user
    pub is_meta: bool,
}

impl LogEntry {
    pub fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            correlation_id: None,
            is_meta: false,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_meta(mut self, is_meta: bool) -> Self {
        self.is_meta = is_meta;
        self
    }

    /// Content blocks, empty for plain-text content.
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            Content::Blocks(blocks) => blocks,
            Content::Text(_) => &[],
        }
    }

    /// Iterate the tool calls in this entry as `(name, input)` pairs.
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.blocks().iter().filter_map(|block| match block {
            ContentBlock::ToolCall { name, input } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    /// The first tool call, if any.
    pub fn first_tool_call(&self) -> Option<(&str, &Value)> {
        self.tool_calls().next()
    }

    /// Assistant entry carrying at least one tool call.
    pub fn is_tool_call_entry(&self) -> bool {
        self.role == Role::Assistant && self.first_tool_call().is_some()
    }

    /// Assistant entry with no tool calls: commentary or thinking only.
    pub fn is_commentary(&self) -> bool {
        self.role == Role::Assistant && self.first_tool_call().is_none()
    }

    /// Every block is a tool result and every result is flagged as an error.
    pub fn is_error_result(&self) -> bool {
        let blocks = self.blocks();
        !blocks.is_empty()
            && blocks
                .iter()
                .all(|b| matches!(b, ContentBlock::ToolResult { is_error: true, .. }))
    }

    /// Concatenated text of all error results in this entry.
    pub fn error_text(&self) -> String {
        self.blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    is_error: true,
                    content,
                } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True if both entries carry the same correlation id.
    ///
    /// Entries without an id never correlate.
    pub fn correlates_with(&self, other: &LogEntry) -> bool {
        matches!(
            (&self.correlation_id, &other.correlation_id),
            (Some(a), Some(b)) if a == b
        )
    }
}

// ============================================
// Delta segments
// ============================================

/// Entries decoded from the byte range `[from_offset, new_offset)` of a log.
#[derive(Debug, Clone, Default)]
pub struct DeltaSegment {
    pub from_offset: u64,
    pub new_offset: u64,
    pub entries: Vec<LogEntry>,
    /// Non-blank lines that failed to decode
    pub skipped_lines: usize,
}

impl DeltaSegment {
    /// A segment that consumed nothing.
    pub fn empty(offset: u64) -> Self {
        Self {
            from_offset: offset,
            new_offset: offset,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_offset == self.from_offset
    }
}

// ============================================
// Retry chains
// ============================================

/// One failed call inside a retry chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAttempt {
    pub tool_name: String,
    pub input_summary: String,
    pub error_brief: String,
}

/// Consecutive failed attempts of the same tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryChain {
    pub attempts: Vec<ChainAttempt>,
    /// Index of the first entry after the chain
    pub end: usize,
}

impl RetryChain {
    pub fn tool_name(&self) -> &str {
        self.attempts
            .first()
            .map(|a| a.tool_name.as_str())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

// ============================================
// Cursors
// ============================================

/// Per-file progress record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cursor {
    /// Bytes consumed so far
    pub offset: u64,
    pub last_processed: Option<DateTime<Utc>>,
    pub observation_count: u64,
}
