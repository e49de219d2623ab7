//! Transcript rendering
//!
//! Turns decoded entries into the line-oriented transcript handed to the
//! extraction pass:
//!
//! ```text
//! [User]: <text>
//! [Assistant]: <text>
//! [Tool: <name>] <summary>
//! [Tool Result]: <truncated text>
//! [Tool error: <brief>]
//! [Retry chain: <name> x<N> failed]
//!   Input: <summary>            (blind retry: every input identical)
//!   Error: <brief>
//!   First: <summary>            (adaptive retry: inputs changed)
//!   Last: <summary>
//!   Last error: <brief>         (errors differ; otherwise `Error:`)
//! ```
//!
//! Failed tool results are only ever rendered through retry chains, so the
//! per-entry renderer skips them and a failure never shows up twice.

mod chain;
mod summary;

pub use crate::config::RenderConfig;
pub use chain::detect_chain;
pub use summary::{classify_error, summarize_input, truncate};

use crate::types::{Content, ContentBlock, LogEntry, RetryChain, Role};

/// Render a sequence of entries, collapsing retry chains.
pub fn render(entries: &[LogEntry], config: &RenderConfig) -> String {
    let mut lines = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        if let Some(chain) = detect_chain(entries, i, config) {
            render_chain(&entries[i], &chain, config, &mut lines);
            i = chain.end;
        } else {
            render_entry(&entries[i], config, &mut lines);
            i += 1;
        }
    }

    lines.join("\n")
}

fn render_chain(
    first: &LogEntry,
    chain: &RetryChain,
    config: &RenderConfig,
    lines: &mut Vec<String>,
) {
    let (Some(head), Some(last)) = (chain.attempts.first(), chain.attempts.last()) else {
        return;
    };

    if chain.len() == 1 {
        render_entry(first, config, lines);
        lines.push(format!("[Tool error: {}]", head.error_brief));
        return;
    }

    lines.push(format!(
        "[Retry chain: {} x{} failed]",
        chain.tool_name(),
        chain.len()
    ));

    let same_input = chain
        .attempts
        .iter()
        .all(|a| a.input_summary == head.input_summary);
    let same_error = chain
        .attempts
        .iter()
        .all(|a| a.error_brief == head.error_brief);

    if same_input {
        lines.push(format!("  Input: {}", head.input_summary));
    } else {
        lines.push(format!("  First: {}", head.input_summary));
        lines.push(format!("  Last: {}", last.input_summary));
    }

    if same_error {
        lines.push(format!("  Error: {}", head.error_brief));
    } else {
        lines.push(format!("  Last error: {}", last.error_brief));
    }
}

fn render_entry(entry: &LogEntry, config: &RenderConfig, lines: &mut Vec<String>) {
    let label = match entry.role {
        Role::User if entry.is_meta => return,
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System | Role::Other => return,
    };

    match &entry.content {
        Content::Text(text) => push_text(label, text, config, lines),
        Content::Blocks(blocks) => {
            for block in blocks {
                match block {
                    ContentBlock::Text(text) => push_text(label, text, config, lines),
                    ContentBlock::ToolCall { name, input } => {
                        let summary = summarize_input(name, input, config.input_budget);
                        lines.push(format!("[Tool: {}] {}", name, summary).trim_end().to_string());
                    }
                    ContentBlock::ToolResult {
                        is_error: false,
                        content,
                    } if !content.trim().is_empty() => {
                        lines.push(format!(
                            "[Tool Result]: {}",
                            truncate(content.trim(), config.tool_result_budget)
                        ));
                    }
                    ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
                }
            }
        }
    }
}

fn push_text(label: &str, text: &str, config: &RenderConfig, lines: &mut Vec<String>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    lines.push(format!("[{}]: {}", label, truncate(text, config.text_budget)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn call(name: &str, input: Value) -> LogEntry {
        LogEntry::new(
            Role::Assistant,
            Content::Blocks(vec![ContentBlock::ToolCall {
                name: name.to_string(),
                input,
            }]),
        )
    }

    fn result(is_error: bool, text: &str) -> LogEntry {
        LogEntry::new(
            Role::User,
            Content::Blocks(vec![ContentBlock::ToolResult {
                is_error,
                content: text.to_string(),
            }]),
        )
    }

    fn user(text: &str) -> LogEntry {
        LogEntry::new(Role::User, Content::Text(text.to_string()))
    }

    fn cfg() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn test_render_plain_conversation() {
        let entries = vec![
            user("Fix the build"),
            LogEntry::new(
                Role::Assistant,
                Content::Blocks(vec![
                    ContentBlock::Other,
                    ContentBlock::Text("Looking at it".to_string()),
                ]),
            ),
            call("Read", json!({"file_path": "Cargo.toml"})),
            result(false, "[package]\nname = \"x\""),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[User]: Fix the build\n\
             [Assistant]: Looking at it\n\
             [Tool: Read] Cargo.toml\n\
             [Tool Result]: [package]\nname = \"x\""
        );
    }

    #[test]
    fn test_render_suppresses_meta_and_system() {
        let entries = vec![
            user("<local-command-caveat>").with_meta(true),
            LogEntry::new(Role::System, Content::Text("compacted".to_string())),
            user("real input"),
        ];
        assert_eq!(render(&entries, &cfg()), "[User]: real input");
    }

    #[test]
    fn test_single_failure_renders_call_and_error_marker() {
        let entries = vec![
            call("Bash", json!({"command": "cargo test"})),
            result(true, "error: could not compile `x`"),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[Tool: Bash] cargo test\n[Tool error: error: could not compile `x`]"
        );
        assert!(!out.contains("Retry chain"));
    }

    #[test]
    fn test_blind_retry_shares_input_and_error() {
        let entries = vec![
            call("Bash", json!({"command": "npm install"})),
            result(true, "EACCES: permission denied"),
            call("Bash", json!({"command": "npm install"})),
            result(true, "EACCES: permission denied"),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[Retry chain: Bash x2 failed]\n  Input: npm install\n  Error: permission denied"
        );
    }

    #[test]
    fn test_adaptive_retry_shows_first_last_and_last_error() {
        let entries = vec![
            call("Edit", json!({"file_path": "a.rs"})),
            result(true, "String not found in file"),
            call("Edit", json!({"file_path": "b.rs"})),
            result(true, "File has been modified since read"),
            call("Edit", json!({"file_path": "c.rs"})),
            result(true, "File does not exist"),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[Retry chain: Edit x3 failed]\n  First: a.rs\n  Last: c.rs\n  Last error: File does not exist"
        );
        assert!(!out.contains("b.rs"));
    }

    #[test]
    fn test_adaptive_retry_with_shared_error() {
        let entries = vec![
            call("WebFetch", json!({"url": "https://a"})),
            result(true, "Request timed out"),
            call("WebFetch", json!({"url": "https://b"})),
            result(true, "timeout"),
        ];
        let out = render(&entries, &cfg());
        assert!(out.ends_with("  First: https://a\n  Last: https://b\n  Error: timeout"));
    }

    #[test]
    fn test_failure_then_successful_retry() {
        let entries = vec![
            user("find foo"),
            call("search", json!({"pattern": "foo"})),
            result(true, "permission denied"),
            call("search", json!({"pattern": "foo"})),
            result(false, "src/lib.rs:1: foo"),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[User]: find foo\n\
             [Tool: search] foo\n\
             [Tool error: permission denied]\n\
             [Tool: search] foo\n\
             [Tool Result]: src/lib.rs:1: foo"
        );
    }

    #[test]
    fn test_parallel_calls_render_separately() {
        let entries = vec![
            call("Read", json!({"file_path": "a"})).with_correlation_id("msg_1"),
            result(true, "permission denied"),
            call("Read", json!({"file_path": "a"})).with_correlation_id("msg_1"),
            result(true, "permission denied"),
        ];
        let out = render(&entries, &cfg());
        assert_eq!(
            out,
            "[Tool: Read] a\n[Tool error: permission denied]\n[Tool: Read] a\n[Tool error: permission denied]"
        );
    }

    #[test]
    fn test_error_results_outside_chains_are_not_rendered() {
        let entries = vec![user("hi"), result(true, "stray failure")];
        assert_eq!(render(&entries, &cfg()), "[User]: hi");
    }

    #[test]
    fn test_long_tool_result_is_truncated() {
        let config = RenderConfig {
            tool_result_budget: 10,
            ..RenderConfig::default()
        };
        let entries = vec![
            call("Bash", json!({"command": "cat big"})),
            result(false, &"x".repeat(100)),
        ];
        let out = render(&entries, &config);
        assert!(out.contains("[... 91 chars omitted of 100 total ...]"));
    }
}
