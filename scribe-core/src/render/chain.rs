//! Retry chain detection
//!
//! A retry chain is a run of failed calls to the same tool, each call followed
//! directly by a result entry in which every block is an error:
//!
//! ```text
//! [i]   assistant: tool_use Bash {"command": "make"}      ─┐ attempt 1
//! [i+1] user:      tool_result is_error                    ─┘
//! [i+2] assistant: "Let me try again"                        (skipped)
//! [i+3] assistant: tool_use Bash {"command": "make -B"}    ─┐ attempt 2
//! [i+4] user:      tool_result is_error                    ─┘
//! [i+5] assistant: tool_use Bash {"command": "make -j1"}     ends the chain:
//! [i+6] user:      tool_result ok                            result succeeded
//! ```
//!
//! Calls sharing the correlation id of the first attempt were issued in
//! parallel with it and are never folded into its chain.

use super::summary::{classify_error, summarize_input};
use crate::config::RenderConfig;
use crate::types::{ChainAttempt, LogEntry, RetryChain};
use serde_json::Value;

/// Try to recognize a retry chain starting at `start`.
///
/// Returns `None` unless `entries[start]` is a tool call answered by an
/// all-error result.
pub fn detect_chain(
    entries: &[LogEntry],
    start: usize,
    config: &RenderConfig,
) -> Option<RetryChain> {
    let first = entries.get(start)?;
    if !first.is_tool_call_entry() {
        return None;
    }
    let result = entries.get(start + 1)?;
    if !result.is_error_result() {
        return None;
    }

    let (tool, input) = first.first_tool_call()?;
    let mut attempts = vec![attempt(tool, input, result, config)];
    let mut end = start + 2;
    let mut j = end;

    while j < entries.len() {
        let entry = &entries[j];
        if entry.is_commentary() {
            j += 1;
            continue;
        }
        if !entry.is_tool_call_entry() || entry.correlates_with(first) {
            break;
        }
        let Some((name, input)) = entry.first_tool_call() else {
            break;
        };
        if name != tool {
            break;
        }
        match entries.get(j + 1) {
            Some(next) if next.is_error_result() => {
                attempts.push(attempt(name, input, next, config));
                j += 2;
                end = j;
            }
            _ => break,
        }
    }

    Some(RetryChain { attempts, end })
}

fn attempt(tool: &str, input: &Value, result: &LogEntry, config: &RenderConfig) -> ChainAttempt {
    ChainAttempt {
        tool_name: tool.to_string(),
        input_summary: summarize_input(tool, input, config.input_budget),
        error_brief: classify_error(&result.error_text(), config.error_budget),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Content, ContentBlock, Role};
    use serde_json::json;

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

    fn says(text: &str) -> LogEntry {
        LogEntry::new(
            Role::Assistant,
            Content::Blocks(vec![ContentBlock::Text(text.to_string())]),
        )
    }

    fn cfg() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn test_no_chain_without_error() {
        let entries = vec![call("Bash", json!({"command": "ls"})), result(false, "ok")];
        assert!(detect_chain(&entries, 0, &cfg()).is_none());
    }

    #[test]
    fn test_no_chain_on_partial_failure() {
        let mixed = LogEntry::new(
            Role::User,
            Content::Blocks(vec![
                ContentBlock::ToolResult {
                    is_error: true,
                    content: "boom".to_string(),
                },
                ContentBlock::ToolResult {
                    is_error: false,
                    content: "fine".to_string(),
                },
            ]),
        );
        let entries = vec![call("Bash", json!({"command": "ls"})), mixed];
        assert!(detect_chain(&entries, 0, &cfg()).is_none());
    }

    #[test]
    fn test_single_failure_is_chain_of_one() {
        let entries = vec![
            call("Bash", json!({"command": "make"})),
            result(true, "make: *** No rule to make target"),
            call("Bash", json!({"command": "make all"})),
            result(false, "done"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.end, 2);
        assert_eq!(chain.attempts[0].input_summary, "make");
    }

    #[test]
    fn test_chain_skips_commentary_between_attempts() {
        let entries = vec![
            call("Bash", json!({"command": "make"})),
            result(true, "Permission denied"),
            says("Let me retry"),
            call("Bash", json!({"command": "make"})),
            result(true, "permission denied"),
            says("Trailing commentary"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tool_name(), "Bash");
        // trailing commentary is not swallowed
        assert_eq!(chain.end, 5);
    }

    #[test]
    fn test_chain_stops_at_different_tool() {
        let entries = vec![
            call("Bash", json!({"command": "make"})),
            result(true, "failed"),
            call("Read", json!({"file_path": "Makefile"})),
            result(true, "failed"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.end, 2);
    }

    #[test]
    fn test_chain_never_folds_parallel_calls() {
        let entries = vec![
            call("Grep", json!({"pattern": "a"})).with_correlation_id("msg_1"),
            result(true, "permission denied"),
            call("Grep", json!({"pattern": "b"})).with_correlation_id("msg_1"),
            result(true, "permission denied"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.end, 2);

        // the sibling starts its own chain
        let sibling = detect_chain(&entries, 2, &cfg()).unwrap();
        assert_eq!(sibling.len(), 1);
        assert_eq!(sibling.attempts[0].input_summary, "b");
    }

    #[test]
    fn test_chain_folds_sequential_turns() {
        let entries = vec![
            call("Grep", json!({"pattern": "a"})).with_correlation_id("msg_1"),
            result(true, "timed out"),
            call("Grep", json!({"pattern": "a"})).with_correlation_id("msg_2"),
            result(true, "timed out"),
            call("Grep", json!({"pattern": "a"})).with_correlation_id("msg_3"),
            result(true, "timed out"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.end, 6);
        assert!(chain.attempts.iter().all(|a| a.error_brief == "timeout"));
    }

    #[test]
    fn test_chain_ends_before_successful_retry() {
        let entries = vec![
            call("Bash", json!({"command": "a"})),
            result(true, "x"),
            call("Bash", json!({"command": "b"})),
            result(true, "y"),
            call("Bash", json!({"command": "c"})),
            result(false, "ok"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.end, 4);
    }

    #[test]
    fn test_chain_ends_at_user_input() {
        let entries = vec![
            call("Bash", json!({"command": "a"})),
            result(true, "x"),
            LogEntry::new(Role::User, Content::Text("stop".to_string())),
            call("Bash", json!({"command": "a"})),
            result(true, "x"),
        ];
        let chain = detect_chain(&entries, 0, &cfg()).unwrap();
        assert_eq!(chain.len(), 1);
    }
}
