//! Short textual summaries: tool inputs, error briefs, truncation.

use serde_json::Value;

const PERMISSION_PHRASES: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "access denied",
    "eacces",
];

const REJECTION_PHRASES: &[&str] = &[
    "user rejected",
    "rejected by user",
    "user denied",
    "user declined",
    "doesn't want to proceed",
];

const TIMEOUT_PHRASES: &[&str] = &["timed out", "timeout", "etimedout"];

/// Shorten `text` to roughly `budget` characters.
///
/// Keeps the leading 60% and trailing 30% of the budget with a marker in
/// between naming how much was dropped.
pub fn truncate(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }

    let head = budget * 6 / 10;
    let tail = budget * 3 / 10;
    let omitted = total - head - tail;

    let mut out: String = text.chars().take(head).collect();
    out.push_str(&format!(
        "\n[... {} chars omitted of {} total ...]\n",
        omitted, total
    ));
    out.extend(text.chars().skip(total - tail));
    out
}

/// Summarize a tool's input as one short line.
///
/// Known tools render their most telling argument; anything else falls back
/// to the first scalar argument, then to the serialized input.
pub fn summarize_input(tool: &str, input: &Value, budget: usize) -> String {
    let known = match tool {
        "Read" | "Write" | "Edit" | "MultiEdit" => str_field(input, "file_path"),
        "NotebookRead" | "NotebookEdit" => str_field(input, "notebook_path"),
        "Grep" | "Glob" => str_field(input, "pattern").map(|pattern| {
            match str_field(input, "path") {
                Some(path) => format!("{} in {}", pattern, path),
                None => pattern,
            }
        }),
        "Bash" => str_field(input, "command"),
        "WebFetch" => str_field(input, "url"),
        "WebSearch" => str_field(input, "query"),
        "Task" | "Agent" => {
            str_field(input, "description").or_else(|| str_field(input, "prompt"))
        }
        _ => None,
    };

    let summary = known
        .or_else(|| first_scalar(input))
        .unwrap_or_else(|| input.to_string());

    truncate(&one_line(&summary), budget)
}

/// Reduce an error message to a short, comparable brief.
///
/// Checks permission denials, then user rejections, then timeouts; anything
/// else becomes its first non-blank line capped at `cap` characters.
pub fn classify_error(text: &str, cap: usize) -> String {
    let lower = text.to_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    if contains_any(PERMISSION_PHRASES) {
        return "permission denied".to_string();
    }
    if contains_any(REJECTION_PHRASES) {
        return "user rejected".to_string();
    }
    if contains_any(TIMEOUT_PHRASES) {
        return "timeout".to_string();
    }

    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(cap).collect())
        .unwrap_or_else(|| "error".to_string())
}

fn str_field(input: &Value, key: &str) -> Option<String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn first_scalar(input: &Value) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.values().find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
