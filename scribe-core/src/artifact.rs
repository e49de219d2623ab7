//! The observation artifact: an append-only markdown document that is
//! occasionally rewritten by compaction.

use crate::error::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Top-level header every artifact starts with
pub const HEADER: &str = "# Observations";

/// Bytes per token used to estimate artifact size
pub const BYTES_PER_TOKEN: u64 = 4;

/// Append a dated section containing `body` verbatim.
///
/// Creates the file and its directory as needed. If the top-level header is
/// missing (new file, or a compaction dropped it) the file is rewritten with
/// the header in front.
pub fn append_section(path: &Path, body: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let section = format!(
        "\n## {}\n\n{}\n",
        Local::now().format("%Y-%m-%d %H:%M"),
        body.trim_end()
    );

    if existing.trim_start().starts_with(HEADER) {
        let mut out = String::new();
        if !existing.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&section);
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(out.as_bytes())?;
    } else {
        let mut out = format!("{}\n", HEADER);
        if !existing.trim().is_empty() {
            out.push('\n');
            out.push_str(existing.trim());
            out.push('\n');
        }
        out.push_str(&section);
        fs::write(path, out)?;
    }
    Ok(())
}

/// Replace the artifact's content via a temporary file and rename.
pub fn replace(path: &Path, content: &str) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Approximate token count of the artifact; zero if it does not exist.
pub fn estimated_tokens(path: &Path) -> u64 {
    fs::metadata(path)
        .map(|m| m.len() / BYTES_PER_TOKEN)
        .unwrap_or(0)
}

/// Number of observations in an extraction output: its markdown bullets, at
/// least one.
pub fn count_observations(body: &str) -> u64 {
    let bullets = body
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("- ") || line.starts_with("* "))
        .count() as u64;
    bullets.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_creates_header_and_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".scribe/observations.md");

        append_section(&path, "- uses sqlx for queries\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Observations\n\n## "));
        assert!(content.ends_with("\n\n- uses sqlx for queries\n"));
    }

    #[test]
    fn test_append_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.md");

        append_section(&path, "- first").unwrap();
        append_section(&path, "- second").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(HEADER).count(), 1);
        assert_eq!(content.matches("\n## ").count(), 2);
        let first = content.find("- first").unwrap();
        let second = content.find("- second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_append_restores_missing_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.md");
        fs::write(&path, "- compacted fact\n").unwrap();

        append_section(&path, "- new fact").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Observations\n\n- compacted fact\n\n## "));
        assert!(content.ends_with("- new fact\n"));
    }

    #[test]
    fn test_replace_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.md");
        fs::write(&path, "old").unwrap();

        replace(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join("observations.md.tmp").exists());
    }

    #[test]
    fn test_estimated_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.md");
        assert_eq!(estimated_tokens(&path), 0);

        fs::write(&path, "x".repeat(400)).unwrap();
        assert_eq!(estimated_tokens(&path), 100);
    }

    #[test]
    fn test_count_observations() {
        assert_eq!(count_observations("- a\n- b\n  * nested"), 3);
        assert_eq!(count_observations("Prose without bullets."), 1);
    }
}
