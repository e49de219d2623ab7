//! Incremental extraction of new log content
//!
//! ## Incremental Reading
//!
//! [`read_delta`] reads the byte range between a stored offset and the file
//! size observed at read time. The new offset is always that size, so the next
//! read starts exactly where this one stopped. If the file shrank (truncation
//! or rotation) the read is a no-op and the offset is left alone.
//!
//! ## Error Handling
//!
//! - **Malformed lines**: skipped and counted in [`DeltaSegment::skipped_lines`].
//!   A crash mid-append can leave a partial line; it must not poison the segment.
//! - **Missing file**: returned as an IO error; callers treat it as "gone".

mod parser;

pub use parser::decode_line;

use crate::error::Result;
use crate::types::DeltaSegment;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Read and decode everything appended to `path` since `offset`.
pub fn read_delta(path: &Path, offset: u64) -> Result<DeltaSegment> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    if size <= offset {
        if size < offset {
            tracing::warn!(
                path = %path.display(),
                offset,
                size,
                "Log file is smaller than stored offset, leaving cursor in place"
            );
        }
        return Ok(DeltaSegment::empty(offset));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut raw = Vec::with_capacity((size - offset) as usize);
    file.take(size - offset).read_to_end(&mut raw)?;

    let mut segment = decode_segment(&raw);
    segment.from_offset = offset;
    segment.new_offset = offset + raw.len() as u64;

    if segment.skipped_lines > 0 {
        tracing::debug!(
            path = %path.display(),
            skipped = segment.skipped_lines,
            "Skipped undecodable lines"
        );
    }

    Ok(segment)
}

/// Decode raw JSONL bytes into entries, skipping blank and malformed lines.
///
/// Offsets on the returned segment are zero; [`read_delta`] fills them in.
pub fn decode_segment(raw: &[u8]) -> DeltaSegment {
    let mut segment = DeltaSegment::default();

    for line in raw.split(|b| *b == b'\n') {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode_line(line) {
            Ok(entry) => segment.entries.push(entry),
            Err(e) => {
                tracing::trace!(error = %e, "Undecodable log line");
                segment.skipped_lines += 1;
            }
        }
    }

    segment
}

/// A session log in a project's log directory.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: SystemTime,
}

impl LogFile {
    /// File name used as the cursor key.
    pub fn name(&self) -> String {
        log_file_name(&self.path)
    }
}

/// Cursor key for a log path: its file name.
pub fn log_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List `*.jsonl` files directly inside `dir`, newest first.
///
/// A missing directory yields an empty list.
pub fn discover_logs(dir: &Path) -> Result<Vec<LogFile>> {
    let pattern = dir.join("*.jsonl");
    let pattern_str = pattern.to_string_lossy();

    let entries = glob::glob(&pattern_str)
        .map_err(|e| crate::error::Error::Config(format!("invalid log pattern: {}", e)))?;

    let mut files: Vec<LogFile> = entries
        .flatten()
        .filter_map(|path| {
            let metadata = std::fs::metadata(&path).ok()?;
            Some(LogFile {
                size_bytes: metadata.len(),
                modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            })
        })
        .collect();

    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use std::io::Write;
    use tempfile::TempDir;

    const USER_LINE: &str = r#"{"type":"user","message":{"role":"user","content":"hello"}}"#;
    const ASSISTANT_LINE: &str =
        r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"hi"}]}}"#;

    fn write_log(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_delta_from_start() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}\n{}\n", USER_LINE, ASSISTANT_LINE);
        let path = write_log(&dir, "s.jsonl", &content);

        let segment = read_delta(&path, 0).unwrap();
        assert_eq!(segment.from_offset, 0);
        assert_eq!(segment.new_offset, content.len() as u64);
        assert_eq!(segment.entries.len(), 2);
        assert_eq!(segment.entries[0].role, Role::User);
        assert_eq!(segment.entries[1].role, Role::Assistant);
    }

    #[test]
    fn test_read_delta_resumes_at_offset() {
        let dir = TempDir::new().unwrap();
        let first = format!("{}\n", USER_LINE);
        let path = write_log(&dir, "s.jsonl", &first);

        let segment = read_delta(&path, 0).unwrap();
        assert_eq!(segment.entries.len(), 1);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", ASSISTANT_LINE).unwrap();

        let next = read_delta(&path, segment.new_offset).unwrap();
        assert_eq!(next.from_offset, first.len() as u64);
        assert_eq!(next.entries.len(), 1);
        assert_eq!(next.entries[0].role, Role::Assistant);
    }

    #[test]
    fn test_read_delta_at_eof_is_noop() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}\n", USER_LINE);
        let path = write_log(&dir, "s.jsonl", &content);

        let segment = read_delta(&path, content.len() as u64).unwrap();
        assert!(segment.is_empty());
        assert!(segment.entries.is_empty());
    }

    #[test]
    fn test_read_delta_truncated_file_keeps_offset() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "s.jsonl", "{}\n");

        let segment = read_delta(&path, 500).unwrap();
        assert_eq!(segment.from_offset, 500);
        assert_eq!(segment.new_offset, 500);
    }

    #[test]
    fn test_read_delta_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}\n\n{{\"type\":\"user\",\"mess\n{}\n", USER_LINE, ASSISTANT_LINE);
        let path = write_log(&dir, "s.jsonl", &content);

        let segment = read_delta(&path, 0).unwrap();
        assert_eq!(segment.entries.len(), 2);
        assert_eq!(segment.skipped_lines, 1);
        assert_eq!(segment.new_offset, content.len() as u64);
    }

    #[test]
    fn test_read_delta_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_delta(&dir.path().join("nope.jsonl"), 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_discover_logs_filters_extension() {
        let dir = TempDir::new().unwrap();
        write_log(&dir, "a.jsonl", USER_LINE);
        write_log(&dir, "notes.txt", "x");

        let files = discover_logs(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "a.jsonl");
    }

    #[test]
    fn test_discover_logs_missing_dir() {
        let dir = TempDir::new().unwrap();
        let files = discover_logs(&dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }
}
