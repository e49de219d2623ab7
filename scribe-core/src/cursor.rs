//! Flat-file cursor storage
//!
//! One JSON file per project under the cursor directory, named after the
//! project key so the location does not depend on the root path's length or
//! characters:
//!
//! ```json
//! {
//!   "files": {
//!     "0b5c….jsonl": { "offset": 18234, "lastProcessed": "2026-…", "observationCount": 7 }
//!   },
//!   "totalExtractionPasses": 12,
//!   "totalCompactionPasses": 1,
//!   "lastCompaction": "2026-…"
//! }
//! ```
//!
//! Writes go to a uniquely named temporary file that is renamed into place.
//! Read-modify-write cycles hold an exclusive OS lock on `<key>.lock` next to
//! the record, so `scribe watch` and a one-shot `scribe compact` never lose
//! each other's updates. A missing directory is created on save; a missing or
//! unreadable file loads as an empty record.

use crate::error::Result;
use crate::project::project_key;
use crate::types::Cursor;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Cursors and pass statistics for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectCursors {
    /// Log file name → cursor
    pub files: BTreeMap<String, Cursor>,
    pub total_extraction_passes: u64,
    pub total_compaction_passes: u64,
    pub last_compaction: Option<DateTime<Utc>>,
}

impl ProjectCursors {
    pub fn cursor(&self, file: &str) -> Option<&Cursor> {
        self.files.get(file)
    }

    /// Bytes already consumed from `file`; zero for unseen files.
    pub fn get_offset(&self, file: &str) -> u64 {
        self.files.get(file).map(|c| c.offset).unwrap_or(0)
    }

    /// Advance `file` to `new_offset` and add `observation_delta` observations.
    ///
    /// The offset never moves backwards.
    pub fn set_offset(&mut self, file: &str, new_offset: u64, observation_delta: u64) {
        let cursor = self.files.entry(file.to_string()).or_default();
        if new_offset < cursor.offset {
            tracing::warn!(
                file,
                current = cursor.offset,
                requested = new_offset,
                "Refusing to move cursor backwards"
            );
        } else {
            cursor.offset = new_offset;
        }
        cursor.observation_count += observation_delta;
        cursor.last_processed = Some(Utc::now());
    }

    pub fn record_extraction_pass(&mut self) {
        self.total_extraction_passes += 1;
    }

    pub fn record_compaction(&mut self, at: DateTime<Utc>) {
        self.total_compaction_passes += 1;
        self.last_compaction = Some(at);
    }

    pub fn total_observations(&self) -> u64 {
        self.files.values().map(|c| c.observation_count).sum()
    }
}

/// Loads and saves [`ProjectCursors`] keyed by project root.
pub struct CursorStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

/// Exclusive OS lock on a project's cursor record; released on drop.
struct RecordLock {
    file: File,
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl CursorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cursor file for a project root.
    pub fn path_for(&self, root: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", project_key(root)))
    }

    /// Load the record for `root`, or an empty one if none exists.
    pub fn load(&self, root: &Path) -> Result<ProjectCursors> {
        let path = self.path_for(root);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectCursors::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(cursors) => Ok(cursors),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable cursor file, starting from empty cursors"
                );
                Ok(ProjectCursors::default())
            }
        }
    }

    /// Atomically replace the record for `root`.
    pub fn save(&self, root: &Path, cursors: &ProjectCursors) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _record = self.lock_record(root)?;
        self.write(root, cursors)
    }

    /// Load, modify and save the record for `root` without interleaving
    /// with other updates, from this process or another.
    pub fn update<F>(&self, root: &Path, f: F) -> Result<ProjectCursors>
    where
        F: FnOnce(&mut ProjectCursors),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _record = self.lock_record(root)?;
        let mut cursors = self.load(root)?;
        f(&mut cursors);
        self.write(root, &cursors)?;
        Ok(cursors)
    }

    fn lock_record(&self, root: &Path) -> Result<RecordLock> {
        std::fs::create_dir_all(&self.dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.path_for(root).with_extension("lock"))?;
        file.lock_exclusive()?;
        Ok(RecordLock { file })
    }

    fn write(&self, root: &Path, cursors: &ProjectCursors) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(root);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let json = serde_json::to_string_pretty(cursors)?;
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}
