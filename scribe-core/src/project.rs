//! Registered projects and where their files live

use crate::config::{Config, ProjectConfig};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A project whose Claude Code sessions are digested into one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Stable key derived from the root path
    pub key: String,
    pub root: PathBuf,
    /// Directory holding the project's `*.jsonl` session logs
    pub log_dir: PathBuf,
    /// Markdown file the observations are appended to
    pub artifact: PathBuf,
    /// Compaction threshold in estimated tokens
    pub compaction_threshold_tokens: u64,
}

impl Project {
    pub fn new(
        root: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
        compaction_threshold_tokens: u64,
    ) -> Self {
        let root = root.into();
        Self {
            key: project_key(&root),
            root,
            log_dir: log_dir.into(),
            artifact: artifact.into(),
            compaction_threshold_tokens,
        }
    }

    /// Resolve a configured project against the Claude Code data directory.
    pub fn from_config(project: &ProjectConfig, config: &Config) -> Self {
        let log_dir = config
            .claude_root()
            .join("projects")
            .join(encode_project_dir(&project.root));
        let artifact = project
            .artifact
            .clone()
            .unwrap_or_else(|| default_artifact_path(&project.root));
        let threshold = project
            .compaction_threshold_tokens
            .unwrap_or(config.compaction.threshold_tokens);
        Self::new(project.root.clone(), log_dir, artifact, threshold)
    }

    /// Resolve every configured project.
    pub fn all_from_config(config: &Config) -> Vec<Self> {
        config
            .projects
            .iter()
            .map(|p| Self::from_config(p, config))
            .collect()
    }

    /// Advisory lock marker guarding the artifact.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .artifact
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.artifact.with_file_name(name)
    }

    /// True if `path` is a session log of this project.
    pub fn owns_log(&self, path: &Path) -> bool {
        path.parent() == Some(self.log_dir.as_path())
            && path.extension().is_some_and(|ext| ext == "jsonl")
    }
}

/// First 16 hex characters of the SHA-256 of the root path.
pub fn project_key(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Claude Code's directory name for a project root.
///
/// Every character that is not ASCII alphanumeric or `-` becomes `-`, so
/// `/home/me/my.app` is stored under `-home-me-my-app`.
pub fn encode_project_dir(root: &Path) -> String {
    root.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

pub fn default_artifact_path(root: &Path) -> PathBuf {
    root.join(".scribe").join("observations.md")
}
