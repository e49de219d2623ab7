//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/scribe/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/scribe/` (~/.config/scribe/)
//! - Data: `$XDG_DATA_HOME/scribe/` (~/.local/share/scribe/)
//! - State/Logs: `$XDG_STATE_HOME/scribe/` (~/.local/state/scribe/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Override for the Claude Code data directory (default ~/.claude)
    #[serde(default)]
    pub claude_root: Option<PathBuf>,

    /// Registered projects
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    /// Scheduling configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Artifact lock retry policy
    #[serde(default)]
    pub lock: LockConfig,

    /// Transcript rendering budgets
    #[serde(default)]
    pub render: RenderConfig,

    /// Extraction pass command
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Compaction pass command and thresholds
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A project whose sessions are digested
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    /// Project root directory
    pub root: PathBuf,
    /// Artifact override (default `<root>/.scribe/observations.md`)
    pub artifact: Option<PathBuf>,
    /// Compaction threshold override, in estimated tokens
    pub compaction_threshold_tokens: Option<u64>,
}

/// Debounce and background scheduling
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Quiet period after the last change before a file is processed
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Maximum number of files processed by the startup catch-up
    #[serde(default = "default_catch_up_files")]
    pub catch_up_files: usize,

    /// Interval of the periodic compaction check
    #[serde(default = "default_compaction_check_secs")]
    pub compaction_check_secs: u64,

    /// A short unread tail untouched for this long is consumed without a pass
    #[serde(default = "default_stale_tail_secs")]
    pub stale_tail_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            catch_up_files: default_catch_up_files(),
            compaction_check_secs: default_compaction_check_secs(),
            stale_tail_secs: default_stale_tail_secs(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn compaction_check(&self) -> Duration {
        Duration::from_secs(self.compaction_check_secs)
    }

    pub fn stale_tail(&self) -> Duration {
        Duration::from_secs(self.stale_tail_secs)
    }
}

fn default_debounce_secs() -> u64 {
    120
}

fn default_catch_up_files() -> usize {
    5
}

fn default_compaction_check_secs() -> u64 {
    900
}

fn default_stale_tail_secs() -> u64 {
    1800
}

/// How long the appender waits on a held artifact lock
#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl LockConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    30
}

/// Character budgets for the rendered transcript
#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// User and assistant text
    #[serde(default = "default_text_budget")]
    pub text_budget: usize,

    /// Successful tool results
    #[serde(default = "default_tool_result_budget")]
    pub tool_result_budget: usize,

    /// Tool input summaries
    #[serde(default = "default_input_budget")]
    pub input_budget: usize,

    /// Unclassified error briefs
    #[serde(default = "default_error_budget")]
    pub error_budget: usize,

    /// Rendered deltas shorter than this wait for more content
    #[serde(default = "default_min_render_chars")]
    pub min_render_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            text_budget: default_text_budget(),
            tool_result_budget: default_tool_result_budget(),
            input_budget: default_input_budget(),
            error_budget: default_error_budget(),
            min_render_chars: default_min_render_chars(),
        }
    }
}

fn default_text_budget() -> usize {
    2000
}

fn default_tool_result_budget() -> usize {
    500
}

fn default_input_budget() -> usize {
    200
}

fn default_error_budget() -> usize {
    160
}

fn default_min_render_chars() -> usize {
    80
}

/// External extraction pass
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Program and arguments; the prompt is written to stdin
    #[serde(default = "default_pass_command")]
    pub command: Vec<String>,

    /// Instructions prepended to the rendered transcript
    #[serde(default = "default_extraction_prompt")]
    pub prompt: String,

    /// Output meaning "nothing worth recording"
    #[serde(default = "default_sentinel")]
    pub sentinel: String,

    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            command: default_pass_command(),
            prompt: default_extraction_prompt(),
            sentinel: default_sentinel(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

/// External compaction pass
#[derive(Debug, Deserialize, Clone)]
pub struct CompactionConfig {
    #[serde(default = "default_pass_command")]
    pub command: Vec<String>,

    #[serde(default = "default_compaction_prompt")]
    pub prompt: String,

    #[serde(default = "default_compaction_timeout")]
    pub timeout_secs: u64,

    /// Default threshold in estimated tokens
    #[serde(default = "default_threshold_tokens")]
    pub threshold_tokens: u64,

    /// Outputs shorter than this are treated as failures
    #[serde(default = "default_min_output_chars")]
    pub min_output_chars: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            command: default_pass_command(),
            prompt: default_compaction_prompt(),
            timeout_secs: default_compaction_timeout(),
            threshold_tokens: default_threshold_tokens(),
            min_output_chars: default_min_output_chars(),
        }
    }
}

fn default_pass_command() -> Vec<String> {
    vec!["claude".to_string(), "-p".to_string()]
}

fn default_extraction_prompt() -> String {
    "Below is a transcript excerpt from a coding session. Record durable, \
     project-specific observations as markdown bullet points. If nothing is \
     worth recording, reply with exactly NO_OBSERVATIONS."
        .to_string()
}

fn default_compaction_prompt() -> String {
    "Below is a markdown file of accumulated project observations. Merge \
     duplicates, drop stale entries, and return the complete rewritten file."
        .to_string()
}

fn default_sentinel() -> String {
    "NO_OBSERVATIONS".to_string()
}

fn default_extraction_timeout() -> u64 {
    180
}

fn default_compaction_timeout() -> u64 {
    300
}

fn default_threshold_tokens() -> u64 {
    12_000
}

fn default_min_output_chars() -> usize {
    200
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate values that would otherwise fail at the first cycle
    pub fn validate(&self) -> Result<()> {
        if self.extraction.command.is_empty() {
            return Err(Error::Config("extraction.command must not be empty".to_string()));
        }
        if self.compaction.command.is_empty() {
            return Err(Error::Config("compaction.command must not be empty".to_string()));
        }
        if self.watch.catch_up_files == 0 {
            return Err(Error::Config("watch.catch_up_files must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Claude Code data directory
    pub fn claude_root(&self) -> PathBuf {
        self.claude_root
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/scribe/config.toml` (~/.config/scribe/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("scribe").join("config.toml")
    }

    /// Returns the data directory path (for cursor files)
    ///
    /// `$XDG_DATA_HOME/scribe/` (~/.local/share/scribe/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("scribe")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/scribe/` (~/.local/state/scribe/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("scribe")
    }

    /// Returns the cursor directory path
    ///
    /// `$XDG_DATA_HOME/scribe/cursors/`
    pub fn cursor_dir() -> PathBuf {
        Self::data_dir().join("cursors")
    }
}
