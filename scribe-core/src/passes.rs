//! External language-model passes
//!
//! The core only knows the input/output contract of the two passes:
//!
//! - **Extraction**: rendered transcript in, either "nothing worth recording"
//!   or markdown to append verbatim out.
//! - **Compaction**: full artifact in, replacement artifact out.
//!
//! [`CommandPass`] implements both by running a configured program with the
//! prompt and payload on stdin and reading the answer from stdout, bounded by
//! a timeout. Tests substitute in-process implementations of the traits.

use crate::config::{CompactionConfig, ExtractionConfig};
use crate::error::{Error, Result};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Outcome of an extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The pass found nothing worth recording
    Nothing,
    /// Markdown to append to the artifact
    Observations(String),
}

/// Turns a rendered transcript into observations.
pub trait ExtractionPass: Send + Sync + 'static {
    fn extract(&self, transcript: &str) -> impl Future<Output = Result<Extraction>> + Send;
}

/// Rewrites the accumulated artifact into a shorter one.
pub trait CompactionPass: Send + Sync + 'static {
    fn compact(&self, artifact: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Runs an external program as a pass.
#[derive(Debug, Clone)]
pub struct CommandPass {
    name: &'static str,
    command: Vec<String>,
    prompt: String,
    timeout: Duration,
}

impl CommandPass {
    pub fn new(
        name: &'static str,
        command: Vec<String>,
        prompt: String,
        timeout: Duration,
    ) -> Self {
        Self {
            name,
            command,
            prompt,
            timeout,
        }
    }

    /// Send the prompt and `input` on stdin and return trimmed stdout.
    pub async fn run(&self, input: &str) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Config(format!("{} command is empty", self.name)))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("failed to start {}: {}", program, e)))?;

        let payload = format!("{}\n\n{}", self.prompt, input);
        if let Some(mut stdin) = child.stdin.take() {
            // Written concurrently so a chatty child cannot deadlock on a full stdout pipe.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!(error = %e, "Pass closed stdin early");
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::PassTimeout {
                pass: self.name.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(self.failure(format!("exited with {}: {}", output.status, first_line)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(self.failure("empty output".to_string()));
        }
        Ok(stdout)
    }

    fn failure(&self, message: String) -> Error {
        Error::Pass {
            pass: self.name.to_string(),
            message,
        }
    }
}

/// Extraction backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandExtraction {
    pass: CommandPass,
    sentinel: String,
}

impl CommandExtraction {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            pass: CommandPass::new(
                "extraction",
                config.command.clone(),
                config.prompt.clone(),
                Duration::from_secs(config.timeout_secs),
            ),
            sentinel: config.sentinel.clone(),
        }
    }
}

impl ExtractionPass for CommandExtraction {
    async fn extract(&self, transcript: &str) -> Result<Extraction> {
        let output = self.pass.run(transcript).await?;
        Ok(interpret_extraction(&output, &self.sentinel))
    }
}

/// Compaction backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandCompaction {
    pass: CommandPass,
}

impl CommandCompaction {
    pub fn from_config(config: &CompactionConfig) -> Self {
        Self {
            pass: CommandPass::new(
                "compaction",
                config.command.clone(),
                config.prompt.clone(),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }
}

impl CompactionPass for CommandCompaction {
    async fn compact(&self, artifact: &str) -> Result<String> {
        self.pass.run(artifact).await
    }
}

/// Map raw extraction output to an [`Extraction`].
///
/// The sentinel may be wrapped in backticks or followed by a period.
pub fn interpret_extraction(output: &str, sentinel: &str) -> Extraction {
    let trimmed = output.trim();
    let bare = trimmed.trim_matches(|c: char| c == '`' || c == '.' || c.is_whitespace());
    if trimmed.is_empty() || bare == sentinel {
        Extraction::Nothing
    } else {
        Extraction::Observations(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandPass {
        CommandPass::new(
            "test",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            "PROMPT".to_string(),
            timeout,
        )
    }

    #[test]
    fn test_interpret_extraction() {
        assert_eq!(interpret_extraction("NO_OBSERVATIONS", "NO_OBSERVATIONS"), Extraction::Nothing);
        assert_eq!(
            interpret_extraction("`NO_OBSERVATIONS`.\n", "NO_OBSERVATIONS"),
            Extraction::Nothing
        );
        assert_eq!(
            interpret_extraction("  - builds with nix\n", "NO_OBSERVATIONS"),
            Extraction::Observations("- builds with nix".to_string())
        );
    }

    #[tokio::test]
    async fn test_command_pass_reads_stdin() {
        let pass = sh("cat", Duration::from_secs(10));
        let out = pass.run("transcript").await.unwrap();
        assert_eq!(out, "PROMPT\n\ntranscript");
    }

    #[tokio::test]
    async fn test_command_pass_nonzero_exit() {
        let pass = sh("echo broken >&2; exit 3", Duration::from_secs(10));
        let err = pass.run("x").await.unwrap_err();
        assert!(matches!(err, Error::Pass { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_command_pass_empty_output() {
        let pass = sh("cat > /dev/null", Duration::from_secs(10));
        assert!(matches!(pass.run("x").await, Err(Error::Pass { .. })));
    }

    #[tokio::test]
    async fn test_command_pass_timeout() {
        let pass = sh("sleep 5", Duration::from_millis(100));
        assert!(matches!(pass.run("x").await, Err(Error::PassTimeout { .. })));
    }

    #[tokio::test]
    async fn test_command_pass_missing_program() {
        let pass = CommandPass::new(
            "test",
            vec!["/nonexistent/scribe-llm".to_string()],
            String::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(pass.run("x").await, Err(Error::Pass { .. })));
    }
}
