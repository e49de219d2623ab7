//! scribe - digest recorded Claude Code sessions into project observations
//!
//! Watches each registered project's session logs, renders new activity into
//! a compact transcript, asks an external model for durable observations and
//! appends them to the project's observation file.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Cursors: $XDG_DATA_HOME/scribe/cursors/ (~/.local/share/scribe/cursors/)
//! - Logs: $XDG_STATE_HOME/scribe/scribe.log (~/.local/state/scribe/scribe.log)
//! - Config: $XDG_CONFIG_HOME/scribe/config.toml (~/.config/scribe/config.toml)

mod instance_lock;
mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scribe_core::config::ProjectConfig;
use scribe_core::cursor::CursorStore;
use scribe_core::ingest::read_delta;
use scribe_core::passes::{CommandCompaction, CommandExtraction};
use scribe_core::pipeline::CompactionOutcome;
use scribe_core::render::render;
use scribe_core::{artifact, Config, Pipeline, Project};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Digest Claude Code sessions into project observations")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/scribe/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Catch up on recent sessions, then process new activity as it is logged
    Watch,

    /// Print the rendered transcript of a session log
    Render {
        /// Session log (*.jsonl)
        file: PathBuf,

        /// Byte offset to start from
        #[arg(long, default_value = "0")]
        from: u64,
    },

    /// Show per-project progress
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compact a project's observation file if it has grown past its threshold
    Compact {
        /// Project root
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard =
        scribe_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Watch => {
            tracing::info!("scribe watch starting");
            let projects = Project::all_from_config(&config);
            watch::run(&config, build_pipeline(&config), projects).await
        }
        Command::Render { file, from } => run_render(&config, &file, from),
        Command::Status { json } => run_status(&config, json),
        Command::Compact { root } => run_compact(&config, root).await,
    }
}

fn build_pipeline(config: &Config) -> Pipeline<CommandExtraction, CommandCompaction> {
    Pipeline::new(
        CursorStore::new(Config::cursor_dir()),
        CommandExtraction::from_config(&config.extraction),
        CommandCompaction::from_config(&config.compaction),
        config,
    )
}

fn run_render(config: &Config, file: &Path, from: u64) -> Result<()> {
    let segment =
        read_delta(file, from).with_context(|| format!("failed to read {}", file.display()))?;

    let transcript = render(&segment.entries, &config.render);
    if !transcript.is_empty() {
        println!("{}", transcript);
    }

    if segment.skipped_lines > 0 {
        eprintln!("({} undecodable line(s) skipped)", segment.skipped_lines);
    }
    tracing::debug!(
        file = %file.display(),
        from,
        to = segment.new_offset,
        entries = segment.entries.len(),
        "Rendered log"
    );
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatus {
    root: PathBuf,
    artifact: PathBuf,
    estimated_tokens: u64,
    threshold_tokens: u64,
    files: usize,
    observations: u64,
    extraction_passes: u64,
    compaction_passes: u64,
    last_compaction: Option<String>,
}

fn run_status(config: &Config, json: bool) -> Result<()> {
    let store = CursorStore::new(Config::cursor_dir());
    let mut statuses = Vec::new();

    for project in Project::all_from_config(config) {
        let cursors = store
            .load(&project.root)
            .with_context(|| format!("failed to load cursors for {}", project.root.display()))?;
        statuses.push(ProjectStatus {
            estimated_tokens: artifact::estimated_tokens(&project.artifact),
            threshold_tokens: project.compaction_threshold_tokens,
            files: cursors.files.len(),
            observations: cursors.total_observations(),
            extraction_passes: cursors.total_extraction_passes,
            compaction_passes: cursors.total_compaction_passes,
            last_compaction: cursors.last_compaction.map(|t| t.to_rfc3339()),
            root: project.root,
            artifact: project.artifact,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No projects configured ({})", Config::config_path().display());
        return Ok(());
    }

    for status in &statuses {
        println!("{}", status.root.display());
        println!("  Artifact:      {}", status.artifact.display());
        println!(
            "  Size:          ~{} / {} tokens",
            status.estimated_tokens, status.threshold_tokens
        );
        println!("  Logs tracked:  {}", status.files);
        println!("  Observations:  {}", status.observations);
        println!(
            "  Passes:        {} extraction, {} compaction",
            status.extraction_passes, status.compaction_passes
        );
        if let Some(last) = &status.last_compaction {
            let local = chrono::DateTime::parse_from_rfc3339(last)
                .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|_| last.clone());
            println!("  Last compacted: {}", local);
        }
    }
    Ok(())
}

async fn run_compact(config: &Config, root: PathBuf) -> Result<()> {
    let project = Project::all_from_config(config)
        .into_iter()
        .find(|p| p.root == root)
        .unwrap_or_else(|| {
            let adhoc = ProjectConfig {
                root,
                artifact: None,
                compaction_threshold_tokens: None,
            };
            Project::from_config(&adhoc, config)
        });

    let outcome = build_pipeline(config)
        .compact_if_needed(&project)
        .await
        .with_context(|| format!("failed to compact {}", project.artifact.display()))?;

    match outcome {
        CompactionOutcome::BelowThreshold => println!(
            "{}: below threshold (~{} / {} tokens), nothing to do",
            project.artifact.display(),
            artifact::estimated_tokens(&project.artifact),
            project.compaction_threshold_tokens
        ),
        CompactionOutcome::Locked => println!(
            "{}: locked by another compaction, try again later",
            project.artifact.display()
        ),
        CompactionOutcome::Failed => println!(
            "{}: compaction pass failed, original kept",
            project.artifact.display()
        ),
        CompactionOutcome::Compacted {
            before_tokens,
            after_tokens,
        } => println!(
            "{}: compacted ~{} -> ~{} tokens",
            project.artifact.display(),
            before_tokens,
            after_tokens
        ),
    }
    Ok(())
}
