//! `scribe watch`: catch-up, live file watching and periodic compaction

use crate::instance_lock::acquire_watch_guard;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use scribe_core::passes::{CommandCompaction, CommandExtraction};
use scribe_core::{Config, Pipeline, Project, Scheduler, SchedulerHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

type CommandPipeline = Pipeline<CommandExtraction, CommandCompaction>;

pub async fn run(config: &Config, pipeline: CommandPipeline, projects: Vec<Project>) -> Result<()> {
    if projects.is_empty() {
        anyhow::bail!(
            "no projects configured; add a [[projects]] entry to {}",
            Config::config_path().display()
        );
    }

    let _watch_guard = acquire_watch_guard(pipeline.cursors().dir())?;

    let pipeline = Arc::new(pipeline);
    let (scheduler, handle) = Scheduler::new(
        Arc::clone(&pipeline),
        projects.clone(),
        config.watch.debounce(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let shutdown = handle.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        shutdown.shutdown();
    })
    .context("failed to set Ctrl+C handler")?;

    for project in &projects {
        handle.catch_up(&project.key);
    }

    let _watcher = watch_log_dirs(&projects, handle.clone())?;

    let compaction_tasks: Vec<JoinHandle<()>> = projects
        .iter()
        .cloned()
        .map(|project| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(periodic_compaction(
                pipeline,
                project,
                config.watch.compaction_check(),
            ))
        })
        .collect();

    println!(
        "Watching {} project(s), quiet period {}s. Press Ctrl+C to stop.",
        projects.len(),
        config.watch.debounce_secs
    );
    for project in &projects {
        println!("  {} -> {}", project.root.display(), project.artifact.display());
    }

    scheduler_task.await.context("scheduler task failed")?;

    for task in compaction_tasks {
        task.abort();
    }
    tracing::info!("scribe watch stopped");
    Ok(())
}

/// Forward create/modify events for session logs to the scheduler.
fn watch_log_dirs(projects: &[Project], handle: SchedulerHandle) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in event.paths {
                if is_session_log(&path) && !handle.file_changed(path) {
                    tracing::debug!("Scheduler stopped, dropping file event");
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "File watcher error"),
    })
    .context("failed to create file watcher")?;

    for project in projects {
        std::fs::create_dir_all(&project.log_dir).with_context(|| {
            format!("failed to create log directory {}", project.log_dir.display())
        })?;
        watcher
            .watch(&project.log_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", project.log_dir.display()))?;
        tracing::info!(dir = %project.log_dir.display(), "Watching session logs");
    }

    Ok(watcher)
}

fn is_session_log(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Compaction check on a fixed interval, independent of processing cycles.
async fn periodic_compaction(pipeline: Arc<CommandPipeline>, project: Project, every: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match pipeline.compact_if_needed(&project).await {
            Ok(outcome) => {
                tracing::debug!(
                    project = %project.root.display(),
                    outcome = ?outcome,
                    "Periodic compaction check"
                );
            }
            Err(e) => {
                tracing::warn!(
                    project = %project.root.display(),
                    error = %e,
                    "Periodic compaction failed"
                );
            }
        }
    }
}
