//! One processing cycle: log delta → transcript → observations → artifact
//!
//! ```text
//! load offset ─► read_delta ─► render ─► extraction pass ─► wait for lock
//!                                                              │
//!         compact_if_needed ◄── advance cursor ◄── append section
//! ```
//!
//! The offset is read before the delta is computed and only moved once the
//! cycle has decided the delta's fate. Every outcome except
//! [`CycleOutcome::Accumulating`] and [`CycleOutcome::Contended`] consumes the
//! delta; those two leave it for the next cycle. A short delta stops
//! accumulating once its file has been idle for the stale-tail window.
//!
//! The appender holds the artifact lock for the append itself, so a
//! compaction can never read the artifact before a section lands and write
//! it back without one.
//!
//! External passes are serialized across the whole process through one gate,
//! so concurrent projects queue for the model instead of running side by side.

use crate::artifact;
use crate::config::{Config, LockConfig, RenderConfig};
use crate::cursor::CursorStore;
use crate::error::Result;
use crate::ingest::{discover_logs, log_file_name, read_delta, LogFile};
use crate::lock;
use crate::passes::{CompactionPass, Extraction, ExtractionPass};
use crate::project::Project;
use crate::render::render;
use crate::scheduler::CycleRunner;
use chrono::Utc;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// What a processing cycle did with a file's delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new since the stored offset
    UpToDate,
    /// The log file or the project root disappeared
    Gone,
    /// Too little new content in a live log; left for a later cycle
    Accumulating,
    /// Consumed without recording anything
    Discarded,
    /// Observations appended to the artifact
    Recorded { observations: u64 },
    /// The artifact stayed locked; the delta is retried next cycle
    Contended,
}

/// Result of a compaction check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    BelowThreshold,
    /// Another compaction holds the artifact lock
    Locked,
    /// The pass failed or returned unusable output; the original was kept
    Failed,
    Compacted { before_tokens: u64, after_tokens: u64 },
}

/// Drives processing cycles and compaction for every project.
pub struct Pipeline<E, C> {
    cursors: CursorStore,
    extractor: E,
    compactor: C,
    render: RenderConfig,
    lock: LockConfig,
    min_compacted_chars: usize,
    catch_up_files: usize,
    stale_tail: Duration,
    pass_gate: Mutex<()>,
}

impl<E: ExtractionPass, C: CompactionPass> Pipeline<E, C> {
    pub fn new(cursors: CursorStore, extractor: E, compactor: C, config: &Config) -> Self {
        Self {
            cursors,
            extractor,
            compactor,
            render: config.render.clone(),
            lock: config.lock.clone(),
            min_compacted_chars: config.compaction.min_output_chars,
            catch_up_files: config.watch.catch_up_files,
            stale_tail: config.watch.stale_tail(),
            pass_gate: Mutex::new(()),
        }
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Run one cycle over the unread part of `file`.
    pub async fn process_file(&self, project: &Project, file: &Path) -> Result<CycleOutcome> {
        if !project.root.exists() {
            return Ok(CycleOutcome::Gone);
        }

        let name = log_file_name(file);
        let offset = self.cursors.load(&project.root)?.get_offset(&name);

        let segment = match read_delta(file, offset) {
            Ok(segment) => segment,
            Err(e) if e.is_not_found() => return Ok(CycleOutcome::Gone),
            Err(e) => return Err(e),
        };
        if segment.is_empty() {
            return Ok(CycleOutcome::UpToDate);
        }

        let transcript = render(&segment.entries, &self.render);
        if transcript.trim().is_empty() {
            self.advance(project, &name, segment.new_offset, 0, false)?;
            return Ok(CycleOutcome::Discarded);
        }
        if transcript.chars().count() < self.render.min_render_chars {
            if !self.is_stale(file) {
                return Ok(CycleOutcome::Accumulating);
            }
            tracing::debug!(file = %name, "Consuming short tail of an idle log");
            self.advance(project, &name, segment.new_offset, 0, false)?;
            return Ok(CycleOutcome::Discarded);
        }

        tracing::debug!(
            file = %name,
            from = segment.from_offset,
            to = segment.new_offset,
            entries = segment.entries.len(),
            chars = transcript.len(),
            "Running extraction pass"
        );

        let extraction = {
            let _gate = self.pass_gate.lock().await;
            self.extractor.extract(&transcript).await
        };

        let body = match extraction {
            Ok(Extraction::Observations(body)) => body,
            Ok(Extraction::Nothing) => {
                self.advance(project, &name, segment.new_offset, 0, true)?;
                return Ok(CycleOutcome::Discarded);
            }
            Err(e) => {
                tracing::warn!(
                    file = %name,
                    error = %e,
                    "Extraction pass failed, discarding delta"
                );
                self.advance(project, &name, segment.new_offset, 0, true)?;
                return Ok(CycleOutcome::Discarded);
            }
        };

        if !project.root.exists() {
            return Ok(CycleOutcome::Gone);
        }
        let guard = lock::acquire_with_retry(&project.lock_path(), "appender", &self.lock).await?;
        let Some(guard) = guard else {
            self.cursors
                .update(&project.root, |c| c.record_extraction_pass())?;
            return Ok(CycleOutcome::Contended);
        };

        artifact::append_section(&project.artifact, &body)?;
        drop(guard);

        let observations = artifact::count_observations(&body);
        self.advance(project, &name, segment.new_offset, observations, true)?;

        match self.compact_if_needed(project).await {
            Ok(CompactionOutcome::Compacted {
                before_tokens,
                after_tokens,
            }) => {
                tracing::info!(
                    project = %project.root.display(),
                    before_tokens,
                    after_tokens,
                    "Compacted artifact"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    project = %project.root.display(),
                    error = %e,
                    "Compaction failed"
                );
            }
        }

        Ok(CycleOutcome::Recorded { observations })
    }

    /// Whether `file` has gone untouched for the stale-tail window.
    fn is_stale(&self, file: &Path) -> bool {
        std::fs::metadata(file)
            .and_then(|m| m.modified())
            .map(|modified| is_idle_since(modified, self.stale_tail))
            .unwrap_or(false)
    }

    fn advance(
        &self,
        project: &Project,
        file: &str,
        new_offset: u64,
        observations: u64,
        ran_pass: bool,
    ) -> Result<()> {
        self.cursors.update(&project.root, |c| {
            c.set_offset(file, new_offset, observations);
            if ran_pass {
                c.record_extraction_pass();
            }
        })?;
        Ok(())
    }

    /// Rewrite the artifact through the compaction pass if it has grown past
    /// the project's threshold.
    ///
    /// The lock marker exists for exactly the duration of the attempt.
    pub async fn compact_if_needed(&self, project: &Project) -> Result<CompactionOutcome> {
        let before_tokens = artifact::estimated_tokens(&project.artifact);
        if before_tokens <= project.compaction_threshold_tokens {
            return Ok(CompactionOutcome::BelowThreshold);
        }

        let Some(_guard) = lock::try_acquire(&project.lock_path(), "compactor")? else {
            tracing::debug!(
                project = %project.root.display(),
                "Artifact already locked, skipping compaction"
            );
            return Ok(CompactionOutcome::Locked);
        };

        let original = std::fs::read_to_string(&project.artifact)?;
        let compacted = {
            let _gate = self.pass_gate.lock().await;
            self.compactor.compact(&original).await
        };

        let compacted = match compacted {
            Ok(text) if text.trim().chars().count() >= self.min_compacted_chars => text,
            Ok(text) => {
                tracing::warn!(
                    project = %project.root.display(),
                    chars = text.trim().chars().count(),
                    min = self.min_compacted_chars,
                    "Compaction output too short, keeping original"
                );
                return Ok(CompactionOutcome::Failed);
            }
            Err(e) => {
                tracing::warn!(
                    project = %project.root.display(),
                    error = %e,
                    "Compaction pass failed"
                );
                return Ok(CompactionOutcome::Failed);
            }
        };

        artifact::replace(&project.artifact, &format!("{}\n", compacted.trim_end()))?;
        let after_tokens = artifact::estimated_tokens(&project.artifact);
        self.cursors
            .update(&project.root, |c| c.record_compaction(Utc::now()))?;

        Ok(CompactionOutcome::Compacted {
            before_tokens,
            after_tokens,
        })
    }

    /// Unread logs picked for the startup catch-up, oldest first.
    ///
    /// Selection takes the most recently modified files that still have
    /// unread bytes, up to the configured cap.
    pub fn catch_up_candidates(&self, project: &Project) -> Result<Vec<LogFile>> {
        let cursors = self.cursors.load(&project.root)?;
        let mut files: Vec<LogFile> = discover_logs(&project.log_dir)?
            .into_iter()
            .filter(|f| f.size_bytes > cursors.get_offset(&f.name()))
            .take(self.catch_up_files)
            .collect();
        files.reverse();
        Ok(files)
    }

    /// Consume the short unread tails of idle logs without running a pass.
    ///
    /// A finished session often ends in a one-word reply that never reaches
    /// the render minimum; left alone it would stay unread and take a
    /// catch-up slot on every start. Returns how many tails were consumed.
    pub fn settle_stale_tails(&self, project: &Project) -> Result<usize> {
        let cursors = self.cursors.load(&project.root)?;
        let mut settled = 0;

        for file in discover_logs(&project.log_dir)? {
            let name = file.name();
            let offset = cursors.get_offset(&name);
            if file.size_bytes <= offset || !is_idle_since(file.modified_at, self.stale_tail) {
                continue;
            }

            let segment = match read_delta(&file.path, offset) {
                Ok(segment) => segment,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let transcript = render(&segment.entries, &self.render);
            if transcript.chars().count() < self.render.min_render_chars {
                self.advance(project, &name, segment.new_offset, 0, false)?;
                settled += 1;
            }
        }

        if settled > 0 {
            tracing::debug!(
                project = %project.root.display(),
                settled,
                "Consumed short tails of idle logs"
            );
        }
        Ok(settled)
    }

    /// Process every catch-up candidate in turn. Returns how many files were
    /// processed.
    pub async fn run_catch_up(&self, project: &Project) -> Result<usize> {
        self.settle_stale_tails(project)?;
        let files = self.catch_up_candidates(project)?;
        tracing::info!(
            project = %project.root.display(),
            files = files.len(),
            "Starting catch-up"
        );

        for file in &files {
            match self.process_file(project, &file.path).await {
                Ok(outcome) => log_outcome(project, &file.path, &outcome),
                Err(e) => {
                    tracing::warn!(
                        file = %file.path.display(),
                        error = %e,
                        "Catch-up cycle failed"
                    );
                }
            }
        }
        Ok(files.len())
    }
}

impl<E: ExtractionPass, C: CompactionPass> CycleRunner for Pipeline<E, C> {
    async fn run_cycle(&self, project: &Project, file: &Path) {
        match self.process_file(project, file).await {
            Ok(outcome) => log_outcome(project, file, &outcome),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Processing cycle failed");
            }
        }
    }

    async fn catch_up(&self, project: &Project) {
        if let Err(e) = self.run_catch_up(project).await {
            tracing::warn!(project = %project.root.display(), error = %e, "Catch-up failed");
        }
    }
}

fn is_idle_since(modified: SystemTime, window: Duration) -> bool {
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= window)
        .unwrap_or(false)
}

fn log_outcome(project: &Project, file: &Path, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Recorded { observations } => {
            tracing::info!(
                project = %project.root.display(),
                file = %file.display(),
                observations,
                "Recorded observations"
            );
        }
        CycleOutcome::Contended => {
            tracing::warn!(
                project = %project.root.display(),
                file = %file.display(),
                "Artifact stayed locked, append skipped"
            );
        }
        other => {
            tracing::debug!(file = %file.display(), outcome = ?other, "Cycle finished");
        }
    }
}
