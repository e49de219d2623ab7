//! Debounced, single-flight scheduling of processing cycles
//!
//! The [`Scheduler`] is an actor: one task owns every timer and in-flight
//! slot and mutates them only in response to messages, so none of that state
//! needs a lock.
//!
//! ```text
//! file_changed(path) ─► arm timer(path) ─ quiet period ─► Fire(path)
//!                          ▲ re-arming aborts the previous timer      │
//!                                                                     ▼
//!                          project slot busy? ── yes ──► drop trigger
//!                                   │ no
//!                                   ▼
//!                      spawn run_cycle ── on drop ──► Released(project)
//! ```
//!
//! Dropped triggers are not queued: the next change to the file arms a fresh
//! timer. Cycles of different projects run concurrently. A cycle that panics
//! still releases its slot and does not stop the scheduler.

use crate::project::Project;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Work the scheduler drives. Implemented by [`crate::Pipeline`].
pub trait CycleRunner: Send + Sync + 'static {
    /// Process the unread part of one log file.
    fn run_cycle(&self, project: &Project, file: &Path) -> impl Future<Output = ()> + Send;

    /// Process the project's most recently modified unread logs.
    fn catch_up(&self, project: &Project) -> impl Future<Output = ()> + Send;
}

#[derive(Debug)]
enum Message {
    Changed(PathBuf),
    Fire { path: PathBuf, generation: u64 },
    CatchUp(String),
    Released(String),
    Shutdown,
}

/// Cloneable handle used to feed the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl SchedulerHandle {
    /// Report a change to a log file. Returns `false` once the scheduler stopped.
    pub fn file_changed(&self, path: impl Into<PathBuf>) -> bool {
        self.tx.send(Message::Changed(path.into())).is_ok()
    }

    /// Run the startup catch-up for a project.
    pub fn catch_up(&self, project_key: &str) -> bool {
        self.tx.send(Message::CatchUp(project_key.to_string())).is_ok()
    }

    /// Stop scheduling. Pending timers are cancelled; running cycles finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Releases a project's single-flight slot when dropped.
struct SlotRelease {
    tx: mpsc::UnboundedSender<Message>,
    project_key: String,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let _ = self
            .tx
            .send(Message::Released(std::mem::take(&mut self.project_key)));
    }
}

/// Per-file debounce timers and per-project single-flight slots.
pub struct Scheduler<R: CycleRunner> {
    runner: Arc<R>,
    projects: Vec<Arc<Project>>,
    quiet: Duration,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Weak so the scheduler stops once every handle, timer and slot is gone
    tx: mpsc::WeakUnboundedSender<Message>,
    timers: HashMap<PathBuf, (u64, JoinHandle<()>)>,
    next_generation: u64,
    in_flight: HashSet<String>,
    cycles: JoinSet<()>,
}

impl<R: CycleRunner> Scheduler<R> {
    pub fn new(runner: Arc<R>, projects: Vec<Project>, quiet: Duration) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            runner,
            projects: projects.into_iter().map(Arc::new).collect(),
            quiet,
            rx,
            tx: tx.downgrade(),
            timers: HashMap::new(),
            next_generation: 0,
            in_flight: HashSet::new(),
            cycles: JoinSet::new(),
        };
        (scheduler, SchedulerHandle { tx })
    }

    /// Process messages until shutdown, then wait for running cycles.
    pub async fn run(mut self) {
        tracing::info!(
            projects = self.projects.len(),
            quiet_secs = self.quiet.as_secs_f64(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        None | Some(Message::Shutdown) => break,
                        Some(msg) => self.handle(msg),
                    }
                }
                Some(joined) = self.cycles.join_next(), if !self.cycles.is_empty() => {
                    log_join(joined);
                }
            }
        }

        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
        while let Some(joined) = self.cycles.join_next().await {
            log_join(joined);
        }
        tracing::info!("Scheduler stopped");
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Changed(path) => self.arm(path),
            Message::Fire { path, generation } => self.fire(path, generation),
            Message::CatchUp(key) => self.start_catch_up(&key),
            Message::Released(key) => {
                self.in_flight.remove(&key);
            }
            Message::Shutdown => {}
        }
    }

    fn project_for(&self, path: &Path) -> Option<Arc<Project>> {
        self.projects.iter().find(|p| p.owns_log(path)).cloned()
    }

    /// (Re)start the quiet-period timer for `path`.
    fn arm(&mut self, path: PathBuf) {
        if self.project_for(&path).is_none() {
            tracing::trace!(path = %path.display(), "Ignoring change outside registered projects");
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        if let Some((_, previous)) = self.timers.remove(&path) {
            previous.abort();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let quiet = self.quiet;
        let fire_path = path.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = tx.send(Message::Fire {
                path: fire_path,
                generation,
            });
        });
        self.timers.insert(path, (generation, timer));
    }

    fn fire(&mut self, path: PathBuf, generation: u64) {
        // A Fire from a timer that was re-armed after it sent is stale.
        match self.timers.get(&path) {
            Some((current, _)) if *current == generation => {
                self.timers.remove(&path);
            }
            _ => return,
        }

        let Some(project) = self.project_for(&path) else {
            return;
        };
        let Some(release) = self.claim_slot(&project) else {
            tracing::debug!(
                project = %project.root.display(),
                file = %path.display(),
                "Cycle already running for project, dropping trigger"
            );
            return;
        };

        let runner = Arc::clone(&self.runner);
        self.cycles.spawn(async move {
            let _release = release;
            runner.run_cycle(&project, &path).await;
        });
    }

    fn start_catch_up(&mut self, key: &str) {
        let Some(project) = self.projects.iter().find(|p| p.key == key).cloned() else {
            tracing::warn!(project_key = key, "Catch-up requested for unknown project");
            return;
        };
        let Some(release) = self.claim_slot(&project) else {
            tracing::debug!(project = %project.root.display(), "Project busy, skipping catch-up");
            return;
        };

        let runner = Arc::clone(&self.runner);
        self.cycles.spawn(async move {
            let _release = release;
            runner.catch_up(&project).await;
        });
    }

    /// Take the project's slot, or `None` if a cycle already holds it.
    fn claim_slot(&mut self, project: &Project) -> Option<SlotRelease> {
        let tx = self.tx.upgrade()?;
        if !self.in_flight.insert(project.key.clone()) {
            return None;
        }
        Some(SlotRelease {
            tx,
            project_key: project.key.clone(),
        })
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Processing cycle panicked");
        }
    }
}
