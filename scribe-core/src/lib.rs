//! # scribe-core
//!
//! Core library for scribe - an incremental digester for recorded Claude Code
//! sessions.
//!
//! This library provides:
//! - Domain types for log entries, retry chains and cursors
//! - Incremental delta extraction from append-only JSONL logs
//! - A renderer that compresses sessions into a line-oriented transcript,
//!   collapsing repeated failed tool attempts into retry chains
//! - Flat-file cursor storage and an advisory lock for the observation artifact
//! - A debounced, single-flight scheduler that drives processing cycles
//!
//! ## Architecture
//!
//! ```text
//! file change ─► Scheduler (debounce, single-flight) ─► Pipeline
//!                                                        │
//!     CursorStore ◄── offset ── read_delta ── render ──► ExtractionPass
//!                                                        │
//!                          artifact lock ◄── append / compact ──► artifact.md
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use scribe_core::ingest::read_delta;
//! use scribe_core::render::{render, RenderConfig};
//! use std::path::Path;
//!
//! let segment = read_delta(Path::new("session.jsonl"), 0).expect("failed to read log");
//! println!("{}", render(&segment.entries, &RenderConfig::default()));
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{CycleOutcome, Pipeline};
pub use project::Project;
pub use scheduler::{CycleRunner, Scheduler, SchedulerHandle};
pub use types::*;

// Public modules
pub mod artifact;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod logging;
pub mod passes;
pub mod pipeline;
pub mod project;
pub mod render;
pub mod scheduler;
pub mod types;
