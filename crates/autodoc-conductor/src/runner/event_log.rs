//! Structured event logging for workflow runs.
//!
//! Writes append-only JSONL to `{output}/.autodoc/events.jsonl`, plus a
//! small `run-status.json` external tools can poll.

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::graph::stage::StageId;
use crate::state::machine::{RunTracker, StageStatus};

// ── Event types ──

/// A run event. Serialized as tagged JSON (`"type": "run_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStart {
        repo: String,
        stage_count: usize,
    },
    StageStart {
        stage: StageId,
    },
    StageDone {
        stage: StageId,
        duration_ms: u64,
        warnings: usize,
        errors: usize,
    },
    StageFailed {
        stage: StageId,
        duration_ms: u64,
        error: String,
    },
    RunCompleted {
        success: bool,
        build_location: Option<String>,
    },
    RunFatal {
        stage: Option<StageId>,
        error: String,
    },
}

/// Wrapper that adds sequence number, timestamp and run id to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    pub run_id: String,
    #[serde(flatten)]
    pub event: Event,
}

// ── EventLogger ──

/// Append-only JSONL event writer.
pub struct EventLogger {
    jsonl_path: PathBuf,
    run_id: String,
    seq: u32,
}

impl EventLogger {
    pub fn new(output_dir: &Path, run_id: &str) -> Self {
        Self {
            jsonl_path: autodoc_store::events_path(output_dir),
            run_id: run_id.to_string(),
            seq: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.jsonl_path
    }

    /// Record an event. Best-effort: silently ignores write failures.
    pub fn record(&mut self, event: Event) {
        let full = FullEvent {
            seq: self.seq,
            ts: autodoc_core::now_rfc3339(),
            run_id: self.run_id.clone(),
            event,
        };
        self.seq += 1;

        if let Ok(line) = serde_json::to_string(&full) {
            let _ = append_line(&self.jsonl_path, &line);
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

// ── RunStatus ──

#[derive(Debug, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub repo: String,
    pub status: String,
    pub current_stage: Option<StageId>,
    pub completed: Vec<StageId>,
    pub failed: Vec<StageId>,
    pub updated_at: String,
}

/// Derive the run status from the tracker and write it to disk.
pub fn write_run_status(output_dir: &Path, repo: &str, tracker: &RunTracker) {
    let status = RunStatus {
        run_id: tracker.run_id.clone(),
        repo: repo.to_string(),
        status: tracker.status_label().to_string(),
        current_stage: tracker.current_stage(),
        completed: tracker.with_status(StageStatus::Completed),
        failed: tracker.with_status(StageStatus::Failed),
        updated_at: autodoc_core::now_rfc3339(),
    };
    if let Ok(data) = serde_json::to_string_pretty(&status) {
        let _ = autodoc_store::write_atomic(&autodoc_store::status_path(output_dir), data.as_bytes());
    }
}
