use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::graph::stage::StageId;

// ── Status enums ──

/// Where a run is. Strictly forward: no retries, no loops, no skipping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "stage", rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Stage(StageId),
    Done,
    FatalError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

// ── Tracker ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    pub id: StageId,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run-level bookkeeping alongside the [`WorkflowState`](autodoc_core::WorkflowState).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTracker {
    pub run_id: String,
    pub phase: RunPhase,
    pub stages: Vec<StageEntry>,
    #[serde(default)]
    pub version: u32,
}

impl RunTracker {
    pub fn new(run_id: &str, order: &[StageId]) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase: RunPhase::NotStarted,
            stages: order
                .iter()
                .map(|id| StageEntry {
                    id: *id,
                    status: StageStatus::Pending,
                    started_at: None,
                    completed_at: None,
                    error: None,
                })
                .collect(),
            version: 0,
        }
    }

    /// The run phase allowed to follow the current one (besides `FatalError`).
    fn next_phase(&self) -> Option<RunPhase> {
        let order: Vec<StageId> = self.stages.iter().map(|s| s.id).collect();
        match self.phase {
            RunPhase::NotStarted => Some(order.first().map_or(RunPhase::Done, |s| RunPhase::Stage(*s))),
            RunPhase::Stage(current) => {
                let pos = order.iter().position(|s| *s == current)?;
                Some(order.get(pos + 1).map_or(RunPhase::Done, |s| RunPhase::Stage(*s)))
            }
            RunPhase::Done | RunPhase::FatalError => None,
        }
    }

    /// Move the run from `from` to `to`.
    /// Returns Ok(true) on success, Ok(false) on CAS miss (current != from).
    pub fn transition(&mut self, from: RunPhase, to: RunPhase) -> Result<bool> {
        if self.phase != from {
            return Ok(false); // CAS miss
        }
        let valid = match to {
            RunPhase::FatalError => !matches!(from, RunPhase::Done | RunPhase::FatalError),
            _ => self.next_phase() == Some(to),
        };
        if !valid {
            bail!("invalid run transition: {from:?} → {to:?}");
        }
        if let RunPhase::Stage(id) = to {
            let entry = self.entry_mut(id)?;
            entry.status = StageStatus::Running;
            entry.started_at = Some(autodoc_core::now_rfc3339());
        }
        self.phase = to;
        self.version += 1;
        Ok(true)
    }

    /// Advance to the next phase from wherever the run is.
    pub fn advance(&mut self) -> Result<RunPhase> {
        let Some(next) = self.next_phase() else {
            bail!("run already finished ({:?})", self.phase);
        };
        self.transition(self.phase, next)?;
        Ok(next)
    }

    /// Record the outcome of the running stage.
    pub fn finish_stage(&mut self, id: StageId, error: Option<String>) -> Result<()> {
        if self.phase != RunPhase::Stage(id) {
            bail!("stage {id} is not running (run is {:?})", self.phase);
        }
        let entry = self.entry_mut(id)?;
        entry.status = if error.is_some() {
            StageStatus::Failed
        } else {
            StageStatus::Completed
        };
        entry.completed_at = Some(autodoc_core::now_rfc3339());
        entry.error = error;
        self.version += 1;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<bool> {
        self.transition(self.phase, RunPhase::FatalError)
    }

    pub fn current_stage(&self) -> Option<StageId> {
        match self.phase {
            RunPhase::Stage(id) => Some(id),
            _ => None,
        }
    }

    pub fn with_status(&self, status: StageStatus) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.id)
            .collect()
    }

    pub fn status_label(&self) -> &'static str {
        match self.phase {
            RunPhase::NotStarted => "not_started",
            RunPhase::Stage(_) => "running",
            RunPhase::Done => "done",
            RunPhase::FatalError => "fatal_error",
        }
    }

    fn entry_mut(&mut self, id: StageId) -> Result<&mut StageEntry> {
        self.stages
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("stage not in run: {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RunTracker {
        RunTracker::new("01TEST", &[StageId::RepoCloner, StageId::CodeAnalysis])
    }

    #[test]
    fn new_tracker_is_not_started() {
        let t = tracker();
        assert_eq!(t.phase, RunPhase::NotStarted);
        assert_eq!(t.with_status(StageStatus::Pending).len(), 2);
        assert_eq!(t.version, 0);
    }

    #[test]
    fn advance_walks_forward_to_done() {
        let mut t = tracker();
        assert_eq!(t.advance().unwrap(), RunPhase::Stage(StageId::RepoCloner));
        t.finish_stage(StageId::RepoCloner, None).unwrap();
        assert_eq!(t.advance().unwrap(), RunPhase::Stage(StageId::CodeAnalysis));
        t.finish_stage(StageId::CodeAnalysis, Some("boom".into())).unwrap();
        assert_eq!(t.advance().unwrap(), RunPhase::Done);

        assert_eq!(t.with_status(StageStatus::Completed), vec![StageId::RepoCloner]);
        assert_eq!(t.with_status(StageStatus::Failed), vec![StageId::CodeAnalysis]);
        assert!(t.advance().is_err());
    }

    #[test]
    fn skipping_a_stage_is_invalid() {
        let mut t = tracker();
        let err = t.transition(RunPhase::NotStarted, RunPhase::Stage(StageId::CodeAnalysis));
        assert!(err.is_err());
        assert_eq!(t.phase, RunPhase::NotStarted);
    }

    #[test]
    fn cas_miss_returns_false() {
        let mut t = tracker();
        let ok = t
            .transition(RunPhase::Stage(StageId::RepoCloner), RunPhase::Stage(StageId::CodeAnalysis))
            .unwrap();
        assert!(!ok);
        assert_eq!(t.phase, RunPhase::NotStarted);
    }

    #[test]
    fn fatal_from_any_live_phase_but_terminal_after() {
        let mut t = tracker();
        t.advance().unwrap();
        assert!(t.fail().unwrap());
        assert_eq!(t.phase, RunPhase::FatalError);
        assert!(t.fail().is_err());
        assert!(t.advance().is_err());
    }

    #[test]
    fn finish_requires_running_stage() {
        let mut t = tracker();
        assert!(t.finish_stage(StageId::RepoCloner, None).is_err());
    }

    #[test]
    fn phase_serialization() {
        let json = serde_json::to_string(&RunPhase::Stage(StageId::Translator)).unwrap();
        assert_eq!(json, r#"{"status":"stage","stage":"translator"}"#);
        let json = serde_json::to_string(&RunPhase::Done).unwrap();
        assert_eq!(json, r#"{"status":"done"}"#);
    }
}
