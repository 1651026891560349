use autodoc_core::WorkflowState;

use crate::graph::stage::StageId;

/// Emitted after each stage finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage: StageId,
    /// Human-readable phase name, e.g. "Generating summaries".
    pub label: &'static str,
    /// 1-based position of the stage in the run.
    pub index: usize,
    pub total: usize,
}

impl ProgressUpdate {
    pub fn new(stage: StageId, index: usize, total: usize) -> Self {
        Self {
            stage,
            label: stage.phase_label(),
            index,
            total,
        }
    }
}

/// Caller hook invoked between stages with a view of the current state.
///
/// Returning `Err` aborts the run through the fatal path.
#[async_trait::async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_progress(&self, update: &ProgressUpdate, state: &WorkflowState) -> anyhow::Result<()>;
}

/// Records every update (for testing).
#[derive(Default)]
pub struct CollectProgress {
    updates: std::sync::Mutex<Vec<ProgressUpdate>>,
}

impl CollectProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl ProgressObserver for CollectProgress {
    async fn on_progress(&self, update: &ProgressUpdate, _state: &WorkflowState) -> anyhow::Result<()> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update.clone());
        Ok(())
    }
}
