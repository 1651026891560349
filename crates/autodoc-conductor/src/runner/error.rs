use autodoc_core::WorkflowState;
use thiserror::Error;

/// Engine-level failures. Anything here aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("missing required input: {0}")]
    MissingSeed(&'static str),

    #[error("stage {stage} removed entries from the {log} log")]
    LogTruncated {
        stage: &'static str,
        log: &'static str,
    },

    #[error("progress callback aborted the run after {stage}: {message}")]
    ProgressAborted {
        stage: &'static str,
        message: String,
    },

    #[error("invalid stage graph: {0}")]
    InvalidGraph(String),

    #[error("invalid run transition: {0}")]
    InvalidTransition(String),
}

/// A run that ended on the fatal path.
///
/// `state` is the minimal fallback state (`current_stage == "error"`, one
/// `orchestrator` error entry), not the partially processed one.
#[derive(Debug, Error)]
#[error("workflow failed: {error}")]
pub struct FatalRun {
    pub state: WorkflowState,
    #[source]
    pub error: WorkflowError,
}
