use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use autodoc_core::{AppConfig, RunStats, WorkflowState};
use autodoc_notify::{Notifier, NotifyConfig, NotifyService};
use tracing::{info, warn};

use crate::agent::retry::RetryPolicy;
use crate::collab::acquire::GitAcquirer;
use crate::collab::analyze::PythonAnalyzer;
use crate::collab::completion::OpenRouterClient;
use crate::collab::index::QdrantIndex;
use crate::collab::site::NpmSiteBuilder;
use crate::runner::progress::ProgressObserver;
use crate::runner::workflow::Workflow;
use crate::stages::{Collaborators, StageSettings};

const UNKNOWN_ERROR: &str = "Unknown error occurred";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success {
        build_location: String,
        stats: RunStats,
    },
    Failure {
        message: String,
        /// `current_stage` of the final state.
        stage: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    /// Map a final state to an outcome. A non-empty `build_location` is
    /// the only success signal.
    pub fn from_state(state: &WorkflowState) -> Self {
        match &state.build_location {
            Some(build_location) if state.is_success() => RunOutcome::Success {
                build_location: build_location.clone(),
                stats: RunStats::from_state(state),
            },
            _ => RunOutcome::Failure {
                message: failure_message(state),
                stage: state.current_stage.clone(),
            },
        }
    }
}

/// All recorded error messages, one per line.
pub fn failure_message(state: &WorkflowState) -> String {
    if state.errors.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }
    state
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: WorkflowState,
}

/// Runs one workflow per call and reports the outcome exactly once.
pub struct RunDriver {
    workflow: Workflow,
}

impl RunDriver {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow }
    }

    /// The production pipeline: git, tree-sitter, OpenRouter, Qdrant, npm.
    pub fn production(config: &AppConfig) -> Result<Self> {
        let mut settings = StageSettings::from_config(config);
        settings.clone_root = Some(autodoc_store::clone_root(&config.output_dir));
        let completion = OpenRouterClient::new(&config.openrouter_base_url, &config.openrouter_api_key)
            .context("configuring completion client")?
            .with_retry(RetryPolicy::default());
        let index = QdrantIndex::new(&config.qdrant_url).context("configuring similarity index")?;
        let collab = Collaborators {
            acquirer: Arc::new(GitAcquirer::with_bin(config.git_executable_path.clone().into())),
            analyzer: Arc::new(PythonAnalyzer::new()?),
            completion: Arc::new(completion),
            index: Arc::new(index),
            site: Arc::new(NpmSiteBuilder::new(&config.npm_executable_path)),
        };
        let notifier: Arc<dyn Notifier> = Arc::new(NotifyService::new(NotifyConfig::from_app_config(config)));
        let workflow = Workflow::standard(Arc::new(settings), &collab, notifier)?;
        Ok(Self::new(workflow))
    }

    /// Run the workflow for `repo` into `output_dir`.
    ///
    /// Holds the output directory's run lock for the duration. `Err` only
    /// when the lock cannot be taken; every other failure is a
    /// [`RunOutcome::Failure`].
    pub async fn run(
        &self,
        repo: &str,
        output_dir: &Path,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<RunReport> {
        let _lock = autodoc_store::try_lock_file(&autodoc_store::lock_path(output_dir))?;
        let output = output_dir.to_string_lossy();
        let notifier = self.workflow.notifier();

        let state = match self.workflow.run(repo, &output, progress).await {
            Ok(state) => state,
            Err(fatal) => {
                // The workflow already sent the error notification.
                warn!(error = %fatal.error, "run ended on the fatal path");
                let outcome = RunOutcome::Failure {
                    message: fatal.error.to_string(),
                    stage: fatal.state.current_stage.clone(),
                };
                return Ok(RunReport {
                    outcome,
                    state: fatal.state,
                });
            }
        };

        let outcome = RunOutcome::from_state(&state);
        match &outcome {
            RunOutcome::Success { build_location, stats } => {
                info!(build = %build_location, snippets = stats.snippets_total(), "documentation generated");
                notifier.notify_success(repo, build_location, stats).await;
            }
            RunOutcome::Failure { message, stage } => {
                warn!(stage = %stage, errors = state.errors.len(), "documentation run failed");
                notifier.notify_error(repo, message, stage).await;
            }
        }
        Ok(RunReport { outcome, state })
    }
}
