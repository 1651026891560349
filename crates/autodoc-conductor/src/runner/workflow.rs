//! The workflow engine: nine stages in a fixed order over one state.

use std::path::Path;
use std::sync::Arc;

use autodoc_core::WorkflowState;
use autodoc_notify::{NoopNotifier, Notifier};
use tracing::{debug, error, info, warn};

use crate::agent::envelope::{execute, Stage, StageOutcome};
use crate::graph::stage::StageId;
use crate::graph::topo::stage_order;
use crate::runner::error::{FatalRun, WorkflowError};
use crate::runner::event_log::{self, Event, EventLogger};
use crate::runner::progress::{ProgressObserver, ProgressUpdate};
use crate::stages::{standard_stages, Collaborators, StageSettings};
use crate::state::machine::{RunPhase, RunTracker};
use crate::state::persist::save_state;

// ── Builder ──

pub struct WorkflowBuilder {
    stages: Vec<Box<dyn Stage>>,
    notifier: Arc<dyn Notifier>,
    persist: bool,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            notifier: Arc::new(NoopNotifier),
            persist: true,
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Receives the error notification on the fatal path.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Write `events.jsonl`, `run-status.json` and `state.json` under
    /// `{output}/.autodoc/`. On by default.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Order the stages by their declared dependencies and check the
    /// result is exactly the nine-stage pipeline.
    pub fn build(mut self) -> Result<Workflow, WorkflowError> {
        let ids: Vec<StageId> = self.stages.iter().map(|s| s.id()).collect();
        let order = stage_order(&ids).map_err(|e| WorkflowError::InvalidGraph(format!("{e:#}")))?;
        if order != StageId::ALL {
            let names: Vec<&str> = order.iter().map(|s| s.agent_name()).collect();
            return Err(WorkflowError::InvalidGraph(format!(
                "expected the nine pipeline stages, got [{}]",
                names.join(", ")
            )));
        }
        self.stages.sort_by_key(|s| s.id().position());
        Ok(Workflow {
            stages: self.stages,
            notifier: self.notifier,
            persist: self.persist,
        })
    }
}

// ── Workflow ──

pub struct Workflow {
    stages: Vec<Box<dyn Stage>>,
    notifier: Arc<dyn Notifier>,
    persist: bool,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    /// The production pipeline over the given collaborators.
    pub fn standard(
        settings: Arc<StageSettings>,
        collab: &Collaborators,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, WorkflowError> {
        WorkflowBuilder::new()
            .stages(standard_stages(settings, collab))
            .notifier(notifier)
            .build()
    }

    pub fn order(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Run every stage once, in order.
    ///
    /// Returns the final state whether or not the build succeeded; check
    /// `build_location`. `Err` means the engine itself gave up: the
    /// fallback state is returned inside [`FatalRun`] after an error
    /// notification was sent.
    pub async fn run(
        &self,
        repo_identifier: &str,
        output_location: &str,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<WorkflowState, FatalRun> {
        let run_id = ulid::Ulid::new().to_string();
        let output_dir = Path::new(output_location);
        let order = self.order();
        let mut tracker = RunTracker::new(&run_id, &order);
        let mut run = RunLog {
            persist: self.persist && !output_location.trim().is_empty(),
            output_dir,
            repo: repo_identifier,
            events: EventLogger::new(output_dir, &run_id),
        };

        if repo_identifier.trim().is_empty() {
            return Err(self.fatal(&mut run, &mut tracker, None, WorkflowError::MissingSeed("repo_identifier")).await);
        }
        if output_location.trim().is_empty() {
            return Err(self.fatal(&mut run, &mut tracker, None, WorkflowError::MissingSeed("output_location")).await);
        }

        info!(run_id = %run_id, repo = repo_identifier, output = output_location, "workflow started");
        let mut state = WorkflowState::new(repo_identifier, output_location);
        run.event(Event::RunStart {
            repo: repo_identifier.to_string(),
            stage_count: order.len(),
        });
        run.status(&tracker);

        let total = self.stages.len();
        for (i, stage) in self.stages.iter().enumerate() {
            let id = stage.id();
            match tracker.advance() {
                Ok(RunPhase::Stage(next)) if next == id => {}
                Ok(other) => {
                    let err = WorkflowError::InvalidTransition(format!("expected {id}, run moved to {other:?}"));
                    return Err(self.fatal(&mut run, &mut tracker, Some(id), err).await);
                }
                Err(e) => {
                    let err = WorkflowError::InvalidTransition(format!("{e:#}"));
                    return Err(self.fatal(&mut run, &mut tracker, Some(id), err).await);
                }
            }
            run.event(Event::StageStart { stage: id });
            run.status(&tracker);

            let report = match execute(stage.as_ref(), &mut state).await {
                Ok(report) => report,
                Err(err) => return Err(self.fatal(&mut run, &mut tracker, Some(id), err).await),
            };
            let duration_ms = report.duration.as_millis() as u64;
            let failure = match &report.outcome {
                StageOutcome::Completed => {
                    run.event(Event::StageDone {
                        stage: id,
                        duration_ms,
                        warnings: report.warnings,
                        errors: report.errors,
                    });
                    None
                }
                StageOutcome::Failed(message) => {
                    run.event(Event::StageFailed {
                        stage: id,
                        duration_ms,
                        error: message.clone(),
                    });
                    Some(message.clone())
                }
            };
            if let Err(e) = tracker.finish_stage(id, failure) {
                let err = WorkflowError::InvalidTransition(format!("{e:#}"));
                return Err(self.fatal(&mut run, &mut tracker, Some(id), err).await);
            }
            run.status(&tracker);

            if let Some(observer) = progress {
                let update = ProgressUpdate::new(id, i + 1, total);
                if let Err(e) = observer.on_progress(&update, &state).await {
                    let err = WorkflowError::ProgressAborted {
                        stage: id.agent_name(),
                        message: format!("{e:#}"),
                    };
                    return Err(self.fatal(&mut run, &mut tracker, Some(id), err).await);
                }
            }
        }

        if let Err(e) = tracker.advance() {
            let err = WorkflowError::InvalidTransition(format!("{e:#}"));
            return Err(self.fatal(&mut run, &mut tracker, None, err).await);
        }
        let success = state.is_success();
        run.event(Event::RunCompleted {
            success,
            build_location: state.build_location.clone(),
        });
        run.status(&tracker);
        run.save(&state);
        info!(
            run_id = %run_id,
            success,
            errors = state.errors.len(),
            messages = state.messages.len(),
            "workflow finished"
        );
        Ok(state)
    }

    /// The fatal path: fallback state, one error notification.
    async fn fatal(
        &self,
        run: &mut RunLog<'_>,
        tracker: &mut RunTracker,
        stage: Option<StageId>,
        err: WorkflowError,
    ) -> FatalRun {
        let message = err.to_string();
        error!(stage = stage.map(|s| s.agent_name()), error = %message, "workflow aborted");
        if let Err(e) = tracker.fail() {
            debug!(error = %e, "run already finished");
        }
        run.event(Event::RunFatal {
            stage,
            error: message.clone(),
        });
        run.status(tracker);

        let state = WorkflowState::fallback(run.repo, &run.output_dir.to_string_lossy(), &message);
        run.save(&state);
        let stage_key = stage.map_or("orchestrator", |s| s.key());
        self.notifier.notify_error(run.repo, &message, stage_key).await;
        FatalRun { state, error: err }
    }
}

/// Best-effort run bookkeeping under `{output}/.autodoc/`.
struct RunLog<'a> {
    persist: bool,
    output_dir: &'a Path,
    repo: &'a str,
    events: EventLogger,
}

impl RunLog<'_> {
    fn event(&mut self, event: Event) {
        if self.persist {
            self.events.record(event);
        }
    }

    fn status(&self, tracker: &RunTracker) {
        if self.persist {
            event_log::write_run_status(self.output_dir, self.repo, tracker);
        }
    }

    fn save(&self, state: &WorkflowState) {
        if !self.persist {
            return;
        }
        if let Err(e) = save_state(self.output_dir, state) {
            warn!(error = %e, "could not persist workflow state");
        }
    }
}
