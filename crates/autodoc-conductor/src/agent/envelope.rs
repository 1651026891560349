use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use autodoc_core::{Field, MessageType, WorkflowState};
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::graph::stage::StageId;
use crate::runner::error::WorkflowError;

/// One pipeline stage. Implementations only hold their logic; logging,
/// error capture and rollback live in [`execute`].
///
/// Contract for `run`:
/// - add or enrich only the fields listed in [`StageId::produces`]
///   (plus in-place enrichment of `code_snippets`);
/// - set `current_stage` before returning;
/// - report missing upstream input as a `warning` message and return `Ok`.
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Stage logic failed; its partial output was discarded.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: StageId,
    pub outcome: StageOutcome,
    pub duration: Duration,
    /// Warning messages appended while the stage ran.
    pub warnings: usize,
    /// Error entries appended while the stage ran.
    pub errors: usize,
}

impl StageReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, StageOutcome::Failed(_))
    }
}

/// Run one stage inside the envelope.
///
/// 1. append an `info` "started" message;
/// 2. run the stage logic, catching both `Err` and panics;
/// 3. on success append a `success` message;
/// 4. on failure restore the pre-stage state, keeping the messages the
///    stage appended before it gave up, then append one `error` message
///    and one `errors` entry naming the stage.
///
/// A write to a field the stage does not own counts as a failure. The
/// only `Err` returned is [`WorkflowError::LogTruncated`]: a stage that
/// removes log entries breaks an invariant the envelope cannot repair.
pub async fn execute(
    stage: &dyn Stage,
    state: &mut WorkflowState,
) -> Result<StageReport, WorkflowError> {
    let id = stage.id();
    let name = id.agent_name();
    let started = Instant::now();

    info!(stage = name, "stage started");
    state.push_message(name, MessageType::Info, format!("{name} started"));

    let snapshot = state.clone();
    let result = AssertUnwindSafe(stage.run(state)).catch_unwind().await;

    check_logs(name, &snapshot, state)?;

    let failure = match result {
        Ok(Ok(())) => foreign_writes(id, &snapshot, state),
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
    };

    let warnings = state.messages[snapshot.messages.len()..]
        .iter()
        .filter(|m| m.message_type == MessageType::Warning)
        .count();

    let report = match failure {
        None => {
            state.push_message(name, MessageType::Success, format!("{name} completed"));
            let errors = state.errors.len() - snapshot.errors.len();
            info!(
                stage = name,
                duration_ms = started.elapsed().as_millis() as u64,
                warnings,
                errors,
                "stage completed"
            );
            StageReport {
                stage: id,
                outcome: StageOutcome::Completed,
                duration: started.elapsed(),
                warnings,
                errors,
            }
        }
        Some(message) => {
            let appended = state.messages.split_off(snapshot.messages.len());
            *state = snapshot;
            state.messages.extend(appended);
            error!(stage = name, error = %message, "stage failed");
            state.push_message(name, MessageType::Error, format!("{name} failed: {message}"));
            state.push_error(name, message.clone());
            StageReport {
                stage: id,
                outcome: StageOutcome::Failed(message),
                duration: started.elapsed(),
                warnings,
                errors: 1,
            }
        }
    };
    Ok(report)
}

/// `messages` and `errors` must still start with everything they held
/// before the stage ran.
fn check_logs(
    name: &'static str,
    before: &WorkflowState,
    after: &WorkflowState,
) -> Result<(), WorkflowError> {
    let messages_kept = after.messages.len() >= before.messages.len()
        && after.messages[..before.messages.len()] == before.messages[..];
    if !messages_kept {
        return Err(WorkflowError::LogTruncated {
            stage: name,
            log: "messages",
        });
    }
    let errors_kept = after.errors.len() >= before.errors.len()
        && after.errors[..before.errors.len()] == before.errors[..];
    if !errors_kept {
        return Err(WorkflowError::LogTruncated {
            stage: name,
            log: "errors",
        });
    }
    Ok(())
}

fn foreign_writes(id: StageId, before: &WorkflowState, after: &WorkflowState) -> Option<String> {
    let foreign: Vec<Field> = before
        .changed_fields(after)
        .into_iter()
        .filter(|f| !id.may_write(*f))
        .collect();
    if foreign.is_empty() {
        return None;
    }
    let names: Vec<&str> = foreign.iter().map(|f| f.as_str()).collect();
    warn!(stage = id.agent_name(), fields = ?names, "stage wrote fields it does not own");
    Some(format!("wrote fields it does not own: {}", names.join(", ")))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodoc_core::RepositoryInfo;
    use std::collections::BTreeMap;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        WriteForeign,
        ClearMessages,
        WarnAndSkip,
        WarnThenFail,
    }

    struct TestStage {
        id: StageId,
        behavior: Behavior,
    }

    #[async_trait::async_trait]
    impl Stage for TestStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
            state.current_stage = self.id.key().to_string();
            match self.behavior {
                Behavior::Succeed => {
                    state.diagrams = Some(BTreeMap::from([("a".to_string(), "graph TD".to_string())]));
                    Ok(())
                }
                Behavior::Fail => {
                    state.diagrams = Some(BTreeMap::new());
                    anyhow::bail!("renderer unavailable")
                }
                Behavior::Panic => {
                    state.diagrams = Some(BTreeMap::new());
                    panic!("index out of bounds")
                }
                Behavior::WriteForeign => {
                    state.docs_location = Some("/tmp/docs".into());
                    Ok(())
                }
                Behavior::ClearMessages => {
                    state.messages.clear();
                    Ok(())
                }
                Behavior::WarnAndSkip => {
                    state.push_message(self.id.agent_name(), MessageType::Warning, "nothing to do");
                    Ok(())
                }
                Behavior::WarnThenFail => {
                    state.push_message(self.id.agent_name(), MessageType::Warning, "module graph is empty");
                    state.diagrams = Some(BTreeMap::new());
                    state.push_error(self.id.agent_name(), "partial");
                    anyhow::bail!("renderer unavailable")
                }
            }
        }
    }

    fn stage(behavior: Behavior) -> TestStage {
        TestStage {
            id: StageId::DiagramGenerator,
            behavior,
        }
    }

    fn seeded() -> WorkflowState {
        let mut s = WorkflowState::new("https://example.com/r.git", "/tmp/out");
        s.repository_metadata = Some(RepositoryInfo {
            name: "r".into(),
            url: "https://example.com/r.git".into(),
            local_path: "/tmp/repos/r".into(),
            default_branch: "main".into(),
            languages: vec!["Python".into()],
            description: None,
            is_private: false,
        });
        s.current_stage = "knowledge_indexer".into();
        s
    }

    #[tokio::test]
    async fn success_appends_start_and_success() {
        let mut state = seeded();
        let report = execute(&stage(Behavior::Succeed), &mut state).await.unwrap();

        assert_eq!(report.outcome, StageOutcome::Completed);
        assert!(state.diagrams.is_some());
        assert_eq!(state.current_stage, "diagram_generator");
        let kinds: Vec<MessageType> = state.messages.iter().map(|m| m.message_type).collect();
        assert_eq!(kinds, vec![MessageType::Info, MessageType::Success]);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn error_rolls_back_and_records_once() {
        let mut state = seeded();
        let before = state.clone();
        let report = execute(&stage(Behavior::Fail), &mut state).await.unwrap();

        assert!(report.failed());
        assert!(state.diagrams.is_none());
        assert_eq!(state.current_stage, before.current_stage);
        assert_eq!(state.repository_metadata, before.repository_metadata);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].agent, "DiagramGenerator");
        assert!(state.errors[0].message.contains("renderer unavailable"));
        assert_eq!(state.messages.last().unwrap().message_type, MessageType::Error);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let mut state = seeded();
        let report = execute(&stage(Behavior::Panic), &mut state).await.unwrap();

        assert!(matches!(report.outcome, StageOutcome::Failed(ref m) if m.contains("index out of bounds")));
        assert!(state.diagrams.is_none());
        assert_eq!(state.errors.len(), 1);
    }

    #[tokio::test]
    async fn foreign_write_is_a_stage_failure() {
        let mut state = seeded();
        let report = execute(&stage(Behavior::WriteForeign), &mut state).await.unwrap();

        assert!(report.failed());
        assert!(state.docs_location.is_none());
        assert!(state.errors[0].message.contains("docs_location"));
    }

    #[tokio::test]
    async fn truncating_logs_is_fatal() {
        let mut state = seeded();
        let err = execute(&stage(Behavior::ClearMessages), &mut state)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::LogTruncated {
                stage: "DiagramGenerator",
                log: "messages"
            }
        );
    }

    #[tokio::test]
    async fn warnings_are_counted_not_errors() {
        let mut state = seeded();
        let report = execute(&stage(Behavior::WarnAndSkip), &mut state).await.unwrap();
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.errors, 0);
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_messages_written_before_it() {
        let mut state = seeded();
        let report = execute(&stage(Behavior::WarnThenFail), &mut state).await.unwrap();

        assert!(report.failed());
        assert_eq!(report.warnings, 1);
        assert!(state.diagrams.is_none());
        let kinds: Vec<MessageType> = state.messages.iter().map(|m| m.message_type).collect();
        assert_eq!(
            kinds,
            vec![MessageType::Info, MessageType::Warning, MessageType::Error]
        );
        assert_eq!(state.messages[1].content, "module graph is empty");
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].message.contains("renderer unavailable"));
    }
}
