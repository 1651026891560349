use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use autodoc_core::{Field, FieldValue, WorkflowState};
use tracing::info;

use super::{StageSettings, enter, note};
use crate::agent::envelope::Stage;
use crate::collab::acquire::RepositoryAcquirer;
use crate::graph::stage::StageId;

/// Fetches the repository and records its metadata.
pub struct CloneStage {
    acquirer: Arc<dyn RepositoryAcquirer>,
    settings: Arc<StageSettings>,
}

impl CloneStage {
    pub fn new(acquirer: Arc<dyn RepositoryAcquirer>, settings: Arc<StageSettings>) -> Self {
        Self { acquirer, settings }
    }
}

#[async_trait::async_trait]
impl Stage for CloneStage {
    fn id(&self) -> StageId {
        StageId::RepoCloner
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        enter(state, self.id())?;
        let identifier = state.repo_identifier.trim().to_string();
        if identifier.is_empty() {
            anyhow::bail!("repository identifier is missing");
        }

        let workdir = self
            .settings
            .clone_root
            .clone()
            .unwrap_or_else(|| autodoc_store::clone_root(Path::new(&state.output_location)));
        let repo = self
            .acquirer
            .acquire(&identifier, self.settings.github_pat.as_deref(), &workdir)
            .await
            .with_context(|| format!("acquiring {identifier}"))?;

        info!(
            repo = %repo.name,
            path = %repo.local_path,
            branch = %repo.default_branch,
            languages = ?repo.languages,
            "repository ready"
        );
        note(
            state,
            self.id(),
            format!(
                "Repository {} ready at {} (branch {}, languages: {})",
                repo.name,
                repo.local_path,
                repo.default_branch,
                if repo.languages.is_empty() {
                    "none detected".to_string()
                } else {
                    repo.languages.join(", ")
                }
            ),
        );
        state.set_field(Field::RepositoryMetadata, FieldValue::Repository(repo))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::envelope::execute;
    use crate::collab::acquire::AcquisitionError;
    use crate::collab::mock::{local_repo, MockAcquirer};

    fn settings(pat: Option<&str>) -> Arc<StageSettings> {
        Arc::new(StageSettings {
            github_pat: pat.map(String::from),
            ..StageSettings::default()
        })
    }

    #[tokio::test]
    async fn records_repository_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = Arc::new(MockAcquirer::returning(local_repo("widgets", dir.path())));
        let stage = CloneStage::new(acquirer.clone(), settings(Some("ghp_token")));
        let mut state = WorkflowState::new("https://github.com/acme/widgets", "/tmp/out");

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert_eq!(state.repository_metadata.as_ref().unwrap().name, "widgets");
        assert_eq!(state.current_stage, "repo_cloner");
        assert_eq!(
            acquirer.calls(),
            vec![("https://github.com/acme/widgets".to_string(), Some("ghp_token".to_string()))]
        );
    }

    #[tokio::test]
    async fn acquisition_failure_is_stage_error() {
        let acquirer = Arc::new(MockAcquirer::failing(AcquisitionError::Authentication));
        let stage = CloneStage::new(acquirer, settings(None));
        let mut state = WorkflowState::new("https://github.com/acme/private", "/tmp/out");

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(report.failed());
        assert!(state.repository_metadata.is_none());
        assert_eq!(state.errors[0].agent, "RepoCloner");
        assert!(state.errors[0].message.contains("authentication failed"));
    }

    #[tokio::test]
    async fn empty_identifier_raises() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = Arc::new(MockAcquirer::returning(local_repo("w", dir.path())));
        let stage = CloneStage::new(acquirer.clone(), settings(None));
        let mut state = WorkflowState::new("  ", "/tmp/out");

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(report.failed());
        assert!(acquirer.calls().is_empty());
    }
}
