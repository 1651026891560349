use std::sync::Arc;

use autodoc_core::{Field, FieldValue, MessageType, SymbolType, WorkflowState};
use tracing::info;

use super::{enter, note, skip};
use crate::agent::envelope::Stage;
use crate::collab::analyze::CodeAnalyzer;
use crate::graph::stage::StageId;

/// Extracts snippets and module structure from the checked-out repository.
pub struct AnalysisStage {
    analyzer: Arc<dyn CodeAnalyzer>,
}

impl AnalysisStage {
    pub fn new(analyzer: Arc<dyn CodeAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait::async_trait]
impl Stage for AnalysisStage {
    fn id(&self) -> StageId {
        StageId::CodeAnalysis
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let Some(repo) = state.repository_metadata.clone() else {
            skip(state, id, "Repository metadata is missing; nothing to analyze");
            return Ok(());
        };
        if !repo.has_language("Python") {
            skip(
                state,
                id,
                &format!("No supported source files found in {}", repo.name),
            );
            state.set_field(Field::CodeSnippets, FieldValue::Snippets(Vec::new()))?;
            state.set_field(Field::Modules, FieldValue::Modules(Vec::new()))?;
            return Ok(());
        }

        let analysis = self.analyzer.analyze(&repo).await?;
        for warning in &analysis.warnings {
            state.push_message(id.agent_name(), MessageType::Warning, format!("Skipped {warning}"));
        }

        let count = |kind: SymbolType| analysis.snippets.iter().filter(|s| s.symbol_type == kind).count();
        info!(
            files = analysis.modules.len(),
            snippets = analysis.snippets.len(),
            "code analysis finished"
        );
        if analysis.snippets.is_empty() {
            skip(state, id, "No code snippets were extracted");
        } else {
            note(
                state,
                id,
                format!(
                    "Extracted {} snippets from {} files ({} modules, {} functions, {} classes, {} methods)",
                    analysis.snippets.len(),
                    analysis.modules.len(),
                    count(SymbolType::Module),
                    count(SymbolType::Function),
                    count(SymbolType::Class),
                    count(SymbolType::Method),
                ),
            );
        }
        state.set_field(Field::CodeSnippets, FieldValue::Snippets(analysis.snippets))?;
        state.set_field(Field::Modules, FieldValue::Modules(analysis.modules))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::envelope::execute;
    use crate::collab::analyze::Analysis;
    use crate::collab::mock::{MockAnalysis, MockAnalyzer};
    use crate::stages::fixtures;

    fn state_with_repo(languages: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::new("https://github.com/acme/widgets", "/tmp/out");
        let mut repo = fixtures::repo(std::path::Path::new("/tmp/repos/widgets"));
        repo.languages = languages.iter().map(|l| l.to_string()).collect();
        state.repository_metadata = Some(repo);
        state
    }

    #[tokio::test]
    async fn stores_snippets_and_modules() {
        let analysis = Analysis {
            snippets: vec![fixtures::snippet(SymbolType::Function, "a.py", Some("f"), None)],
            modules: vec![fixtures::module("a.py", &[], &[])],
            warnings: vec!["b.py: invalid utf-8".into()],
        };
        let stage = AnalysisStage::new(Arc::new(MockAnalyzer::new(MockAnalysis::Ok(analysis))));
        let mut state = state_with_repo(&["Python"]);

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert_eq!(report.warnings, 1);
        assert_eq!(state.snippets().len(), 1);
        assert_eq!(state.modules.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_python_repository_yields_empty_snippets() {
        let stage = AnalysisStage::new(Arc::new(MockAnalyzer::new(MockAnalysis::Panic("not called".into()))));
        let mut state = state_with_repo(&["Go"]);

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert_eq!(state.code_snippets, Some(vec![]));
        assert_eq!(report.warnings, 1);
    }

    #[tokio::test]
    async fn missing_metadata_is_a_warning() {
        let stage = AnalysisStage::new(Arc::new(MockAnalyzer::new(MockAnalysis::Err("x".into()))));
        let mut state = WorkflowState::new("r", "/tmp/out");

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert!(state.code_snippets.is_none());
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn analyzer_error_fails_stage() {
        let stage = AnalysisStage::new(Arc::new(MockAnalyzer::new(MockAnalysis::Err("parser crashed".into()))));
        let mut state = state_with_repo(&["Python"]);

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(report.failed());
        assert!(state.code_snippets.is_none());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].agent, "CodeAnalysis");
    }
}
