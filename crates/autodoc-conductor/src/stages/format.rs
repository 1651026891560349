use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use autodoc_core::{Field, FieldValue, OutputLanguage, WorkflowState};
use tracing::info;

use super::docusaurus::{write_site, SiteContent};
use super::{StageSettings, enter, note};
use crate::agent::envelope::Stage;
use crate::graph::stage::StageId;

/// Lays out the Docusaurus project under the output directory.
pub struct FormatStage {
    settings: Arc<StageSettings>,
}

impl FormatStage {
    pub fn new(settings: Arc<StageSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl Stage for FormatStage {
    fn id(&self) -> StageId {
        StageId::SiteFormatter
    }

    async fn run(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let id = self.id();
        enter(state, id)?;

        let Some(repo) = state.repository_metadata.as_ref() else {
            anyhow::bail!("repository metadata is required to format documentation");
        };
        let translations = state.translations.as_ref();
        let content = SiteContent {
            repo,
            snippets: state.snippets(),
            summaries: state.summaries.as_ref(),
            knowledge: state.knowledge_results.as_ref(),
            diagrams: state.diagrams.as_ref(),
            vi_summaries: translations.map(|t| &t.summaries),
            vi_knowledge: translations.and_then(|t| t.knowledge.as_ref()),
            with_vi: self.settings.wants(OutputLanguage::Vi),
        };

        let root = Path::new(&state.output_location);
        let written = write_site(root, &content)
            .with_context(|| format!("writing documentation site under {}", root.display()))?;

        info!(files = written.len(), root = %root.display(), "documentation formatted");
        let location = state.output_location.clone();
        note(state, id, format!("Wrote {} documentation files", written.len()));
        state.set_field(Field::DocsLocation, FieldValue::Text(location))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::envelope::execute;
    use crate::stages::docusaurus::VI_DOCS_DIR;
    use crate::stages::fixtures;
    use autodoc_core::{KnowledgeResults, LocalizedText, Translations};
    use std::collections::BTreeMap;

    fn settings(languages: Vec<OutputLanguage>) -> Arc<StageSettings> {
        Arc::new(StageSettings {
            languages,
            ..StageSettings::default()
        })
    }

    #[tokio::test]
    async fn writes_english_and_vietnamese_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = fixtures::analyzed(dir.path());
        state.summaries = Some(fixtures::summaries_for(&state));
        state.translations = Some(Translations {
            summaries: BTreeMap::from([(
                "function:pkg/core.py:run".to_string(),
                LocalizedText::from([("vi".to_string(), "Tóm tắt run".to_string())]),
            )]),
            knowledge: Some(KnowledgeResults {
                architectural_overview: LocalizedText::from([("vi".to_string(), "Kiến trúc phân lớp.".to_string())]),
                ..KnowledgeResults::default()
            }),
        });
        let stage = FormatStage::new(settings(vec![OutputLanguage::En, OutputLanguage::Vi]));

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert_eq!(state.docs_location.as_deref(), Some(state.output_location.as_str()));

        let en = std::fs::read_to_string(dir.path().join("docs/modules/pkg-core.md")).unwrap();
        assert!(en.contains("Summary of run"));
        let vi_root = dir.path().join(VI_DOCS_DIR);
        let vi = std::fs::read_to_string(vi_root.join("modules/pkg-core.md")).unwrap();
        assert!(vi.contains("Tóm tắt run"));
        let intro = std::fs::read_to_string(vi_root.join("intro.md")).unwrap();
        assert!(intro.contains("Kiến trúc phân lớp."));
        // No diagrams, no architecture page.
        assert!(!dir.path().join("docs/architecture.md").exists());
    }

    #[tokio::test]
    async fn english_only_skips_i18n_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = fixtures::analyzed(dir.path());
        let stage = FormatStage::new(settings(vec![OutputLanguage::En]));

        execute(&stage, &mut state).await.unwrap();
        assert!(dir.path().join("docs/intro.md").exists());
        assert!(!dir.path().join("i18n").exists());
    }

    #[tokio::test]
    async fn formats_from_metadata_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = WorkflowState::new("https://github.com/acme/widgets", dir.path().to_string_lossy());
        state.repository_metadata = Some(fixtures::repo(dir.path()));
        let stage = FormatStage::new(settings(vec![OutputLanguage::En]));

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(!report.failed());
        assert!(state.docs_location.is_some());
        assert!(dir.path().join("sidebars.js").exists());
    }

    #[tokio::test]
    async fn missing_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = WorkflowState::new("r", dir.path().to_string_lossy());
        let stage = FormatStage::new(settings(vec![OutputLanguage::En]));

        let report = execute(&stage, &mut state).await.unwrap();
        assert!(report.failed());
        assert!(state.docs_location.is_none());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].agent, "SiteFormatter");
    }
}
