//! The nine pipeline stages.
//!
//! Every stage closes over the [`StageSettings`] and collaborators it needs
//! at construction time; nothing here reads the environment.

mod analysis;
mod build;
mod clone;
mod diagram;
mod docstring;
pub mod docusaurus;
mod format;
mod knowledge;
mod summarize;
mod translate;

use std::path::PathBuf;
use std::sync::Arc;

use autodoc_core::{AppConfig, Field, FieldValue, MessageType, OutputLanguage, StateError, WorkflowState};
use tracing::warn;

use crate::agent::envelope::Stage;
use crate::collab::acquire::RepositoryAcquirer;
use crate::collab::analyze::CodeAnalyzer;
use crate::collab::completion::CompletionClient;
use crate::collab::index::SimilarityIndex;
use crate::collab::site::SiteBuilder;
use crate::graph::stage::StageId;

pub use analysis::AnalysisStage;
pub use build::BuildStage;
pub use clone::CloneStage;
pub use diagram::DiagramStage;
pub use docstring::DocstringStage;
pub use format::FormatStage;
pub use knowledge::KnowledgeStage;
pub use summarize::SummarizeStage;
pub use translate::TranslateStage;

/// Per-run knobs shared by the stages.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub github_pat: Option<String>,
    pub languages: Vec<OutputLanguage>,
    pub summary_batch_size: usize,
    pub translation_batch_size: usize,
    pub summarizer_model: String,
    pub translation_model: String,
    pub rag_model: String,
    pub embedding_model: String,
    /// Where repositories are cloned. Defaults to a sibling `repos/` of the
    /// output directory.
    pub clone_root: Option<PathBuf>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl StageSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            github_pat: config.github_pat.clone().filter(|p| !p.is_empty()),
            languages: config.output_languages.clone(),
            summary_batch_size: config.summary_batch_size.max(1),
            translation_batch_size: config.translation_batch_size.max(1),
            summarizer_model: config.summarizer_model_name.clone(),
            translation_model: config.translation_model_name.clone(),
            rag_model: config.rag_model_name.clone(),
            embedding_model: config.embedding_model_name.clone(),
            clone_root: None,
        }
    }

    pub fn wants(&self, language: OutputLanguage) -> bool {
        self.languages.contains(&language)
    }
}

/// External systems the stages call.
#[derive(Clone)]
pub struct Collaborators {
    pub acquirer: Arc<dyn RepositoryAcquirer>,
    pub analyzer: Arc<dyn CodeAnalyzer>,
    pub completion: Arc<dyn CompletionClient>,
    pub index: Arc<dyn SimilarityIndex>,
    pub site: Arc<dyn SiteBuilder>,
}

/// The nine stages in pipeline order.
pub fn standard_stages(settings: Arc<StageSettings>, collab: &Collaborators) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CloneStage::new(collab.acquirer.clone(), settings.clone())),
        Box::new(AnalysisStage::new(collab.analyzer.clone())),
        Box::new(SummarizeStage::new(collab.completion.clone(), settings.clone())),
        Box::new(DocstringStage::new(collab.completion.clone(), settings.clone())),
        Box::new(KnowledgeStage::new(
            collab.completion.clone(),
            collab.index.clone(),
            settings.clone(),
        )),
        Box::new(DiagramStage::new(collab.completion.clone(), settings.clone())),
        Box::new(TranslateStage::new(collab.completion.clone(), settings.clone())),
        Box::new(FormatStage::new(settings)),
        Box::new(BuildStage::new(collab.site.clone())),
    ]
}

/// Label the state with the running stage.
pub(crate) fn enter(state: &mut WorkflowState, id: StageId) -> Result<(), StateError> {
    state.set_field(Field::CurrentStage, FieldValue::Text(id.key().to_string()))
}

/// Record a degraded-success skip: a `warning` message, no error.
pub(crate) fn skip(state: &mut WorkflowState, id: StageId, reason: &str) {
    warn!(stage = id.agent_name(), reason, "stage skipped");
    state.push_message(id.agent_name(), MessageType::Warning, reason);
}

pub(crate) fn note(state: &mut WorkflowState, id: StageId, content: impl Into<String>) {
    state.push_message(id.agent_name(), MessageType::Info, content);
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;
    use std::path::Path;

    use autodoc_core::{
        CodeSnippet, ImportRef, ParsedClass, ParsedFunction, ParsedModule, RepositoryInfo,
        SymbolType, WorkflowState,
    };

    pub fn repo(path: &Path) -> RepositoryInfo {
        crate::collab::mock::local_repo("widgets", path)
    }

    pub fn snippet(kind: SymbolType, file: &str, name: Option<&str>, doc: Option<&str>) -> CodeSnippet {
        let body = "def run(x):\n    return x\n";
        CodeSnippet {
            id: CodeSnippet::make_id(kind, file, name),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 2,
            text_content: body.to_string(),
            symbol_name: name.map(String::from),
            symbol_type: kind,
            language: "python".into(),
            original_docstring: doc.map(String::from),
            enhanced_docstring: None,
            ai_summary_en: None,
            ai_summary_vi: None,
        }
    }

    pub fn module(path: &str, imports: &[&str], classes: &[&str]) -> ParsedModule {
        ParsedModule {
            file_path: path.to_string(),
            docstring: Some("Module docs.".into()),
            imports: imports
                .iter()
                .map(|m| ImportRef {
                    module: m.to_string(),
                    name: None,
                    alias: None,
                })
                .collect(),
            functions: vec![],
            classes: classes
                .iter()
                .map(|c| ParsedClass {
                    name: c.to_string(),
                    docstring: None,
                    base_classes: vec!["Base".into()],
                    methods: vec![ParsedFunction {
                        name: "run".into(),
                        docstring: None,
                        params: vec!["self".into(), "x".into()],
                        code: "def run(self, x):\n    pass".into(),
                        start_line: 2,
                        end_line: 3,
                        is_async: false,
                    }],
                    code: String::new(),
                    start_line: 1,
                    end_line: 3,
                })
                .collect(),
            code: String::new(),
        }
    }

    /// State as it looks after code analysis: two snippets in one module.
    pub fn analyzed(output: &Path) -> WorkflowState {
        let mut state = WorkflowState::new("https://github.com/acme/widgets", output.to_string_lossy());
        state.repository_metadata = Some(repo(output));
        state.code_snippets = Some(vec![
            snippet(SymbolType::Module, "pkg/core.py", None, Some("Core helpers for widgets.")),
            snippet(SymbolType::Function, "pkg/core.py", Some("run"), None),
        ]);
        state.modules = Some(vec![module("pkg/core.py", &["os", "pkg.util"], &["Engine"])]);
        state.current_stage = "code_analysis".into();
        state
    }

    pub fn summaries_for(state: &WorkflowState) -> BTreeMap<String, BTreeMap<String, String>> {
        state
            .snippets()
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    BTreeMap::from([("en".to_string(), format!("Summary of {}", s.display_name()))]),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodoc_core::FieldRef;

    #[test]
    fn enter_labels_the_state() {
        let mut state = WorkflowState::new("r", "o");
        enter(&mut state, StageId::Translator).unwrap();
        assert_eq!(
            state.get_field(Field::CurrentStage),
            Some(FieldRef::Text("translator"))
        );
        assert_eq!(state.changed_fields(&WorkflowState::new("r", "o")), vec![Field::CurrentStage]);
    }
}
