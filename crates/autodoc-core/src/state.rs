use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::message::{AgentMessage, ErrorEntry, MessageType};
use crate::module::ParsedModule;
use crate::repo::RepositoryInfo;
use crate::snippet::{CodeSnippet, SymbolType};

/// Language code (`en`, `vi`) -> text.
pub type LocalizedText = BTreeMap<String, String>;

/// Output of the knowledge indexing stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeResults {
    #[serde(default)]
    pub architectural_overview: LocalizedText,
    /// Module file path -> explanation.
    #[serde(default)]
    pub module_explanations: BTreeMap<String, LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

/// Output of the translation stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translations {
    /// Snippet id -> localized summary.
    #[serde(default)]
    pub summaries: BTreeMap<String, LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<KnowledgeResults>,
}

/// The record threaded through every stage of one run.
///
/// `messages` and `errors` only ever grow. `build_location` is the sole
/// success signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowState {
    pub repo_identifier: String,
    pub output_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_metadata: Option<RepositoryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippets: Option<Vec<CodeSnippet>>,
    /// Structural modules behind `code_snippets`, consumed by diagram synthesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<ParsedModule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<BTreeMap<String, LocalizedText>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_snippets: Option<Vec<CodeSnippet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_results: Option<KnowledgeResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagrams: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<Translations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_location: Option<String>,
    pub current_stage: String,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

// ── Uniform field access ──

/// Addressable fields of [`WorkflowState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    RepoIdentifier,
    OutputLocation,
    RepositoryMetadata,
    CodeSnippets,
    Modules,
    Summaries,
    EnhancedSnippets,
    KnowledgeResults,
    Diagrams,
    Translations,
    DocsLocation,
    BuildLocation,
    CurrentStage,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::RepoIdentifier,
        Field::OutputLocation,
        Field::RepositoryMetadata,
        Field::CodeSnippets,
        Field::Modules,
        Field::Summaries,
        Field::EnhancedSnippets,
        Field::KnowledgeResults,
        Field::Diagrams,
        Field::Translations,
        Field::DocsLocation,
        Field::BuildLocation,
        Field::CurrentStage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::RepoIdentifier => "repo_identifier",
            Field::OutputLocation => "output_location",
            Field::RepositoryMetadata => "repository_metadata",
            Field::CodeSnippets => "code_snippets",
            Field::Modules => "modules",
            Field::Summaries => "summaries",
            Field::EnhancedSnippets => "enhanced_snippets",
            Field::KnowledgeResults => "knowledge_results",
            Field::Diagrams => "diagrams",
            Field::Translations => "translations",
            Field::DocsLocation => "docs_location",
            Field::BuildLocation => "build_location",
            Field::CurrentStage => "current_stage",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef<'a> {
    Text(&'a str),
    Repository(&'a RepositoryInfo),
    Snippets(&'a [CodeSnippet]),
    Modules(&'a [ParsedModule]),
    Summaries(&'a BTreeMap<String, LocalizedText>),
    Knowledge(&'a KnowledgeResults),
    Diagrams(&'a BTreeMap<String, String>),
    Translations(&'a Translations),
}

/// Owned value written through [`WorkflowState::set_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Repository(RepositoryInfo),
    Snippets(Vec<CodeSnippet>),
    Modules(Vec<ParsedModule>),
    Summaries(BTreeMap<String, LocalizedText>),
    Knowledge(KnowledgeResults),
    Diagrams(BTreeMap<String, String>),
    Translations(Translations),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Repository(_) => "repository",
            FieldValue::Snippets(_) => "snippets",
            FieldValue::Modules(_) => "modules",
            FieldValue::Summaries(_) => "summaries",
            FieldValue::Knowledge(_) => "knowledge",
            FieldValue::Diagrams(_) => "diagrams",
            FieldValue::Translations(_) => "translations",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("field {field} cannot hold a {kind} value")]
    TypeMismatch { field: Field, kind: &'static str },
}

impl WorkflowState {
    /// Seed a fresh state. Optional fields start unset, logs start empty.
    pub fn new(repo_identifier: impl Into<String>, output_location: impl Into<String>) -> Self {
        Self {
            repo_identifier: repo_identifier.into(),
            output_location: output_location.into(),
            repository_metadata: None,
            code_snippets: None,
            modules: None,
            summaries: None,
            enhanced_snippets: None,
            knowledge_results: None,
            diagrams: None,
            translations: None,
            docs_location: None,
            build_location: None,
            current_stage: "start".to_string(),
            messages: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Minimal state returned when the engine itself fails.
    pub fn fallback(repo_identifier: &str, output_location: &str, message: &str) -> Self {
        let mut state = Self::new(repo_identifier, output_location);
        state.current_stage = "error".to_string();
        state.errors.push(ErrorEntry::new("orchestrator", message));
        state
    }

    pub fn get_field(&self, field: Field) -> Option<FieldRef<'_>> {
        match field {
            Field::RepoIdentifier => Some(FieldRef::Text(&self.repo_identifier)),
            Field::OutputLocation => Some(FieldRef::Text(&self.output_location)),
            Field::RepositoryMetadata => self.repository_metadata.as_ref().map(FieldRef::Repository),
            Field::CodeSnippets => self.code_snippets.as_deref().map(FieldRef::Snippets),
            Field::Modules => self.modules.as_deref().map(FieldRef::Modules),
            Field::Summaries => self.summaries.as_ref().map(FieldRef::Summaries),
            Field::EnhancedSnippets => self.enhanced_snippets.as_deref().map(FieldRef::Snippets),
            Field::KnowledgeResults => self.knowledge_results.as_ref().map(FieldRef::Knowledge),
            Field::Diagrams => self.diagrams.as_ref().map(FieldRef::Diagrams),
            Field::Translations => self.translations.as_ref().map(FieldRef::Translations),
            Field::DocsLocation => self.docs_location.as_deref().map(FieldRef::Text),
            Field::BuildLocation => self.build_location.as_deref().map(FieldRef::Text),
            Field::CurrentStage => Some(FieldRef::Text(&self.current_stage)),
        }
    }

    pub fn set_field(&mut self, field: Field, value: FieldValue) -> Result<(), StateError> {
        let kind = value.kind();
        let mismatch = || StateError::TypeMismatch { field, kind };
        match (field, value) {
            (Field::RepoIdentifier, FieldValue::Text(v)) => self.repo_identifier = v,
            (Field::OutputLocation, FieldValue::Text(v)) => self.output_location = v,
            (Field::RepositoryMetadata, FieldValue::Repository(v)) => {
                self.repository_metadata = Some(v)
            }
            (Field::CodeSnippets, FieldValue::Snippets(v)) => self.code_snippets = Some(v),
            (Field::Modules, FieldValue::Modules(v)) => self.modules = Some(v),
            (Field::Summaries, FieldValue::Summaries(v)) => self.summaries = Some(v),
            (Field::EnhancedSnippets, FieldValue::Snippets(v)) => self.enhanced_snippets = Some(v),
            (Field::KnowledgeResults, FieldValue::Knowledge(v)) => self.knowledge_results = Some(v),
            (Field::Diagrams, FieldValue::Diagrams(v)) => self.diagrams = Some(v),
            (Field::Translations, FieldValue::Translations(v)) => self.translations = Some(v),
            (Field::DocsLocation, FieldValue::Text(v)) => self.docs_location = Some(v),
            (Field::BuildLocation, FieldValue::Text(v)) => self.build_location = Some(v),
            (Field::CurrentStage, FieldValue::Text(v)) => self.current_stage = v,
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get_field(field).is_some()
    }

    /// Fields whose value differs between `self` and `other`.
    pub fn changed_fields(&self, other: &WorkflowState) -> Vec<Field> {
        Field::ALL
            .iter()
            .copied()
            .filter(|f| self.get_field(*f) != other.get_field(*f))
            .collect()
    }

    // ── Logs ──

    pub fn push_message(&mut self, agent: &str, message_type: MessageType, content: impl Into<String>) {
        self.messages.push(AgentMessage::new(agent, message_type, content));
    }

    pub fn push_error(&mut self, agent: &str, message: impl Into<String>) {
        self.errors.push(ErrorEntry::new(agent, message));
    }

    pub fn messages_of(&self, message_type: MessageType) -> impl Iterator<Item = &AgentMessage> {
        self.messages
            .iter()
            .filter(move |m| m.message_type == message_type)
    }

    // ── Convenience readers ──

    pub fn snippets(&self) -> &[CodeSnippet] {
        self.code_snippets.as_deref().unwrap_or(&[])
    }

    pub fn snippets_mut(&mut self) -> Option<&mut Vec<CodeSnippet>> {
        self.code_snippets.as_mut()
    }

    pub fn count_snippets(&self, symbol_type: SymbolType) -> usize {
        self.snippets()
            .iter()
            .filter(|s| s.symbol_type == symbol_type)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.build_location.as_deref().is_some_and(|p| !p.is_empty())
    }
}
