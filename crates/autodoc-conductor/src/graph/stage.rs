use autodoc_core::Field;
use serde::{Deserialize, Serialize};

/// The nine pipeline stages. The set is closed and the order fixed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    RepoCloner,
    CodeAnalysis,
    Summarizer,
    DocstringEnhancer,
    KnowledgeIndexer,
    DiagramGenerator,
    Translator,
    SiteFormatter,
    SiteBuilder,
}

impl StageId {
    pub const ALL: [StageId; 9] = [
        StageId::RepoCloner,
        StageId::CodeAnalysis,
        StageId::Summarizer,
        StageId::DocstringEnhancer,
        StageId::KnowledgeIndexer,
        StageId::DiagramGenerator,
        StageId::Translator,
        StageId::SiteFormatter,
        StageId::SiteBuilder,
    ];

    /// Name used to attribute messages and errors.
    pub fn agent_name(&self) -> &'static str {
        match self {
            StageId::RepoCloner => "RepoCloner",
            StageId::CodeAnalysis => "CodeAnalysis",
            StageId::Summarizer => "Summarizer",
            StageId::DocstringEnhancer => "DocstringEnhancer",
            StageId::KnowledgeIndexer => "KnowledgeIndexer",
            StageId::DiagramGenerator => "DiagramGenerator",
            StageId::Translator => "Translator",
            StageId::SiteFormatter => "SiteFormatter",
            StageId::SiteBuilder => "SiteBuilder",
        }
    }

    /// Value written to `current_stage` once the stage has run.
    pub fn key(&self) -> &'static str {
        match self {
            StageId::RepoCloner => "repo_cloner",
            StageId::CodeAnalysis => "code_analysis",
            StageId::Summarizer => "summarizer",
            StageId::DocstringEnhancer => "docstring_enhancer",
            StageId::KnowledgeIndexer => "knowledge_indexer",
            StageId::DiagramGenerator => "diagram_generator",
            StageId::Translator => "translator",
            StageId::SiteFormatter => "site_formatter",
            StageId::SiteBuilder => "site_builder",
        }
    }

    /// Human-readable phase name for progress display.
    pub fn phase_label(&self) -> &'static str {
        match self {
            StageId::RepoCloner => "Cloning repository",
            StageId::CodeAnalysis => "Analyzing code",
            StageId::Summarizer => "Generating summaries",
            StageId::DocstringEnhancer => "Enhancing docstrings",
            StageId::KnowledgeIndexer => "Building knowledge base",
            StageId::DiagramGenerator => "Generating diagrams",
            StageId::Translator => "Translating content",
            StageId::SiteFormatter => "Formatting documentation site",
            StageId::SiteBuilder => "Building documentation site",
        }
    }

    /// Each stage consumes the cumulative output of its predecessor.
    pub fn depends_on(&self) -> &'static [StageId] {
        match self {
            StageId::RepoCloner => &[],
            StageId::CodeAnalysis => &[StageId::RepoCloner],
            StageId::Summarizer => &[StageId::CodeAnalysis],
            StageId::DocstringEnhancer => &[StageId::Summarizer],
            StageId::KnowledgeIndexer => &[StageId::DocstringEnhancer],
            StageId::DiagramGenerator => &[StageId::KnowledgeIndexer],
            StageId::Translator => &[StageId::DiagramGenerator],
            StageId::SiteFormatter => &[StageId::Translator],
            StageId::SiteBuilder => &[StageId::SiteFormatter],
        }
    }

    /// State fields this stage owns. `code_snippets` enrichment and
    /// `current_stage` are open to every stage and not listed.
    pub fn produces(&self) -> &'static [Field] {
        match self {
            StageId::RepoCloner => &[Field::RepositoryMetadata],
            StageId::CodeAnalysis => &[Field::CodeSnippets, Field::Modules],
            StageId::Summarizer => &[Field::Summaries],
            StageId::DocstringEnhancer => &[Field::EnhancedSnippets],
            StageId::KnowledgeIndexer => &[Field::KnowledgeResults],
            StageId::DiagramGenerator => &[Field::Diagrams],
            StageId::Translator => &[Field::Translations],
            StageId::SiteFormatter => &[Field::DocsLocation],
            StageId::SiteBuilder => &[Field::BuildLocation],
        }
    }

    /// Whether the stage may write `field`.
    pub fn may_write(&self, field: Field) -> bool {
        matches!(field, Field::CodeSnippets | Field::CurrentStage) || self.produces().contains(&field)
    }

    pub fn position(&self) -> usize {
        StageId::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(StageId::ALL.len())
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.agent_name())
    }
}
