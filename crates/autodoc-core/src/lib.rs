pub mod config;
pub mod message;
pub mod module;
pub mod repo;
pub mod snippet;
pub mod state;
pub mod stats;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LogLevel, OutputLanguage};
pub use message::{AgentMessage, ErrorEntry, MessageType};
pub use module::{ImportRef, ParsedClass, ParsedFunction, ParsedModule};
pub use repo::RepositoryInfo;
pub use snippet::{CodeSnippet, SymbolType};
pub use stats::RunStats;
pub use state::{
    Field, FieldRef, FieldValue, KnowledgeResults, LocalizedText, StateError, Translations,
    WorkflowState,
};

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
