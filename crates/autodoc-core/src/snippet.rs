use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    Module,
    Function,
    Method,
    Class,
    Other,
}

impl SymbolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolType::Module => "module",
            SymbolType::Function => "function",
            SymbolType::Method => "method",
            SymbolType::Class => "class",
            SymbolType::Other => "other",
        }
    }
}

impl std::fmt::Display for SymbolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable unit of source code.
///
/// Created by code analysis; later stages only annotate it (summaries,
/// docstrings), they never replace it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeSnippet {
    /// `{kind}:{relative-file-path}[:{symbol-name}]`, unique within a run.
    /// A repeated symbol (property setter, redefinition) gets `#{n}` from
    /// its second occurrence on.
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    pub symbol_type: SymbolType,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_docstring: Option<String>,
    /// Language code -> docstring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_docstring: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary_vi: Option<String>,
}

impl CodeSnippet {
    /// Build the canonical snippet id.
    pub fn make_id(symbol_type: SymbolType, file_path: &str, symbol: Option<&str>) -> String {
        match symbol {
            Some(name) => format!("{}:{file_path}:{name}", symbol_type.as_str()),
            None => format!("{}:{file_path}", symbol_type.as_str()),
        }
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Display name: symbol name if present, else the file path.
    pub fn display_name(&self) -> &str {
        self.symbol_name.as_deref().unwrap_or(&self.file_path)
    }

    /// True when the snippet has no docstring worth keeping.
    pub fn lacks_docstring(&self) -> bool {
        self.original_docstring
            .as_deref()
            .map(|d| d.trim().chars().count() < 10)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(doc: Option<&str>) -> CodeSnippet {
        CodeSnippet {
            id: CodeSnippet::make_id(SymbolType::Function, "pkg/a.py", Some("run")),
            file_path: "pkg/a.py".into(),
            start_line: 3,
            end_line: 7,
            text_content: "def run():\n    pass".into(),
            symbol_name: Some("run".into()),
            symbol_type: SymbolType::Function,
            language: "python".into(),
            original_docstring: doc.map(String::from),
            enhanced_docstring: None,
            ai_summary_en: None,
            ai_summary_vi: None,
        }
    }

    #[test]
    fn id_format() {
        assert_eq!(
            CodeSnippet::make_id(SymbolType::Module, "a.py", None),
            "module:a.py"
        );
        assert_eq!(
            CodeSnippet::make_id(SymbolType::Method, "a.py", Some("A.f")),
            "method:a.py:A.f"
        );
        assert_eq!(snippet(None).id, "function:pkg/a.py:run");
    }

    #[test]
    fn short_docstrings_count_as_missing() {
        assert!(snippet(None).lacks_docstring());
        assert!(snippet(Some("  tiny  ")).lacks_docstring());
        assert!(!snippet(Some("Runs the whole pipeline.")).lacks_docstring());
    }

    #[test]
    fn line_count_is_inclusive() {
        assert_eq!(snippet(None).line_count(), 5);
    }
}
