use serde::{Deserialize, Serialize};

/// An import statement found in a module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRef {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
    pub code: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub base_classes: Vec<String>,
    #[serde(default)]
    pub methods: Vec<ParsedFunction>,
    pub code: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Structural view of one source file, as produced by code analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedModule {
    /// Path relative to the repository root.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub imports: Vec<ImportRef>,
    #[serde(default)]
    pub functions: Vec<ParsedFunction>,
    #[serde(default)]
    pub classes: Vec<ParsedClass>,
    pub code: String,
}

impl ParsedModule {
    /// File stem used as the module's short name (`pkg/util.py` -> `util`).
    pub fn short_name(&self) -> &str {
        let file = self.file_path.rsplit('/').next().unwrap_or(&self.file_path);
        file.strip_suffix(".py").unwrap_or(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_dirs_and_extension() {
        let m = ParsedModule {
            file_path: "pkg/sub/util.py".into(),
            docstring: None,
            imports: vec![],
            functions: vec![],
            classes: vec![],
            code: String::new(),
        };
        assert_eq!(m.short_name(), "util");
    }
}
