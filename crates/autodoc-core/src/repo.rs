use serde::{Deserialize, Serialize};

/// Metadata about an acquired repository. Created once by the acquisition
/// stage, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub name: String,
    pub url: String,
    pub local_path: String,
    pub default_branch: String,
    /// Most frequent first.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

impl RepositoryInfo {
    pub fn has_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }
}
