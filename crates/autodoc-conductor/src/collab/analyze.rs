use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autodoc_core::{CodeSnippet, ParsedModule, RepositoryInfo};
use globset::GlobSet;
use tracing::{debug, info, warn};

use super::python::{self, DEFAULT_EXCLUDES};

/// Output of one analysis pass.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub snippets: Vec<CodeSnippet>,
    pub modules: Vec<ParsedModule>,
    /// Files that could not be read or parsed, one line each.
    pub warnings: Vec<String>,
}

/// Turns a checked-out repository into snippets and parsed modules.
#[async_trait::async_trait]
pub trait CodeAnalyzer: Send + Sync {
    async fn analyze(&self, repo: &RepositoryInfo) -> Result<Analysis>;
}

/// Tree-sitter based analyzer for Python repositories.
pub struct PythonAnalyzer {
    excludes: GlobSet,
}

impl PythonAnalyzer {
    pub fn new() -> Result<Self> {
        Self::with_excludes(&[])
    }

    /// Extra globs (relative to the repository root) are skipped on top of
    /// the built-in virtualenv/cache/VCS directories.
    pub fn with_excludes(extra: &[String]) -> Result<Self> {
        Ok(Self {
            excludes: python::exclude_set(DEFAULT_EXCLUDES, extra)?,
        })
    }
}

#[async_trait::async_trait]
impl CodeAnalyzer for PythonAnalyzer {
    async fn analyze(&self, repo: &RepositoryInfo) -> Result<Analysis> {
        let root = PathBuf::from(&repo.local_path);
        if !root.is_dir() {
            anyhow::bail!("repository path does not exist: {}", root.display());
        }
        let excludes = self.excludes.clone();
        tokio::task::spawn_blocking(move || analyze_tree(&root, &excludes))
            .await
            .context("analysis task panicked")
    }
}

/// Synchronous analysis of every Python file under `root`.
pub fn analyze_tree(root: &Path, excludes: &GlobSet) -> Analysis {
    let files = python::find_python_files(root, excludes);
    info!(root = %root.display(), files = files.len(), "analyzing python files");

    let mut analysis = Analysis::default();
    for path in files {
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let source = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(file = %rel, error = %e, "skipping unreadable file");
                analysis.warnings.push(format!("{rel}: {e}"));
                continue;
            }
        };
        match python::parse_module(&source, &rel) {
            Ok(module) => {
                let snippets = python::snippets_for_module(&module);
                debug!(file = %rel, snippets = snippets.len(), "parsed");
                analysis.snippets.extend(snippets);
                analysis.modules.push(module);
            }
            Err(e) => {
                warn!(file = %rel, error = %e, "skipping unparsable file");
                analysis.warnings.push(format!("{rel}: {e:#}"));
            }
        }
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn repo_at(path: &Path) -> RepositoryInfo {
        RepositoryInfo {
            name: "demo".into(),
            url: path.to_string_lossy().to_string(),
            local_path: path.to_string_lossy().to_string(),
            default_branch: "main".into(),
            languages: vec!["Python".into()],
            description: None,
            is_private: false,
        }
    }

    #[tokio::test]
    async fn analyzes_all_modules() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(
            dir.path().join("pkg/core.py"),
            "\"\"\"Core module.\"\"\"\n\ndef run():\n    return 1\n",
        )
        .unwrap();
        fs::write(dir.path().join("main.py"), "class App:\n    def start(self):\n        pass\n").unwrap();

        let analysis = PythonAnalyzer::new()
            .unwrap()
            .analyze(&repo_at(dir.path()))
            .await
            .unwrap();

        assert_eq!(analysis.modules.len(), 2);
        let ids: Vec<&str> = analysis.snippets.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&"module:pkg/core.py"));
        assert!(ids.contains(&"function:pkg/core.py:run"));
        assert!(ids.contains(&"class:main.py:App"));
        assert!(ids.contains(&"method:main.py:App.start"));
        assert!(analysis.warnings.is_empty());
    }

    #[tokio::test]
    async fn unreadable_file_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.py"), "def f():\n    pass\n").unwrap();
        fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let analysis = PythonAnalyzer::new()
            .unwrap()
            .analyze(&repo_at(dir.path()))
            .await
            .unwrap();
        assert_eq!(analysis.modules.len(), 1);
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].starts_with("bad.py"));
    }

    #[tokio::test]
    async fn missing_checkout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        assert!(PythonAnalyzer::new().unwrap().analyze(&repo_at(&gone)).await.is_err());
    }
}
