use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::json;
use tracing::{error, info};

/// Installs and builds a generated documentation site.
#[async_trait::async_trait]
pub trait SiteBuilder: Send + Sync {
    /// Install the site's toolchain dependencies. `false` on any failure.
    async fn install(&self, docs_dir: &Path) -> bool;

    /// Build the site; returns the output directory on success.
    async fn build(&self, docs_dir: &Path) -> Option<String>;
}

/// Docusaurus site driven through npm.
pub struct NpmSiteBuilder {
    npm: PathBuf,
}

impl NpmSiteBuilder {
    pub fn new(npm: impl Into<PathBuf>) -> Self {
        Self { npm: npm.into() }
    }

    async fn npm(&self, args: &[&str], cwd: &Path) -> Result<(), String> {
        let output = tokio::process::Command::new(&self.npm)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {e}", self.npm.display()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
        Err(tail.into_iter().rev().collect::<Vec<_>>().join("\n"))
    }
}

impl Default for NpmSiteBuilder {
    fn default() -> Self {
        Self::new("npm")
    }
}

/// Manifest written when the site directory has none.
pub fn package_manifest() -> serde_json::Value {
    json!({
        "name": "autodoc-documentation",
        "version": "0.0.1",
        "private": true,
        "scripts": {
            "docusaurus": "docusaurus",
            "start": "docusaurus start",
            "build": "docusaurus build",
            "serve": "docusaurus serve",
            "clear": "docusaurus clear",
            "write-translations": "docusaurus write-translations"
        },
        "dependencies": {
            "@docusaurus/core": "2.4.3",
            "@docusaurus/preset-classic": "2.4.3",
            "@docusaurus/theme-mermaid": "2.4.3",
            "@mdx-js/react": "^1.6.22",
            "clsx": "^1.2.1",
            "prism-react-renderer": "^1.3.5",
            "react": "^17.0.2",
            "react-dom": "^17.0.2"
        },
        "devDependencies": {
            "@docusaurus/module-type-aliases": "2.4.3"
        },
        "browserslist": {
            "production": [">0.5%", "not dead", "not op_mini all"],
            "development": ["last 1 chrome version", "last 1 firefox version", "last 1 safari version"]
        },
        "engines": { "node": ">=16.14" }
    })
}

/// Write `package.json` into `docs_dir` unless one exists.
pub fn ensure_manifest(docs_dir: &Path) -> std::io::Result<bool> {
    let path = docs_dir.join("package.json");
    if path.exists() {
        return Ok(false);
    }
    let body = serde_json::to_string_pretty(&package_manifest()).map_err(std::io::Error::other)?;
    std::fs::write(&path, body)?;
    Ok(true)
}

#[async_trait::async_trait]
impl SiteBuilder for NpmSiteBuilder {
    async fn install(&self, docs_dir: &Path) -> bool {
        if let Err(e) = ensure_manifest(docs_dir) {
            error!(path = %docs_dir.display(), error = %e, "cannot write package.json");
            return false;
        }
        info!(path = %docs_dir.display(), "installing site dependencies");
        match self.npm(&["install"], docs_dir).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "npm install failed");
                false
            }
        }
    }

    async fn build(&self, docs_dir: &Path) -> Option<String> {
        info!(path = %docs_dir.display(), "building site");
        if let Err(e) = self.npm(&["run", "build"], docs_dir).await {
            error!(error = %e, "npm run build failed");
            return None;
        }
        let out = docs_dir.join("build");
        if out.is_dir() {
            Some(out.to_string_lossy().to_string())
        } else {
            error!(path = %out.display(), "build finished but produced no output directory");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_written_once() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_manifest(dir.path()).unwrap());
        assert!(!ensure_manifest(dir.path()).unwrap());
        let raw = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["scripts"]["build"], "docusaurus build");
    }

    #[test]
    fn existing_manifest_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{\"name\":\"custom\"}").unwrap();
        ensure_manifest(dir.path()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("package.json")).unwrap();
        assert!(raw.contains("custom"));
    }

    #[tokio::test]
    async fn missing_npm_fails_install() {
        let dir = tempfile::tempdir().unwrap();
        let builder = NpmSiteBuilder::new("/nonexistent/npm-binary");
        assert!(!builder.install(dir.path()).await);
        assert!(builder.build(dir.path()).await.is_none());
    }
}
