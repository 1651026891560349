use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use autodoc_core::RepositoryInfo;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid repository identifier: {0}")]
    InvalidUrl(String),
    #[error(
        "authentication failed; if this is a private repository, provide a valid GitHub personal access token"
    )]
    Authentication,
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches a repository and describes it.
#[async_trait::async_trait]
pub trait RepositoryAcquirer: Send + Sync {
    async fn acquire(
        &self,
        identifier: &str,
        credentials: Option<&str>,
        workdir: &Path,
    ) -> Result<RepositoryInfo, AcquisitionError>;
}

// ── Naming ──

fn github_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"github\.com[/:]([^/]+)/([^/.]+?)(?:\.git)?/?$").expect("static regex")
    })
}

/// Directory name for a repository: `owner_repo` for GitHub URLs,
/// otherwise the last path segment without `.git`.
pub fn repo_name(identifier: &str) -> Result<String, AcquisitionError> {
    let trimmed = identifier.trim();
    if let Some(caps) = github_pattern().captures(trimmed) {
        return Ok(format!("{}_{}", &caps[1], &caps[2]));
    }
    let last = trimmed
        .trim_end_matches('/')
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or("");
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name == "." || name == ".." {
        return Err(AcquisitionError::InvalidUrl(identifier.to_string()));
    }
    Ok(name.to_string())
}

/// `https://host/...` → `https://TOKEN@host/...`. Other schemes are left alone.
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match (token, url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !token.is_empty() => format!("https://{token}@{rest}"),
        _ => url.to_string(),
    }
}

fn local_source(identifier: &str) -> Option<PathBuf> {
    if let Some(path) = identifier.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    let path = Path::new(identifier);
    path.is_dir().then(|| path.to_path_buf())
}

// ── Inspection ──

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("jsx", "JavaScript"),
    ("tsx", "TypeScript"),
    ("java", "Java"),
    ("c", "C"),
    ("cpp", "C++"),
    ("cs", "C#"),
    ("go", "Go"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("swift", "Swift"),
    ("kt", "Kotlin"),
    ("rs", "Rust"),
];

/// Languages ordered by file count, most frequent first. `.git` is skipped.
pub fn detect_languages(root: &Path) -> Vec<String> {
    let extensions: HashMap<&str, &str> = LANGUAGE_EXTENSIONS.iter().copied().collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry.path().extension().and_then(|e| e.to_str());
        if let Some(lang) = ext.and_then(|e| extensions.get(e).copied()) {
            *counts.entry(lang).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.into_iter().map(|(l, _)| l.to_string()).collect()
}

const README_NAMES: &[&str] = &["README.md", "Readme.md", "readme.md", "README.txt", "README"];
const DESCRIPTION_LIMIT: usize = 500;

/// First paragraph of the README after leading headings and blank lines.
pub fn readme_description(root: &Path) -> Option<String> {
    for name in README_NAMES {
        let Ok(content) = std::fs::read_to_string(root.join(name)) else {
            continue;
        };
        let paragraph: Vec<&str> = content
            .lines()
            .map(str::trim)
            .skip_while(|l| l.is_empty() || l.starts_with('#'))
            .take_while(|l| !l.is_empty())
            .collect();
        if !paragraph.is_empty() {
            return Some(paragraph.join(" ").chars().take(DESCRIPTION_LIMIT).collect());
        }
    }
    None
}

// ── GitAcquirer ──

/// Shallow-clones with the `git` CLI. Local directories are used in place.
pub struct GitAcquirer {
    pub git_bin: PathBuf,
}

impl Default for GitAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl GitAcquirer {
    pub fn new() -> Self {
        Self {
            git_bin: PathBuf::from("git"),
        }
    }

    pub fn with_bin(git_bin: PathBuf) -> Self {
        Self { git_bin }
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, AcquisitionError> {
        let mut cmd = tokio::process::Command::new(&self.git_bin);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let lower = stderr.to_lowercase();
        if lower.contains("authentication failed") || lower.contains("could not read username") {
            return Err(AcquisitionError::Authentication);
        }
        Err(AcquisitionError::Git {
            command: args.first().copied().unwrap_or("").to_string(),
            stderr,
        })
    }

    async fn default_branch(&self, repo: &Path) -> String {
        match self.git(&["rev-parse", "--abbrev-ref", "HEAD"], Some(repo)).await {
            Ok(branch) if !branch.is_empty() && branch != "HEAD" => branch,
            _ => "main".to_string(),
        }
    }

    async fn describe(
        &self,
        identifier: &str,
        local_path: &Path,
        is_private: bool,
    ) -> Result<RepositoryInfo, AcquisitionError> {
        let default_branch = self.default_branch(local_path).await;
        let root = local_path.to_path_buf();
        let (languages, description) = tokio::task::spawn_blocking(move || {
            (detect_languages(&root), readme_description(&root))
        })
        .await
        .map_err(|e| AcquisitionError::Io(std::io::Error::other(e)))?;

        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| identifier.to_string());

        Ok(RepositoryInfo {
            name,
            url: identifier.to_string(),
            local_path: local_path.to_string_lossy().to_string(),
            default_branch,
            languages,
            description,
            is_private,
        })
    }
}

#[async_trait::async_trait]
impl RepositoryAcquirer for GitAcquirer {
    async fn acquire(
        &self,
        identifier: &str,
        credentials: Option<&str>,
        workdir: &Path,
    ) -> Result<RepositoryInfo, AcquisitionError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AcquisitionError::InvalidUrl(String::new()));
        }

        if let Some(path) = local_source(identifier) {
            if !path.is_dir() {
                return Err(AcquisitionError::InvalidUrl(identifier.to_string()));
            }
            info!(path = %path.display(), "using local repository in place");
            return self.describe(identifier, &path, false).await;
        }

        let name = repo_name(identifier)?;
        let target = workdir.join(&name);
        if target.exists() {
            debug!(path = %target.display(), "removing previous clone");
            tokio::fs::remove_dir_all(&target).await?;
        }
        tokio::fs::create_dir_all(workdir).await?;

        let clone_url = authenticated_url(identifier, credentials);
        let target_str = target.to_string_lossy().to_string();
        info!(repo = identifier, path = %target.display(), "cloning repository");
        self.git(&["clone", "--depth", "1", &clone_url, &target_str], None)
            .await
            .map_err(|e| match e {
                AcquisitionError::Git { command, stderr } => AcquisitionError::Git {
                    command,
                    stderr: redact(&stderr, credentials),
                },
                other => other,
            })?;

        self.describe(identifier, &target, credentials.is_some_and(|t| !t.is_empty()))
            .await
    }
}

fn redact(text: &str, token: Option<&str>) -> String {
    match token {
        Some(t) if !t.is_empty() => text.replace(t, "***"),
        _ => text.to_string(),
    }
}
