//! In-process stand-ins for the external collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use autodoc_core::RepositoryInfo;

use super::acquire::{AcquisitionError, RepositoryAcquirer};
use super::analyze::{Analysis, CodeAnalyzer};
use super::completion::{CompletionClient, CompletionError, CompletionRequest};
use super::site::SiteBuilder;

// ── Acquirer ──

pub struct MockAcquirer {
    result: Mutex<Option<Result<RepositoryInfo, AcquisitionError>>>,
    repo: Option<RepositoryInfo>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockAcquirer {
    /// Always hands back `repo`.
    pub fn returning(repo: RepositoryInfo) -> Self {
        Self {
            result: Mutex::new(None),
            repo: Some(repo),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first call with `error`.
    pub fn failing(error: AcquisitionError) -> Self {
        Self {
            result: Mutex::new(Some(Err(error))),
            repo: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(identifier, credentials)` of every call.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

/// Repository description for a local checkout, as an acquirer would report it.
pub fn local_repo(name: &str, path: &Path) -> RepositoryInfo {
    RepositoryInfo {
        name: name.to_string(),
        url: format!("https://github.com/acme/{name}"),
        local_path: path.to_string_lossy().to_string(),
        default_branch: "main".to_string(),
        languages: vec!["Python".to_string()],
        description: Some(format!("The {name} project.")),
        is_private: false,
    }
}

#[async_trait::async_trait]
impl RepositoryAcquirer for MockAcquirer {
    async fn acquire(
        &self,
        identifier: &str,
        credentials: Option<&str>,
        _workdir: &Path,
    ) -> Result<RepositoryInfo, AcquisitionError> {
        self.calls
            .lock()
            .unwrap()
            .push((identifier.to_string(), credentials.map(String::from)));
        if let Some(result) = self.result.lock().unwrap().take() {
            return result;
        }
        self.repo
            .clone()
            .ok_or_else(|| AcquisitionError::InvalidUrl(identifier.to_string()))
    }
}

// ── Analyzer ──

pub enum MockAnalysis {
    Ok(Analysis),
    Err(String),
    Panic(String),
}

pub struct MockAnalyzer {
    behavior: MockAnalysis,
}

impl MockAnalyzer {
    pub fn new(behavior: MockAnalysis) -> Self {
        Self { behavior }
    }
}

#[async_trait::async_trait]
impl CodeAnalyzer for MockAnalyzer {
    async fn analyze(&self, _repo: &RepositoryInfo) -> Result<Analysis> {
        match &self.behavior {
            MockAnalysis::Ok(a) => Ok(a.clone()),
            MockAnalysis::Err(m) => Err(anyhow::anyhow!("{m}")),
            MockAnalysis::Panic(m) => panic!("{m}"),
        }
    }
}

// ── Completion ──

/// Scripted completion service.
///
/// The first rule whose needle occurs in the prompt supplies the reply;
/// otherwise the default reply is used.
pub struct MockCompletion {
    rules: Vec<(String, String)>,
    default_reply: String,
    failure: Option<CompletionError>,
    calls: Mutex<Vec<CompletionRequest>>,
    embeds: AtomicUsize,
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new("(mock) generated text")
    }
}

impl MockCompletion {
    pub fn new(default_reply: &str) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: default_reply.to_string(),
            failure: None,
            calls: Mutex::new(Vec::new()),
            embeds: AtomicUsize::new(0),
        }
    }

    pub fn rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Every call fails with `error`.
    pub fn failing(error: CompletionError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn embed_count(&self) -> usize {
        self.embeds.load(Ordering::SeqCst)
    }
}

/// Deterministic 8-dimensional embedding of `text`.
pub fn fake_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += b as f32 / 255.0;
    }
    v[0] += 1.0;
    v
}

#[async_trait::async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());
        Ok(reply)
    }

    async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, CompletionError> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        Ok(fake_embedding(text))
    }
}

// ── Site builder ──

pub struct MockSiteBuilder {
    install_ok: bool,
    build_result: Option<String>,
    installs: AtomicUsize,
    builds: AtomicUsize,
}

impl MockSiteBuilder {
    /// Install succeeds; build reports `{docs}/build` (and creates it).
    pub fn succeeding() -> Self {
        Self {
            install_ok: true,
            build_result: None,
            installs: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn install_fails() -> Self {
        Self {
            install_ok: false,
            ..Self::succeeding()
        }
    }

    /// Install succeeds but the build produces nothing.
    pub fn build_fails() -> Self {
        Self {
            build_result: Some(String::new()),
            ..Self::succeeding()
        }
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SiteBuilder for MockSiteBuilder {
    async fn install(&self, _docs_dir: &Path) -> bool {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.install_ok
    }

    async fn build(&self, docs_dir: &Path) -> Option<String> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        match &self.build_result {
            Some(r) if r.is_empty() => None,
            Some(r) => Some(r.clone()),
            None => {
                let out: PathBuf = docs_dir.join("build");
                std::fs::create_dir_all(&out).ok()?;
                Some(out.to_string_lossy().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_rules_match_prompt() {
        let mock = MockCompletion::new("fallback").rule("Translate", "xin chao");
        let hit = mock
            .complete(&CompletionRequest::new("m", "Translate this"))
            .await
            .unwrap();
        let miss = mock.complete(&CompletionRequest::new("m", "Summarize")).await.unwrap();
        assert_eq!(hit, "xin chao");
        assert_eq!(miss, "fallback");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_completion_errors_every_call() {
        let mock = MockCompletion::failing(CompletionError::RateLimited);
        assert!(mock.complete(&CompletionRequest::new("m", "x")).await.is_err());
        assert!(mock.embed("e", "x").await.is_err());
    }

    #[test]
    fn embeddings_are_deterministic() {
        assert_eq!(fake_embedding("abc"), fake_embedding("abc"));
        assert_ne!(fake_embedding("abc"), fake_embedding("xyz"));
        assert_eq!(fake_embedding("").len(), 8);
    }

    #[tokio::test]
    async fn acquirer_failure_then_success() {
        let mock = MockAcquirer::failing(AcquisitionError::Authentication);
        let err = mock.acquire("https://x/y", Some("t"), Path::new("/tmp")).await;
        assert!(matches!(err, Err(AcquisitionError::Authentication)));
        assert_eq!(mock.calls(), vec![("https://x/y".to_string(), Some("t".to_string()))]);
    }

    #[tokio::test]
    async fn site_builder_creates_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockSiteBuilder::succeeding();
        assert!(mock.install(dir.path()).await);
        let out = mock.build(dir.path()).await.unwrap();
        assert!(Path::new(&out).is_dir());
        assert!(MockSiteBuilder::build_fails().build(dir.path()).await.is_none());
    }
}
