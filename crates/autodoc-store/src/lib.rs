use anyhow::Context;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Short deterministic key for a repository identifier.
/// repo_key = blake3(trimmed identifier, trailing `/` and `.git` removed) → first `len` hex chars.
pub fn repo_key(identifier: &str, len: usize) -> String {
    let normalized = identifier
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .to_lowercase();
    let hash = blake3::hash(normalized.as_bytes());
    let hex = hash.to_hex();
    hex[..len.min(hex.len())].to_string()
}

/// Bookkeeping directory for runs writing into `output_dir`: `{output_dir}/.autodoc/`
pub fn run_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(".autodoc")
}

/// `{output_dir}/.autodoc/events.jsonl`
pub fn events_path(output_dir: &Path) -> PathBuf {
    run_dir(output_dir).join("events.jsonl")
}

/// `{output_dir}/.autodoc/run-status.json`
pub fn status_path(output_dir: &Path) -> PathBuf {
    run_dir(output_dir).join("run-status.json")
}

/// `{output_dir}/.autodoc/state.json`
pub fn state_path(output_dir: &Path) -> PathBuf {
    run_dir(output_dir).join("state.json")
}

/// `{output_dir}/.autodoc/run.lock`
pub fn lock_path(output_dir: &Path) -> PathBuf {
    run_dir(output_dir).join("run.lock")
}

/// Where repositories are cloned for a given output directory.
///
/// Sibling `repos/` of the output directory; falls back to the user cache
/// dir when the output directory has no parent.
pub fn clone_root(output_dir: &Path) -> PathBuf {
    match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("repos"),
        _ => dirs::cache_dir()
            .map(|d| d.join("autodoc").join("repos"))
            .unwrap_or_else(|| PathBuf::from(".autodoc-repos")),
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    write_atomic(path, data.as_bytes()).with_context(|| format!("saving {}", path.display()))
}

/// Load JSON from disk. Returns None if the file doesn't exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

/// File-based exclusive lock guard. Released on drop.
pub struct LockGuard {
    file: fs::File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Acquire an exclusive file lock, blocking. Creates the lock file if needed.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    let file = open_lock(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { file })
}

/// Acquire an exclusive file lock without blocking; errors if already held.
pub fn try_lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    let file = open_lock(path)?;
    file.try_lock_exclusive()
        .with_context(|| format!("another run holds {}", path.display()))?;
    Ok(LockGuard { file })
}

fn open_lock(path: &Path) -> anyhow::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    Ok(file)
}
