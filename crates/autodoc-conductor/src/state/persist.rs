use anyhow::{Context, Result};
use autodoc_core::WorkflowState;
use std::path::Path;

/// Load the last persisted run state. Returns None if no run has written one.
/// Location: `{output_dir}/.autodoc/state.json`
pub fn load_state(output_dir: &Path) -> Result<Option<WorkflowState>> {
    autodoc_store::load_json(&autodoc_store::state_path(output_dir))
}

/// Save state atomically (write to temp file, then rename).
pub fn save_state(output_dir: &Path, state: &WorkflowState) -> Result<()> {
    let path = autodoc_store::state_path(output_dir);
    autodoc_store::save_json(&path, state)
        .with_context(|| format!("saving state: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodoc_core::MessageType;

    #[test]
    fn load_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(dir.path()).unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = WorkflowState::new("https://example.com/r.git", dir.path().to_string_lossy());
        state.push_message("RepoCloner", MessageType::Info, "started");
        state.docs_location = Some("/tmp/docs".into());

        save_state(dir.path(), &state).unwrap();
        let loaded = load_state(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = WorkflowState::new("r", "o");
        save_state(dir.path(), &state).unwrap();
        state.build_location = Some("/tmp/o/build".into());
        save_state(dir.path(), &state).unwrap();

        let loaded = load_state(dir.path()).unwrap().unwrap();
        assert!(loaded.is_success());
    }
}
