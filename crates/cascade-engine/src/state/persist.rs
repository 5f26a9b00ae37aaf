use anyhow::{Context, Result};
use cascade_store::{write_atomic, StorePaths};
use std::path::PathBuf;

use crate::state::machine::SessionState;

/// Location: `<state_dir>/sessions/<session_id>/state.json`
pub fn state_path(paths: &StorePaths, session_id: &str) -> PathBuf {
    paths.session_dir(session_id).join("state.json")
}

/// Load a continuation record. Returns None if the file doesn't exist.
pub fn load_state(paths: &StorePaths, session_id: &str) -> Result<Option<SessionState>> {
    let path = state_path(paths, session_id);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading state: {}", path.display()))?;
    let state: SessionState = serde_json::from_str(&content)
        .with_context(|| format!("parsing state: {}", path.display()))?;
    Ok(Some(state))
}

/// Save atomically (temp file, then rename).
pub fn save_state(paths: &StorePaths, state: &SessionState) -> Result<()> {
    let path = state_path(paths, &state.session_id);
    let data = serde_json::to_string_pretty(state)?;
    write_atomic(&path, data.as_bytes())
        .with_context(|| format!("saving state: {}", path.display()))?;
    Ok(())
}

pub fn remove_state(paths: &StorePaths, session_id: &str) -> Result<()> {
    let dir = paths.session_dir(session_id);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("removing state: {}", dir.display()))?;
    }
    Ok(())
}

/// Session IDs that have a continuation record on disk.
pub fn list_session_records(paths: &StorePaths) -> Result<Vec<String>> {
    if !paths.sessions_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&paths.sessions_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    ids.sort();
    Ok(ids)
}
