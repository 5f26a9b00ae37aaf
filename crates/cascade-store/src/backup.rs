//! Per-session backup sets.
//!
//! Layout: `backups/<session_id>/manifest.json` plus one `<hash>.bak` per
//! backed-up file. The manifest records the original path, so a backup set
//! can be restored without any other session state.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::StorePaths;
use crate::{now_rfc3339, replace_atomic, write_atomic};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    /// Canonical path of the live document.
    pub path: String,
    /// File name of the captured bytes inside the backup dir.
    pub backup_file: String,
    /// Unix permission bits of the live document at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    pub captured_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    session_id: String,
    #[serde(default)]
    entries: Vec<BackupEntry>,
}

/// Backups captured for one session.
pub struct BackupSet {
    session_id: String,
    dir: PathBuf,
}

impl BackupSet {
    pub fn open(paths: &StorePaths, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            dir: paths.backup_dir(session_id),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    fn load_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest {
                session_id: self.session_id.clone(),
                entries: Vec::new(),
            });
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading backup manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing backup manifest: {}", path.display()))
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let data = serde_json::to_string_pretty(manifest)?;
        write_atomic(&self.manifest_path(), data.as_bytes())
            .with_context(|| format!("saving backup manifest: {}", self.dir.display()))
    }

    /// Entries captured so far, in capture order.
    pub fn entries(&self) -> Result<Vec<BackupEntry>> {
        Ok(self.load_manifest()?.entries)
    }

    /// Capture the current bytes of `path` unless this session already has
    /// a backup of it. Returns true if a new backup was taken.
    pub fn backup(&self, path: &Path) -> Result<bool> {
        let target = resolve(path)?;
        let key = target.to_string_lossy().to_string();
        let mut manifest = self.load_manifest()?;
        if manifest.entries.iter().any(|e| e.path == key) {
            return Ok(false);
        }

        let meta = fs::metadata(&target)
            .with_context(|| format!("reading for backup: {}", path.display()))?;
        let bytes =
            fs::read(&target).with_context(|| format!("reading for backup: {}", path.display()))?;
        let backup_file = backup_file_name(&key);
        write_atomic(&self.dir.join(&backup_file), &bytes)
            .with_context(|| format!("writing backup of {}", path.display()))?;

        manifest.entries.push(BackupEntry {
            path: key,
            backup_file,
            mode: mode_of(&meta),
            captured_at: now_rfc3339(),
        });
        self.save_manifest(&manifest)?;
        tracing::debug!(session_id = %self.session_id, path = %path.display(), "backup captured");
        Ok(true)
    }

    /// Replace `path` with `content`, backing up the pre-session bytes first.
    /// A symlinked document is written through the link, at the same file
    /// the backup was taken from.
    pub fn write(&self, path: &Path, content: &str) -> Result<()> {
        let target = resolve(path)?;
        self.backup(&target)?;
        replace_atomic(&target, content.as_bytes(), None)
            .with_context(|| format!("writing document: {}", path.display()))
    }

    /// Restore every backed-up file to its captured bytes, then drop the set.
    /// Returns the restored paths. On partial failure the set is kept so the
    /// rollback can be retried.
    pub fn rollback(&self) -> Result<Vec<PathBuf>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let manifest = self.load_manifest()?;

        let mut restored = Vec::new();
        let mut failures = Vec::new();
        for entry in &manifest.entries {
            let target = PathBuf::from(&entry.path);
            let result = fs::read(self.dir.join(&entry.backup_file))
                .map_err(anyhow::Error::from)
                .and_then(|bytes| {
                    replace_atomic(&target, &bytes, entry.mode.and_then(permissions_from))
                });
            match result {
                Ok(()) => restored.push(target),
                Err(e) => failures.push(format!("{}: {e}", entry.path)),
            }
        }

        if !failures.is_empty() {
            bail!(
                "rollback of session {} incomplete: {}",
                self.session_id,
                failures.join("; ")
            );
        }

        self.cleanup()?;
        tracing::info!(session_id = %self.session_id, count = restored.len(), "backups restored");
        Ok(restored)
    }

    /// Remove the backup set without restoring anything.
    pub fn cleanup(&self) -> Result<()> {
        if self.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("removing backups: {}", self.dir.display()))?;
        }
        Ok(())
    }
}

/// Session IDs that currently have a backup set on disk.
pub fn list_backup_sessions(paths: &StorePaths) -> Result<Vec<String>> {
    if !paths.backups_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&paths.backups_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("resolving document: {}", path.display()))
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn permissions_from(mode: u32) -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn permissions_from(_mode: u32) -> Option<fs::Permissions> {
    None
}

fn backup_file_name(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    format!("{}.bak", &hash.to_hex()[..32])
}
