pub mod backup;
pub mod discover;
pub mod lock;
pub mod paths;

pub use backup::{list_backup_sessions, BackupEntry, BackupSet};
pub use discover::discover;
pub use lock::StateLock;
pub use paths::StorePaths;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Return the default state root: `<data_dir>/cascade/`
/// Falls back to `~/.cascade/`, then `./.cascade-state`.
pub fn store_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("cascade")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".cascade")
    } else {
        PathBuf::from(".cascade-state")
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    persist_via_temp(path, data, None)
}

/// Atomic replace of a user document. The new file gets `perms` if given,
/// otherwise the permissions of the file it replaces.
pub fn replace_atomic(
    path: &Path,
    data: &[u8],
    perms: Option<fs::Permissions>,
) -> anyhow::Result<()> {
    let perms = perms.or_else(|| fs::metadata(path).ok().map(|m| m.permissions()));
    persist_via_temp(path, data, perms)
}

fn persist_via_temp(
    path: &Path,
    data: &[u8],
    perms: Option<fs::Permissions>,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    if let Some(perms) = perms {
        tmp.as_file().set_permissions(perms)?;
    }
    tmp.persist(path)?;
    Ok(())
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
