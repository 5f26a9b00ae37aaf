use crate::paths::StorePaths;
use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};

/// Ownership of a state directory's sessions and backups.
///
/// Continuation records and backup sets are only meaningful to the process
/// holding the credentials in its registry, so `serve` holds this for its
/// whole run and a manual `rollback` takes it before touching anything.
/// Dropping the lock releases the directory.
pub struct StateLock {
    _file: File,
}

impl StateLock {
    /// Non-blocking. Fails if another server or rollback owns the directory.
    pub fn acquire(paths: &StorePaths) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&paths.root)
            .with_context(|| format!("creating state dir {}", paths.root.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .with_context(|| format!("opening lock file {}", paths.lock_file.display()))?;

        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "sessions in {} are owned by another cascade process",
                paths.root.display()
            );
        }
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_owner_is_refused_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let p = StorePaths::discover(tmp.path().join("state"));

        let held = StateLock::acquire(&p).unwrap();
        let err = StateLock::acquire(&p).err().unwrap();
        assert!(err.to_string().contains("owned by another cascade process"));
        drop(held);
        assert!(StateLock::acquire(&p).is_ok());
    }
}
