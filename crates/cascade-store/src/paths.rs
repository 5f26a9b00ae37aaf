use std::path::{Path, PathBuf};

/// Well-known paths under the state directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub backups_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub lock_file: PathBuf,
    pub config_json: PathBuf,
}

impl StorePaths {
    /// Derive all paths from a state root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            backups_dir: root.join("backups"),
            sessions_dir: root.join("sessions"),
            lock_file: root.join("LOCK"),
            config_json: root.join("config.json"),
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [&self.root, &self.backups_dir, &self.sessions_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Backup set directory: `backups/<session_id>/`
    pub fn backup_dir(&self, session_id: &str) -> PathBuf {
        self.backups_dir.join(session_id)
    }

    /// Continuation record directory: `sessions/<session_id>/`
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// True if `dir` and the state directory nest in either direction.
    /// Backups must never live inside a directory whose documents they cover.
    pub fn overlaps(&self, dir: &Path) -> bool {
        let root = resolve(&self.root);
        let dir = resolve(dir);
        dir.starts_with(&root) || root.starts_with(&dir)
    }
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
