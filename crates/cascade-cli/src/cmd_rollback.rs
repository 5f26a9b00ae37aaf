use anyhow::bail;

use cascade_engine::state::persist;
use cascade_engine::CascadeConfig;
use cascade_store::{BackupSet, StateLock};

/// Manual recovery for a session the server can no longer drive.
pub fn execute(config: &CascadeConfig, session_id: &str) -> anyhow::Result<()> {
    let paths = config.paths();
    let _lock = StateLock::acquire(&paths)?;

    let backups = BackupSet::open(&paths, session_id);
    let has_record = persist::state_path(&paths, session_id).exists();
    if !backups.exists() && !has_record {
        bail!("no saved state or backups for session {session_id}");
    }

    let restored = backups.rollback()?;
    persist::remove_state(&paths, session_id)?;
    tracing::info!(session_id, restored = restored.len(), "manual rollback complete");

    if restored.is_empty() {
        println!("Session {session_id}: nothing to restore, state removed");
    } else {
        println!("Session {session_id}: restored {} file(s)", restored.len());
        for path in restored {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_backed_up_files() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CascadeConfig {
            state_dir: tmp.path().join("state"),
            ..Default::default()
        };
        let doc = tmp.path().join("week-feb14-20.md");
        std::fs::write(&doc, "before").unwrap();
        BackupSet::open(&config.paths(), "ses_x")
            .write(&doc, "after")
            .unwrap();

        execute(&config, "ses_x").unwrap();
        assert_eq!(std::fs::read_to_string(&doc).unwrap(), "before");
        assert!(!config.paths().backup_dir("ses_x").exists());
    }

    #[test]
    fn unknown_session_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CascadeConfig {
            state_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(execute(&config, "ses_missing").is_err());
    }
}
