use anyhow::{Context, Result};
use cascade_llm::LlmSettings;
use cascade_store::StorePaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const STATE_DIR_ENV: &str = "CASCADE_STATE_DIR";

// ── Config ──

/// Service configuration, stored as JSON in `<state_dir>/config.json`.
/// Every field is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CascadeConfig {
    pub state_dir: PathBuf,
    pub session_ttl_hours: u32,
    pub bind: String,
    pub port: u16,
    pub log_filter: String,
    pub llm: LlmSettings,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            state_dir: cascade_store::store_root(),
            session_ttl_hours: 24,
            bind: "127.0.0.1".to_string(),
            port: 3456,
            log_filter: "info".to_string(),
            llm: LlmSettings::default(),
        }
    }
}

impl CascadeConfig {
    /// Load from `explicit`, or from `config.json` in the state dir when it
    /// exists. `CASCADE_STATE_DIR` overrides the state dir either way.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_state_dir = std::env::var_os(STATE_DIR_ENV).map(PathBuf::from);
        Self::load_from(explicit, env_state_dir)
    }

    pub fn load_from(explicit: Option<&Path>, env_state_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let root = env_state_dir
                    .clone()
                    .unwrap_or_else(cascade_store::store_root);
                let path = StorePaths::discover(root).config_json;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    Self::default()
                }
            }
        };
        if let Some(dir) = env_state_dir {
            config.state_dir = dir;
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    }

    pub fn paths(&self) -> StorePaths {
        StorePaths::discover(&self.state_dir)
    }

    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.session_ttl_hours))
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
