use std::path::PathBuf;

use cascade_engine::CascadeConfig;
use clap::Args;

/// Where to find configuration and state.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Config file (default: <state-dir>/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// State directory for sessions and backups (overrides config and CASCADE_STATE_DIR)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// File, then environment, then flags.
    pub fn resolve(&self) -> anyhow::Result<CascadeConfig> {
        let mut config = match &self.state_dir {
            // Look for config.json under the requested state dir.
            Some(dir) if self.config.is_none() => {
                CascadeConfig::load_from(None, Some(dir.clone()))?
            }
            _ => CascadeConfig::load(self.config.as_deref())?,
        };
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        Ok(config)
    }
}

pub fn execute(config: &CascadeConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
