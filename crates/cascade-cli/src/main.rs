mod cmd_config;
mod cmd_levels;
mod cmd_rollback;
mod cmd_serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd_config::ConfigArgs;

#[derive(Parser)]
#[command(
    name = "cascade",
    version,
    about = "Propagate reprioritization requests through planning documents"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Show which document is authoritative for each level
    Levels {
        /// Document directory (default: current directory)
        dir: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore the files a session changed and drop its saved state
    Rollback {
        /// Session ID (ses_...)
        session_id: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the effective configuration
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the config filter.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve { bind, port, config } => {
            let config = config.resolve()?;
            init_tracing(&config.log_filter);
            cmd_serve::execute(config, bind, port)
        }
        Command::Levels { dir, json } => {
            let dir = match dir {
                Some(d) => d,
                None => std::env::current_dir()?,
            };
            cmd_levels::execute(&dir, json)
        }
        Command::Rollback { session_id, config } => {
            let config = config.resolve()?;
            init_tracing(&config.log_filter);
            cmd_rollback::execute(&config, &session_id)
        }
        Command::Config { config } => cmd_config::execute(&config.resolve()?),
    }
}
