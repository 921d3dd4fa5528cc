//! # logsift CLI
//!
//! One binary for every role: the collector (`serve`), the per-host agent
//! (`agent`), and the operator queries over stored results.
//!
//! ## Usage
//!
//! ```bash
//! logsift --config ./config/logsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logsift init` | Create the SQLite database and schema |
//! | `logsift serve` | Run the ingestion collector |
//! | `logsift agent` | Run the collection agent on this host |
//! | `logsift results <source>` | Recent results for one host |
//! | `logsift problems` | Recent results whose status is not `ok` |
//! | `logsift stats` | Record totals per status |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use logsift::agent::Agent;
use logsift::{config, logging, migrate, report, server};

/// logsift: kernel-log anomaly triage for a fleet of hosts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/logsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "logsift",
    about = "logsift: kernel-log anomaly triage for a fleet of hosts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the ingestion collector.
    ///
    /// Requires the shared secret in the environment variable named by
    /// `server.api_key_env` and at least one `[[analysis.endpoints]]`.
    Serve,

    /// Run the collection agent until interrupted.
    Agent,

    /// Show the most recent results for one source.
    Results {
        /// Hostname the agent reported.
        source: String,

        /// Maximum number of records.
        #[arg(long, default_value_t = report::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Show the most recent results that need attention.
    Problems {
        /// Maximum number of records.
        #[arg(long, default_value_t = report::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Show record counts per status.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Agent => {
            let agent = Agent::new(cfg.agent_settings()?)?;
            agent.run().await?;
        }
        Commands::Results { source, limit } => {
            report::run_results(&cfg, &source, limit).await?;
        }
        Commands::Problems { limit } => {
            report::run_problems(&cfg, limit).await?;
        }
        Commands::Stats => {
            report::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
