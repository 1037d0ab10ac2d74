use clap::{Parser, Subcommand};

const EXAMPLES: &str = "Examples:
  pg-r2-backup doctor
  pg-r2-backup run
  pg-r2-backup daemon
  pg-r2-backup config show
  pg-r2-backup init
  pg-r2-backup schedule";

#[derive(Debug, Parser)]
#[command(
    name = "pg-r2-backup",
    version,
    about = "PostgreSQL backup tool for Cloudflare R2",
    after_help = EXAMPLES
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run backup immediately
    Run,
    /// Run a backup now, then daily at BACKUP_TIME (UTC)
    Daemon,
    /// Check environment & dependencies
    Doctor,
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommand>,
    },
    /// Create .env from .env.example
    Init,
    /// Show scheduling examples
    Schedule,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
