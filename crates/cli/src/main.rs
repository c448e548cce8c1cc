//! Disha CLI, the main entry point.
//!
//! Commands:
//! - `serve`     — Start the HTTP API
//! - `chat`      — Interactive or single-message chat in the terminal
//! - `init-db`   — Create the database and seed protocols
//! - `history`   — Print a user's recent messages
//! - `memories`  — Print what Disha remembers about a user
//! - `protocols` — List the protocol registry
//! - `config`    — Show, locate or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "disha",
    about = "Disha — health coaching chat backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.disha/config.toml)
    #[arg(short, long, global = true, env = "DISHA_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep everything in memory instead of the database
        #[arg(long)]
        ephemeral: bool,
    },

    /// Chat with Disha in the terminal
    Chat {
        /// Acting user
        #[arg(short, long, default_value = "default_user")]
        user: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Keep everything in memory instead of the database
        #[arg(long)]
        ephemeral: bool,
    },

    /// Create the database and seed built-in protocols
    InitDb,

    /// Show recent messages for a user
    History {
        #[arg(short, long)]
        user: String,

        /// Number of messages to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show stored memories for a user
    Memories {
        #[arg(short, long)]
        user: String,
    },

    /// List protocols
    Protocols,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration for problems
    Validate,
    /// Print a config file with every default filled in
    Default,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(runtime::default_config_path);

    match cli.command {
        Commands::Serve { port, ephemeral } => {
            commands::serve::run(&config_path, port, ephemeral).await?
        }
        Commands::Chat {
            user,
            message,
            ephemeral,
        } => commands::chat::run(&config_path, &user, message, ephemeral).await?,
        Commands::InitDb => commands::init_db::run(&config_path).await?,
        Commands::History { user, limit } => {
            commands::history::run(&config_path, &user, limit).await?
        }
        Commands::Memories { user } => commands::memories::run(&config_path, &user).await?,
        Commands::Protocols => commands::protocols::run(&config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config_path)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
            ConfigAction::Validate => commands::config_cmd::validate(&config_path)?,
            ConfigAction::Default => commands::config_cmd::print_default(),
        },
    }

    Ok(())
}
