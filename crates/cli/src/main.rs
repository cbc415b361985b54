//! SQLPilot CLI, the main entry point.
//!
//! Commands:
//! - `ask`     Answer a question about the configured database
//! - `tables`  List the tables the agent can see
//! - `config`  Print the effective configuration
//! - `doctor`  Check the database and inference server

use clap::{Parser, Subcommand};
use sqlpilot_config::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "sqlpilot",
    about = "SQLPilot: ask questions about a SQL database",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question; the agent explores the database to answer it
    Ask {
        /// The question in natural language
        question: String,

        /// Wait for whole completions instead of streaming them
        #[arg(long)]
        no_stream: bool,

        /// Print every tool round to stderr
        #[arg(long)]
        show_steps: bool,
    },

    /// List the tables in the configured database
    Tables,

    /// Print the effective configuration as TOML
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },

    /// Check that the database and inference server are reachable
    Doctor,
}

fn init_tracing(verbose: bool, json: bool, configured_level: &str) {
    let fallback = if verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // stdout carries the answer; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    init_tracing(cli.verbose, cli.log_json, &config.log_level);

    match cli.command {
        Commands::Ask {
            question,
            no_stream,
            show_steps,
        } => commands::ask::run(&config, &question, !no_stream, show_steps).await?,
        Commands::Tables => commands::tables::run(&config).await?,
        Commands::Doctor => commands::doctor::run(&config).await?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path()
            } else {
                commands::config_cmd::show(&config)
            }
        }
    }

    Ok(())
}
