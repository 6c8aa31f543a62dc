//! jobpilot - agentic job search pipeline

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{init_command, run_command, status_command, RunOptions};
use jobpilot_agent::ScrapeMode;

/// jobpilot - let an LLM drive your job search pipeline
#[derive(Parser)]
#[command(name = "jobpilot")]
#[command(about = "◆ Agentic job search pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file (defaults to ~/.jobpilot/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and pipeline directories
    Init,
    /// Run the agent over the pipeline
    Run {
        /// Base resume file
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Use cached raw jobs instead of scraping
        #[arg(long, conflicts_with = "force_scrape")]
        skip_scrape: bool,
        /// Scrape even if the cache is valid
        #[arg(long)]
        force_scrape: bool,
        /// Override the iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Show providers, pipeline files and cache state
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config;
    let result = match cli.command {
        Commands::Init => init_command(config_path).await,
        Commands::Status => status_command(config_path).await,
        Commands::Run {
            resume,
            skip_scrape,
            force_scrape,
            max_iterations,
        } => {
            let mode = if skip_scrape {
                ScrapeMode::Skip
            } else if force_scrape {
                ScrapeMode::Force
            } else {
                ScrapeMode::Auto
            };
            run_command(
                config_path,
                RunOptions {
                    resume,
                    mode,
                    max_iterations,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
