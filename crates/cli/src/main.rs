//! Service manager CLI
//!
//! Generates reverse-proxy routing from compose labels, inspects the
//! discovered services and runs the autoscaler in the foreground.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{discover, generate, hosts, monitor, status};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Service manager CLI
#[derive(Parser)]
#[command(name = "tsm")]
#[command(
    author,
    version,
    about = "Service manager for compose stacks behind a reverse proxy",
    long_about = None
)]
pub struct Cli {
    /// Manager configuration file (YAML, TOML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Compose file to discover services from
    #[arg(long, env = "TSM_COMPOSE_FILE")]
    pub compose_file: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the routing document from compose labels
    Generate {
        /// Directory to write services.yml into
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Address backends by swarm service name
        #[arg(long)]
        swarm: bool,

        /// Regenerate whenever the compose file changes
        #[arg(long, short)]
        watch: bool,
    },

    /// List discovered services
    Discover,

    /// Show container status for compose services
    Status {
        /// Only show this service
        #[arg(long, short)]
        service: Option<String>,
    },

    /// Print a hosts-file line for every routed domain
    Hosts {
        /// Address the domains resolve to
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        /// Write the line to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the autoscaler in the foreground until Ctrl+C
    Monitor {
        /// Log scale decisions without executing them
        #[arg(long)]
        dry_run: bool,

        /// Seconds between checks
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let defaults = config::Config::load()?;
    let settings = config::Settings::resolve(
        defaults,
        config::Overrides {
            config_path: cli.config,
            compose_file: cli.compose_file,
            format: cli.format,
        },
    )?;

    match cli.command {
        Commands::Generate {
            output_dir,
            swarm,
            watch,
        } => {
            let options = generate::GenerateOptions {
                output_dir,
                swarm,
            };
            if watch {
                generate::watch(&settings, &options).await?;
            } else {
                generate::generate(&settings, &options).await?;
            }
        }
        Commands::Discover => discover::discover(&settings)?,
        Commands::Status { service } => status::status(&settings, service.as_deref()).await?,
        Commands::Hosts { ip, output } => hosts::hosts(&settings, &ip, output.as_deref())?,
        Commands::Monitor { dry_run, interval } => {
            monitor::monitor(settings, dry_run, interval).await?
        }
    }

    Ok(())
}
