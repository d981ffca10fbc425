//! Summoner CLI
//!
//! Opens on-demand tunnels to cloud instances through AWS Systems Manager:
//! - Starts the instance if needed and stops it again afterwards
//! - Keeps the port-forwarding session alive while a client uses it
//! - Launches the RDP, SSH or VNC client for the connection type

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use summoner::commands::{self, TargetArgs};
use summoner::output::print_error;

const DEFAULT_ACCOUNT: &str = "default";

#[derive(Parser)]
#[command(name = "summoner")]
#[command(author, version, about = "On-demand tunnels to cloud instances")]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Path to the session-manager-plugin executable
    #[arg(long, global = true, env = "SUMMONER_PLUGIN")]
    plugin: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a tunnel to an instance and launch a client for it
    Connect {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Start, stop or restart an instance
    Manage {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the instances of an account
    List {
        /// Account name or file
        #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
        account: String,
    },

    /// Create an account file
    Init {
        /// Account name or file
        #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
        account: String,
        /// Local credential profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Default region for the account's instances
        #[arg(short, long)]
        region: Option<String>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show an account file
    Show {
        /// Account name or file
        #[arg(short, long, default_value = DEFAULT_ACCOUNT)]
        account: String,
    },
    /// Show config directory path
    Path,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Connect { target } => commands::connect_command(&target, cli.plugin).await,
        Commands::Manage { target } => commands::manage_command(&target).await,
        Commands::List { account } => commands::list_command(&account),
        Commands::Init {
            account,
            profile,
            region,
            force,
        } => commands::init_command(&account, profile.as_deref(), region.as_deref(), force)
            .map(|_| ()),
        Commands::Config { action } => match action {
            ConfigAction::Show { account } => commands::config_show(&account),
            ConfigAction::Path => {
                commands::config_path();
                Ok(())
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
