mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "plastron",
    version,
    about = "Lifecycle orchestrator for remote session and app containers"
)]
struct Cli {
    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the orchestrator daemon.
    Run {
        /// Path to the daemon config TOML file.
        #[arg(long, default_value = "plastron.toml")]
        config: PathBuf,
    },
    /// List tracked containers from the persisted snapshot.
    List {
        /// Path to the daemon config TOML file.
        #[arg(long, default_value = "plastron.toml")]
        config: PathBuf,
        /// Only show containers owned by this user.
        #[arg(long)]
        user: Option<String>,
        /// Output results as structured JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PLASTRON_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Run { config } => commands::run::run(&config).await,
        Commands::List { config, user, json } => {
            commands::list::run(&config, user.as_deref(), json)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(commands::EXIT_FAILURE)
        }
    }
}
