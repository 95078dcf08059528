// ABOUTME: CLI entry point for tail-replicator
// ABOUTME: Parses commands, initializes logging and TLS policy, and routes to handlers

use clap::{Parser, Subcommand};
use tail_replicator::commands;

#[derive(Parser)]
#[command(name = "tail-replicator")]
#[command(
    about = "Copy the newest rows of selected tables from one PostgreSQL database to another",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy rows from the tail of each source table that the target does not have yet
    Sync {
        #[command(flatten)]
        args: commands::sync::SyncArgs,
    },
    /// Validate configuration and connectivity, and list eligible tables
    Check {
        #[command(flatten)]
        args: commands::RunArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tail_replicator::postgres::init_tls_policy(cli.allow_self_signed_certs);

    match cli.command {
        Commands::Sync { args } => {
            if !commands::sync(args).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Check { args } => commands::check(args).await,
    }
}
