#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Parser, Subcommand};
use phrasebook::{OutputFormat, StoreConfig};
use tracing::Level;

mod commands;

use commands::init::InitArgs;
use commands::snapshot::SnapshotArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.phrasebook/phrasebook.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table, json, json-pretty
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the store and apply pending migrations.
    Init(InitArgs),

    /// Show the store file, applied migrations and pending migrations.
    Status,

    /// List pending migrations in the order they would be applied.
    Pending,

    /// Create, list, prune or restore store snapshots.
    Snapshot(SnapshotArgs),

    /// Show the effective configuration.
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match StoreConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::run(&config, args, cli.format).await,
        Commands::Status => commands::status::run(&config, cli.format),
        Commands::Pending => commands::status::run_pending(&config, cli.format),
        Commands::Snapshot(args) => commands::snapshot::run(&config, args, cli.format),
        Commands::Config => commands::config::run(&config, cli.config.as_deref(), cli.format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}
