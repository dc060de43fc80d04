// ABOUTME: MarketWise command line entry point
// ABOUTME: Parses subcommands, initializes logging and dispatches to the server library

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use marketwise_cli::config::Config;
use tracing::error;

#[derive(Parser)]
#[command(name = "marketwise")]
#[command(about = "MarketWise - marketing diagnosis questionnaire server")]
#[command(version)]
struct Cli {
    /// Database URL, overrides MARKETWISE_DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on, overrides MARKETWISE_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the database and apply pending migrations
    Migrate,
    /// Replace the questionnaire catalog from a JSON file
    ImportCatalog {
        /// Path to the catalog document
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let port = match &cli.command {
        Commands::Serve { port } => *port,
        _ => None,
    };
    let config = Config::from_env()?.with_overrides(port, cli.database_url)?;

    match cli.command {
        Commands::Serve { .. } => marketwise_cli::run_server(config).await,
        Commands::Migrate => marketwise_cli::run_migrations(&config).await,
        Commands::ImportCatalog { file } => {
            let summary = marketwise_cli::import_catalog(&config, &file).await?;
            println!(
                "Imported {} stages, {} questions, {} options",
                summary.stages, summary.questions, summary.options
            );
            Ok(())
        }
    }
}
