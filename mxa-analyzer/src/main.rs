//! mxa-analyzer - Micro-expression analysis service and CLI
//!
//! `serve` runs the HTTP API; the other subcommands use the same analyzer
//! and database directly from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use mxa_analyzer::types::ImageRef;
use mxa_analyzer::{build_router, Analyzer, AppState};
use mxa_common::config::TomlConfig;

/// Command-line arguments for mxa-analyzer
#[derive(Parser, Debug)]
#[command(name = "mxa-analyzer")]
#[command(about = "Micro-expression analysis engine")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "MXA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Analyze one image file and store the results
    Analyze {
        image: PathBuf,
        /// Comma-separated method identifiers (default: configured list)
        #[arg(short, long, value_delimiter = ',')]
        methods: Option<Vec<String>>,
    },
    /// Show stored results, most recent first
    Results {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Only results for this image reference
        #[arg(long)]
        image: Option<String>,
    },
    /// Show aggregate statistics over all stored results
    Stats,
    /// List the method vocabulary
    Methods,
    /// Report which model artifacts and strategies are available
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    mxa_common::logging::init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("mxa-analyzer {} ({} {})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"), env!("BUILD_PROFILE"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = mxa_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let analyzer = Analyzer::new(pool, &config);

    match args.command {
        Command::Serve { port } => serve(analyzer, &config, port).await,
        Command::Analyze { image, methods } => {
            let records = analyzer
                .analyze(&ImageRef::Path(image), methods.as_deref())
                .await
                .context("Analysis failed")?;
            print_json(&records)
        }
        Command::Results { limit, image } => {
            let results = analyzer
                .results(limit, image.as_deref())
                .await
                .context("Failed to query results")?;
            print_json(&results)
        }
        Command::Stats => {
            let statistics = analyzer.statistics().await.context("Failed to compute statistics")?;
            print_json(&statistics)
        }
        Command::Methods => print_json(&analyzer.methods()),
        Command::Capabilities => print_json(&analyzer.capabilities()),
    }
}

async fn serve(analyzer: Analyzer, config: &TomlConfig, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);

    let app = build_router(AppState::new(analyzer));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
