//! sqlgate CLI - HTTP gateway for ad-hoc SQL
//!
//! Runs a small HTTP server that executes SQL statements on a pooled
//! PostgreSQL connection:
//! - `POST /query` with `{sql, params, method}`
//! - `GET /ping`, `GET /` and `GET /health` for liveness checks

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

mod env;
mod server;
mod tracing_setup;

use server::ServeArgs;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "sqlgate",
    author,
    version,
    about = "Minimal HTTP gateway for running ad-hoc SQL against PostgreSQL",
    long_about = "Accepts a SQL statement with positional parameters over HTTP, runs it on a \
                  pooled PostgreSQL connection and returns the rows as JSON. There is no \
                  authentication: only expose it to trusted callers."
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = env::load_dotenv();
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig { debug: cli.debug }).ok();
    if loaded.is_empty() {
        debug!("No .env files found (current dir or ~/.sqlgate)");
    }
    for path in &loaded {
        info!("Loaded configuration from {}", path.display());
    }

    match cli.command {
        Commands::Serve(args) => server::run_serve(args).await?,
    }

    Ok(())
}
