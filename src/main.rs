//! genstudio CLI binary entry point.

use clap::Parser;
use genstudio::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("GENSTUDIO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = genstudio::cli::run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
