//! devpush - reconcile a component onto a cluster and keep its source in sync

use clap::Parser;
use tracing_subscriber::EnvFilter;

use devpush_cli::cli::Cli;
use devpush_cli::output::json;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "DEVPUSH_LOG";

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = cli.json;

    if let Err(e) = cli.run().await {
        let message = format!("{e:#}");
        match json::format_error(&message, json::error_code(&e)) {
            Ok(obj) if json_mode => println!("{obj}"),
            _ => eprintln!("Error: {message}"),
        }
        std::process::exit(1);
    }
}
