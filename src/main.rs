use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gatewatch")]
#[command(version, about = "Watches log streams and bans offending IPs", long_about = None)]
struct Cli {
    /// Path to the TOML rule configuration.
    #[arg(short, long, default_value = "./gatewatch.toml")]
    config: PathBuf,

    /// Force debug-level logging regardless of RUST_LOG / the config's log_level.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    println!("gatewatch {}", env!("CARGO_PKG_VERSION"));

    let raw_config = match gatewatch::config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            init_tracing("gatewatch=info", cli.verbose);
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&format!("gatewatch={}", raw_config.log_level), cli.verbose);

    match gatewatch::cli::run_with_config(raw_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gatewatch exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_directive: &str, verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("gatewatch=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_directive.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
