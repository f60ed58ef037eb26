use std::path::PathBuf;

use clap::Parser;
use swerve_module_runtime::config::RuntimeConfig;
use tracing_subscriber::EnvFilter;

/// Swerve module runtime: drives four modules from zenoh commands
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON platform config; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match RuntimeConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = swerve_module_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
