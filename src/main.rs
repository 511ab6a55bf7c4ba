//! sandbox-run CLI
//!
//! Runs one command line in an isolate box and prints the outcome as JSON.

use std::path::PathBuf;

use boxpool::{CommandLine, Result, SandboxConfig, SandboxService};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command line>", args[0]);
        eprintln!("\nRuns the command in a freshly reset isolate box.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  SANDBOX_CONFIG=<path>  TOML configuration file (default: built-in defaults)");
        std::process::exit(1);
    }

    let config = match std::env::var_os("SANDBOX_CONFIG").map(PathBuf::from) {
        Some(path) => match SandboxConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => SandboxConfig::default(),
    };

    let service = match SandboxService::from_config(&config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let command = match command_from_args(&args[1..]) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(command = ?command.argv(), "starting run");

    match service.run_async(command, None).await {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to encode outcome: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// The shell already split the words; keep them as they arrived.
fn command_from_args(args: &[String]) -> Result<CommandLine> {
    CommandLine::from_argv(args.iter().cloned())
}
