mod commands;
mod config;
mod dispatcher;
mod error;
mod grammar;
mod installer;
mod manifest;
mod registry;
mod source;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "grammar-sync",
    about = "Fetch TextMate grammars and normalize them to JSON keyed by scope"
)]
struct Cli {
    /// Install one source and merge it into the manifest instead of refreshing everything
    #[arg(long, value_name = "DESCRIPTOR")]
    add: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let root = PathBuf::from(".");
    let result = match cli.add {
        Some(descriptor) => commands::add(&root, &descriptor),
        None => commands::refresh(&root),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Log to stderr so stdout carries only per-source summaries.
/// Level comes from `RUST_LOG`, defaulting to `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
