//! # trustwipe entry point
//!
//! Parses arguments and dispatches to the subcommand handlers in
//! `tw_cli`.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use tw_cli::commands::{
    run_hash, run_recommend, run_verify, HashArgs, RecommendArgs, VerifyArgs,
};
use tw_cli::serve::{run_serve, ServeArgs};
use tw_cli::telemetry;
use tw_cli::{Config, LogFormat};

/// TrustWipe backend.
///
/// Verifiable data-sanitization workflow: wipe job orchestration, signed
/// certificate verification, ledger anchoring, and partner delivery.
#[derive(Parser, Debug)]
#[command(name = "trustwipe", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker pools and the health/metrics listener.
    Serve(ServeArgs),

    /// Recommend a wipe method for a medium, scope, and NIST category.
    Recommend(RecommendArgs),

    /// Verify a detached PKCS#7 signature over a JSON document.
    Verify(VerifyArgs),

    /// Print the canonical SHA-256 content hash of a JSON document.
    Hash(HashArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => serve(&args).await,
        Commands::Recommend(args) => offline(|| run_recommend(&args)),
        Commands::Verify(args) => offline(|| run_verify(&args)),
        Commands::Hash(args) => offline(|| run_hash(&args)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn serve(args: &ServeArgs) -> anyhow::Result<u8> {
    let config = Config::from_env();
    let format = config.as_ref().map(|c| c.log_format).unwrap_or_default();
    telemetry::init_tracing(format, "info");
    let config = config?;
    let metrics = telemetry::install_metrics()?;
    run_serve(args, config, metrics).await
}

fn offline(run: impl FnOnce() -> anyhow::Result<u8>) -> anyhow::Result<u8> {
    telemetry::init_tracing(LogFormat::Text, "warn");
    run()
}
