//! arma — Another Redis Memory Analyzer.
//!
//! Thin binary entry point. All logic lives in the `arma-core`
//! and `arma-cli` crates.

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = arma_cli::Cli::parse();

    // Logs go to stderr so reports on stdout can be piped.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("arma {} starting", env!("CARGO_PKG_VERSION"));

    arma_cli::run(cli)
}
