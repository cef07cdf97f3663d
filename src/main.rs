//! The main entry point for the asdht CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use asdht::cli::{self, Args};
use clap::Parser;

/// The main entry point for the asdht CLI.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let Args { log, .. } = args;

    let _guard = cli::init_global_subscriber(log);

    if let Err(e) = cli::run(args).await {
        asdht::fatal!(e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
