use std::process::ExitCode;

use clap::Parser;
use figcomposer::{cli, logger};
use tracing::Level;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session log; stderr only shows warnings unless --verbose
    logger::init(if args.verbose { Level::DEBUG } else { Level::WARN });

    cli::run(args)
}
