use std::process::ExitCode;

use clap::Parser;
use mask_history::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session log (overwrites previous session log)
    logger::init(args.verbose);
    tracing::info!(inputs = args.input.len(), "mask-history starting");

    cli::run(args)
}
