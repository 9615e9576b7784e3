use std::process::ExitCode;

use behindtext::cli::{self, CliArgs};
use behindtext::logger;
use clap::Parser;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init();
    behindtext::log_info!("Arguments: {:?}", args);
    cli::run(args)
}
