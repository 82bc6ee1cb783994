mod cli;
mod config;
mod run;

use std::process::ExitCode;

use clap::Parser;
use engine_logging::{engine_error, LogDestination};
use log::LevelFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (destination, level) = match cli.verbose {
        0 => (LogDestination::File, LevelFilter::Info),
        1 => (LogDestination::Both, LevelFilter::Debug),
        _ => (LogDestination::Both, LevelFilter::Trace),
    };
    engine_logging::initialize(destination, level, &cli.log_file);

    match run::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            engine_error!("archiver failed: {:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
