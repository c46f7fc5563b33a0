mod backend;
mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::Cli;
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

const LOG_FILE_NAME: &str = "compass.log";

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    let config = config::build_config(&cli)?;

    let log_file = match &cli.log_file {
        Some(path) => Some(path.clone()),
        None if config.has_data() => {
            std::fs::create_dir_all(&config.output_dir)?;
            Some(config.output_dir.join(LOG_FILE_NAME))
        }
        None => None,
    };
    logging::setup_logging(cli.verbose, cli.quiet, log_file.as_deref())?;

    info!("🚀 Compass v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = commands::run::run(&config);

    match &command_result {
        Ok(_) => {
            info!("✅ Compass completed successfully.");
            if config.single_sample.is_none() {
                println!("✅ Compass completed successfully.");
            }
        }
        Err(e) => {
            error!("❌ Compass failed: {}", e);
        }
    }

    command_result
}
