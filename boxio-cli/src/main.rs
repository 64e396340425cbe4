//! boxio command-line entry point.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = cli.global.options();
    let log_guard = match boxio::util::init_logging(&options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {}", e);
            None
        }
    };

    let result = match cli.command {
        Commands::Provision(args) => commands::provision::execute(args, &cli.global).await,
        Commands::Attach(args) => commands::attach::execute(args, &cli.global).await,
        Commands::Rm(args) => commands::rm::execute(args, &cli.global).await,
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    // A blocking read on the terminal's stdin would hold runtime shutdown.
    drop(log_guard);
    std::process::exit(code);
}
