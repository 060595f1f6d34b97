mod args;
mod commands;
mod formats;

use clap::Parser;

use args::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Import { flags, .. } if flags.verbose);
    let max_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(max_level).with_target(false).init();

    let result = match &cli.command {
        Commands::Import { from, to, flags } => commands::run_import(from, to.as_deref(), flags),
        Commands::Convert { from, to, check } => commands::run_convert(from, to, *check),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
