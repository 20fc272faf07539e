//! `failover-installer` binary: parse the command line and dispatch.
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use failover_installer::cli::{self, Command};
use failover_installer::commands;
use failover_installer::logging::{self, Logger};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose, args.command.name());

    // Writes are atomic renames, so an interrupt never leaves a partial file.
    if let Err(e) = ctrlc::set_handler(|| {
        tracing::warn!("interrupted");
        std::process::exit(130);
    }) {
        tracing::debug!("no interrupt handler: {e}");
    }

    let log = Arc::new(Logger::new(args.command.name()));

    match &args.command {
        Command::Install(opts) => commands::install::run(&args.global, opts, &log),
        Command::Merge(opts) => commands::merge::run(&args.global, opts, &log),
        Command::Validate(opts) => commands::validate::run(&args.global, opts, &log),
        Command::Backup(opts) => commands::backup::run(&args.global, opts, &log),
        Command::Start => commands::start::run(&args.global, &log),
        Command::Stop => commands::stop::run(&args.global, &log),
        Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
