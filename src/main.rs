mod cli;
mod commands;
mod compose;
mod config;
mod engine;
mod error;
mod platform;
mod providers;
mod settings;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args.target.as_deref(), args.edges),
        Command::Diff(args) => commands::apply::diff(&ctx, args.target.as_deref()),
        Command::Apply(args) => {
            if !commands::apply::apply(&ctx, &args)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Settings => commands::info::settings(&ctx),
        Command::Facts => commands::info::facts(&ctx),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "confcollect", &mut io::stdout());
            Ok(())
        }
    }
}
