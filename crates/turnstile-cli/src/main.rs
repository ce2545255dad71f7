use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use turnstile_cli::{Cli, Commands, Config, HistoryAction};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Some(Commands::Serve) => {
            turnstile_cli::commands::serve::run(&config)?;
        }
        Some(Commands::Scan { token }) => {
            turnstile_cli::commands::scan::run(&mut out, &token, &config)?;
        }
        Some(Commands::Status) => {
            turnstile_cli::commands::status::run(&mut out, &config)?;
        }
        Some(Commands::Capacity { action }) => {
            turnstile_cli::commands::capacity::run(&mut out, &action, &config)?;
        }
        Some(Commands::SetStatus(args)) => {
            turnstile_cli::commands::set_status::run(&mut out, &args, &config)?;
        }
        Some(Commands::Forecast { minutes }) => {
            turnstile_cli::commands::forecast::run(&mut out, minutes, &config)?;
        }
        Some(Commands::Scored) => {
            turnstile_cli::commands::scored::run(&mut out, &config)?;
        }
        Some(Commands::Remove { count }) => {
            turnstile_cli::commands::remove::run(&mut out, count, &config)?;
        }
        Some(Commands::Occupant { action }) => {
            turnstile_cli::commands::occupant::run(&mut out, &action, &config)?;
        }
        Some(Commands::History { action }) => match action {
            HistoryAction::Export => {
                let exported = turnstile_cli::commands::history::export(&mut out, &config)?;
                eprintln!("Exported {exported} events");
            }
            HistoryAction::Import => {
                let stdin = io::stdin();
                let loaded = turnstile_cli::commands::history::import(stdin.lock(), &config)?;
                writeln!(out, "Loaded {loaded} observations")?;
            }
        },
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
