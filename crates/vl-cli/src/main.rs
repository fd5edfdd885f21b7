use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vl_cli::backend::open_store;
use vl_cli::commands::{init, run, status};
use vl_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout();
    match &cli.command {
        Some(Commands::Run { stdin, dry_run }) => {
            let config = load_config(cli.config.as_deref())?;
            let options = run::RunOptions {
                stdin: *stdin,
                dry_run: *dry_run,
            };
            tokio::runtime::Runtime::new()?.block_on(run::run(&mut stdout, &config, options))?;
        }
        Some(Commands::Init) => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config, false)?;
            tokio::runtime::Runtime::new()?.block_on(init::run(
                &mut stdout,
                &store,
                &config.sheet_name,
            ))?;
        }
        Some(Commands::Status { json }) => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config, false)?;
            tokio::runtime::Runtime::new()?.block_on(status::run(&mut stdout, &store, *json))?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
