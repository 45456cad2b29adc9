mod cli;
mod ops;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(err) = run(&cli) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "revisr=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Init => {
            ops::do_init(cli)?;
        }
        Commands::Backup {
            tables,
            message,
            no_commit,
        } => {
            ops::do_backup(cli, tables.clone(), message.clone(), *no_commit)?;
        }
        Commands::Import { tables } => {
            ops::do_import(cli, tables.clone())?;
        }
        Commands::Restore { commit } => {
            ops::do_restore(cli, commit)?;
        }
        Commands::Track { mode, tables } => {
            ops::do_track(cli, *mode, tables.clone())?;
        }
        Commands::Config { dev_url, live_url } => {
            ops::do_config(cli, dev_url.clone(), live_url.clone())?;
        }
        Commands::Tables => {
            ops::do_tables(cli)?;
        }
        Commands::Verify { tables } => {
            ops::do_verify(cli, tables.clone())?;
        }
        Commands::Orphans => {
            ops::do_orphans(cli)?;
        }
        Commands::History { limit } => {
            ops::do_history(cli, *limit)?;
        }
        Commands::Show { commit } => {
            ops::do_show(cli, commit)?;
        }
        Commands::Version => {
            ops::do_version();
        }
    }

    Ok(())
}
