//! bearsync CLI - keep a local cache of Bear notes in step with iCloud
//!
//! Every command runs against the local cache; reads refresh it first when
//! it is missing or stale.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use bearsync_core::search::NoteFilter;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::append::run_append;
use crate::commands::archive::run_archive;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::load_config;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::show::run_show;
use crate::commands::sync::run_sync;
use crate::commands::trash::run_trash;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bearsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = load_config(cli.config.as_deref(), cli.cache_path)?;

    match cli.command {
        Commands::Sync { full, json } => run_sync(&config, full, json).await?,
        Commands::List {
            limit,
            tag,
            archived,
            trashed,
            json,
        } => {
            let filter = NoteFilter {
                include_archived: archived,
                include_trashed: trashed,
                tag,
            };
            run_list(&config, limit, &filter, json).await?;
        }
        Commands::Search { query, limit, json } => {
            run_search(&config, &query, limit, json).await?;
        }
        Commands::Show { id, json } => run_show(&config, &id, json).await?,
        Commands::Add { content, tags } => run_add(&config, &content, &tags).await?,
        Commands::Append { id, content } => run_append(&config, &id, &content).await?,
        Commands::Trash { id, restore } => run_trash(&config, &id, restore).await?,
        Commands::Archive { id, restore } => run_archive(&config, &id, restore).await?,
        Commands::Auth { command } => run_auth(command, &config)?,
        Commands::Config { command } => run_config(command, &config, cli.config.as_deref())?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
