use bearsync_core::config::ClientConfig;
use bearsync_core::sync::{SyncEngine, SyncOutcome};
use serde::Serialize;

use crate::commands::common::{cache_store, connect};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub mode: &'static str,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub summary: String,
    pub notes: usize,
    pub sync_token: Option<String>,
}

impl From<&SyncOutcome> for SyncReport {
    fn from(outcome: &SyncOutcome) -> Self {
        Self {
            mode: outcome.mode.as_str(),
            added: outcome.stats.added,
            updated: outcome.stats.updated,
            deleted: outcome.stats.deleted,
            failed: outcome.stats.failed,
            summary: outcome.stats.to_string(),
            notes: outcome.cache.len(),
            sync_token: outcome.cache.sync_token.clone(),
        }
    }
}

pub async fn run_sync(config: &ClientConfig, full: bool, as_json: bool) -> Result<(), CliError> {
    let client = connect(config)?;
    let store = cache_store(config)?;
    let outcome = SyncEngine::new(&client, &store, config).sync(full).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&SyncReport::from(&outcome))?
        );
    } else {
        println!(
            "Sync completed ({}): {}, {} notes cached",
            outcome.mode.as_str(),
            outcome.stats,
            outcome.cache.len()
        );
    }
    Ok(())
}
