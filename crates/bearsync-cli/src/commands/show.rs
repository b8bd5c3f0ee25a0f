use bearsync_core::config::ClientConfig;

use crate::commands::common::{
    normalize_note_identifier, note_to_list_item, ready_cache, resolve_cached_note,
};
use crate::error::CliError;

pub async fn run_show(config: &ClientConfig, id: &str, as_json: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let cache = ready_cache(config).await?;
    let note = resolve_cached_note(&cache, &normalized_id)?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&note_to_list_item(note))?
        );
    } else {
        println!("{}", note.text);
    }
    Ok(())
}
