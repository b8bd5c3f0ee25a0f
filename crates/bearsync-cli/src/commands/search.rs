use bearsync_core::config::ClientConfig;
use bearsync_core::search::search_notes;

use crate::commands::common::{
    format_note_lines, normalize_search_query, note_to_list_item, ready_cache, NoteListItem,
};
use crate::error::CliError;

pub async fn run_search(
    config: &ClientConfig,
    query: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let cache = ready_cache(config).await?;
    let notes = search_notes(&cache, &normalized_query, limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(|note| note_to_list_item(note))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
