use bearsync_core::config::ClientConfig;
use bearsync_core::search::{list_notes, NoteFilter};

use crate::commands::common::{format_note_lines, note_to_list_item, ready_cache, NoteListItem};
use crate::error::CliError;

pub async fn run_list(
    config: &ClientConfig,
    limit: usize,
    filter: &NoteFilter,
    as_json: bool,
) -> Result<(), CliError> {
    let cache = ready_cache(config).await?;
    let notes = list_notes(&cache, filter, limit);

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
