use bearsync_core::config::ClientConfig;
use bearsync_core::notes::NoteEditor;

use crate::commands::common::{
    cache_store, connect, normalize_note_identifier, resolve_record_name,
};
use crate::error::CliError;

pub async fn run_archive(config: &ClientConfig, id: &str, restore: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = cache_store(config)?;
    let record_name = resolve_record_name(&store, &normalized_id)?;
    let client = connect(config)?;
    let note = NoteEditor::new(&client, &store, config)
        .set_archived(&record_name, !restore)
        .await?;

    println!("{}", note.record_name);
    Ok(())
}
