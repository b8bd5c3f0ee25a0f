use bearsync_core::config::ClientConfig;
use bearsync_core::notes::NoteEditor;

use crate::commands::common::{
    cache_store, connect, normalize_note_identifier, resolve_note_content, resolve_record_name,
};
use crate::error::CliError;

pub async fn run_append(
    config: &ClientConfig,
    id: &str,
    content_parts: &[String],
) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let content = resolve_note_content(content_parts)?;

    let store = cache_store(config)?;
    let record_name = resolve_record_name(&store, &normalized_id)?;
    let client = connect(config)?;
    let note = NoteEditor::new(&client, &store, config)
        .append(&record_name, &content)
        .await?;

    println!("{}", note.record_name);
    Ok(())
}
