use bearsync_core::config::ClientConfig;
use bearsync_core::notes::NoteEditor;

use crate::commands::common::{cache_store, connect, resolve_note_content};
use crate::error::CliError;

pub async fn run_add(
    config: &ClientConfig,
    content_parts: &[String],
    tags: &[String],
) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let client = connect(config)?;
    let store = cache_store(config)?;
    let note = NoteEditor::new(&client, &store, config)
        .create(&content, tags)
        .await?;

    println!("{}", note.record_name);
    Ok(())
}
