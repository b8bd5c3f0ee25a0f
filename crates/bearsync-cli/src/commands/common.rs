use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use bearsync_core::auth::{
    acquire_from, CredentialSource, Credentials, EnvCredentialSource, FileCredentialStore,
};
use bearsync_core::cache::{CacheStore, NoteCache};
use bearsync_core::cloudkit::CloudKitClient;
use bearsync_core::config::ClientConfig;
use bearsync_core::sync::SyncEngine;
use bearsync_core::CachedNote;
use chrono::Utc;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub unique_identifier: Option<String>,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub relative_time: String,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub archived: bool,
    pub trashed: bool,
}

/// Load the config file (explicit path or default), then apply environment
/// and command-line overrides.
pub fn load_config(
    config_path: Option<&Path>,
    cache_path: Option<PathBuf>,
) -> Result<ClientConfig, CliError> {
    let mut config = match config_path {
        Some(path) => {
            let mut config = ClientConfig::load_from_path(path)?;
            config.apply_overrides(|key| env::var(key).ok());
            config
        }
        None => ClientConfig::load()?,
    };
    if cache_path.is_some() {
        config.cache_path = cache_path;
    }
    Ok(config)
}

pub fn credential_store(config: &ClientConfig) -> Result<FileCredentialStore, CliError> {
    Ok(FileCredentialStore::new(config.resolve_credentials_path()?))
}

/// Environment first, then the credential file.
pub fn load_credentials(config: &ClientConfig) -> Result<Credentials, CliError> {
    let env_source = EnvCredentialSource::from_env();
    let file_store = credential_store(config)?;
    let sources: [&dyn CredentialSource; 2] = [&env_source, &file_store];
    acquire_from(&sources)?.ok_or(CliError::NotSignedIn)
}

pub fn cache_store(config: &ClientConfig) -> Result<CacheStore, CliError> {
    Ok(CacheStore::new(config.resolve_cache_path()?))
}

pub fn connect(config: &ClientConfig) -> Result<CloudKitClient, CliError> {
    let credentials = load_credentials(config)?;
    Ok(CloudKitClient::new(config, credentials)?)
}

/// A fresh cache with a change token is used as is; anything else goes
/// through the sync engine.
pub async fn ready_cache(config: &ClientConfig) -> Result<NoteCache, CliError> {
    let store = cache_store(config)?;
    if let Some(cache) = store
        .load_or_none()
        .filter(|cache| cache.sync_token.is_some() && !cache.is_stale(Utc::now()))
    {
        return Ok(cache);
    }

    let client = connect(config)?;
    Ok(SyncEngine::new(&client, &store, config).ensure_ready().await?)
}

/// Find a cached note by record name, unique identifier, or a unique
/// record name prefix.
pub fn resolve_cached_note<'a>(
    cache: &'a NoteCache,
    note_query: &str,
) -> Result<&'a CachedNote, CliError> {
    if let Some(note) = cache
        .get(note_query)
        .or_else(|| cache.find_by_unique_identifier(note_query))
    {
        return Ok(note);
    }

    let prefix = note_query.to_uppercase();
    let matching = cache
        .notes
        .values()
        .filter(|note| note.record_name.to_uppercase().starts_with(&prefix))
        .take(3)
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(note_query.to_string())),
        [note] => Ok(note),
        _ => {
            let options = matching
                .iter()
                .map(|note| short_id(&note.record_name))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Record name to send for a mutation. Prefixes are expanded through the
/// local cache when there is one; otherwise the id goes to the server as is.
pub fn resolve_record_name(store: &CacheStore, note_query: &str) -> Result<String, CliError> {
    let Some(cache) = store.load_or_none() else {
        return Ok(note_query.to_string());
    };
    match resolve_cached_note(&cache, note_query) {
        Ok(note) => Ok(note.record_name.clone()),
        Err(CliError::NoteNotFound(_)) => Ok(note_query.to_string()),
        Err(error) => Err(error),
    }
}

pub fn format_note_lines(notes: &[&CachedNote]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.record_name);
            let preview = note_preview(note, 40);
            let relative_time = note
                .modified_at
                .map(|date| format_relative_time(date.timestamp_millis(), now_ms))
                .unwrap_or_default();
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{short_id:<8}  {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<8}  {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &CachedNote) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    let updated_at = note.modified_at.map(|date| date.timestamp_millis());

    NoteListItem {
        id: note.record_name.clone(),
        unique_identifier: note.unique_identifier.clone(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.text.clone(),
        created_at: note.created_at.map(|date| date.timestamp_millis()),
        updated_at,
        relative_time: updated_at
            .map(|updated_at| format_relative_time(updated_at, now_ms))
            .unwrap_or_default(),
        tags: note.tags.clone(),
        pinned: note.pinned,
        archived: note.archived,
        trashed: note.trashed,
    }
}

pub fn short_id(record_name: &str) -> String {
    record_name.chars().take(8).collect()
}

pub fn note_preview(note: &CachedNote, max_chars: usize) -> String {
    let first_line = note.title_preview(usize::MAX);
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &CachedNote) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}
