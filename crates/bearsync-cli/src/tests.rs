use std::path::Path;

use bearsync_core::auth::{CredentialSource, Credentials, FileCredentialStore};
use bearsync_core::cache::{CacheStore, NoteCache};
use bearsync_core::cloudkit::CloudKitError;
use bearsync_core::config::ClientConfig;
use bearsync_core::CachedNote;
use chrono::{DateTime, Utc};
use httpmock::Method::POST;
use httpmock::MockServer;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::cli::{AuthCommands, CompletionShell, ConfigCommands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::{
    format_note_lines, format_relative_time, normalize_content, normalize_note_identifier,
    normalize_search_query, note_preview, note_to_list_item, ready_cache, resolve_cached_note,
    resolve_record_name,
};
use crate::commands::completions::run_completions;
use crate::commands::config::build_config_report;
use crate::commands::sync::run_sync;
use crate::error::CliError;

fn note(record_name: &str, text: &str) -> CachedNote {
    CachedNote {
        record_name: record_name.to_string(),
        unique_identifier: Some(format!("uid-{record_name}")),
        title: bearsync_core::models::title_from_text(text),
        text: text.to_string(),
        tags: bearsync_core::models::extract_tags(text),
        modified_at: DateTime::from_timestamp_millis(1_700_000_000_000),
        ..CachedNote::default()
    }
}

fn sample_cache() -> NoteCache {
    let mut cache = NoteCache::new(Some("t1".to_string()), Utc::now());
    cache.upsert(note("ABC12345-0000", "# Groceries\nmilk #home"));
    cache.upsert(note("ABD99999-0000", "# Plans"));
    cache.upsert(note("XYZ00000-0000", "# Reading list"));
    cache
}

fn test_config(dir: &Path, api_base_url: &str) -> ClientConfig {
    ClientConfig {
        api_base_url: api_base_url.to_string(),
        cache_path: Some(dir.join("cache.json")),
        credentials_path: Some(dir.join("credentials.json")),
        ..ClientConfig::default()
    }
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn normalize_inputs_reject_blank_values() {
    assert!(matches!(
        normalize_search_query("   "),
        Err(CliError::EmptySearchQuery)
    ));
    assert!(matches!(
        normalize_note_identifier("\t"),
        Err(CliError::EmptyNoteId)
    ));
    assert_eq!(normalize_note_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    let note = CachedNote {
        text: "This is a very long sentence that should be shortened".to_string(),
        ..CachedNote::default()
    };
    assert_eq!(note_preview(&note, 20), "This is a very lo...");
}

#[test]
fn format_note_lines_show_short_id_title_and_tags() {
    let cache = sample_cache();
    let groceries = cache.get("ABC12345-0000").unwrap();
    let lines = format_note_lines(&[groceries]);

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("ABC12345  Groceries"));
    assert!(lines[0].ends_with("#home"));
}

#[test]
fn list_item_carries_full_content() {
    let item = note_to_list_item(&note("N1", "# Title\nbody"));
    assert_eq!(item.id, "N1");
    assert_eq!(item.title, "Title");
    assert_eq!(item.content, "# Title\nbody");
    assert_eq!(item.updated_at, Some(1_700_000_000_000));
}

#[test]
fn resolve_cached_note_accepts_ids_and_unique_prefixes() {
    let cache = sample_cache();

    let exact = resolve_cached_note(&cache, "XYZ00000-0000").unwrap();
    assert_eq!(exact.title, "Reading list");

    let by_uid = resolve_cached_note(&cache, "uid-ABD99999-0000").unwrap();
    assert_eq!(by_uid.record_name, "ABD99999-0000");

    let by_prefix = resolve_cached_note(&cache, "xyz").unwrap();
    assert_eq!(by_prefix.record_name, "XYZ00000-0000");

    assert!(matches!(
        resolve_cached_note(&cache, "AB"),
        Err(CliError::AmbiguousNoteId(message)) if message.contains("ABC12345")
    ));
    assert!(matches!(
        resolve_cached_note(&cache, "nothing"),
        Err(CliError::NoteNotFound(_))
    ));
}

#[test]
fn resolve_record_name_passes_unknown_ids_through() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("cache.json"));
    assert_eq!(resolve_record_name(&store, "ABC").unwrap(), "ABC");

    store.save(&sample_cache()).unwrap();
    assert_eq!(resolve_record_name(&store, "ABC").unwrap(), "ABC12345-0000");
    assert_eq!(resolve_record_name(&store, "REMOTE-ONLY").unwrap(), "REMOTE-ONLY");
    assert!(resolve_record_name(&store, "AB").is_err());
}

#[test]
fn expired_session_points_at_auth_set() {
    let error = CliError::from(bearsync_core::Error::from(CloudKitError::AuthExpired));
    assert!(matches!(error, CliError::SessionExpired));
    assert!(error.to_string().contains("bearsync auth set"));

    let missing = CliError::from(bearsync_core::Error::NotFound("N1".to_string()));
    assert!(matches!(missing, CliError::NoteNotFound(id) if id == "N1"));
}

#[test]
fn run_auth_sets_and_clears_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "https://api.apple-cloudkit.com");

    run_auth(
        AuthCommands::Set {
            web_auth_token: " web+token ".to_string(),
            api_token: "api".to_string(),
        },
        &config,
    )
    .unwrap();

    let store = FileCredentialStore::new(dir.path().join("credentials.json"));
    assert_eq!(
        store.acquire_credential().unwrap(),
        Some(Credentials::new("web+token", "api"))
    );

    run_auth(AuthCommands::Status, &config).unwrap();
    run_auth(AuthCommands::Logout, &config).unwrap();
    assert_eq!(store.acquire_credential().unwrap(), None);
}

#[test]
fn config_report_resolves_paths() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "https://api.apple-cloudkit.com");
    let config_file = dir.path().join("config.json");

    let report = build_config_report(&config, Some(&config_file)).unwrap();
    assert_eq!(
        report.database_url,
        "https://api.apple-cloudkit.com/database/1/iCloud.net.shinyfrog.bear/production/private"
    );
    assert_eq!(
        report.resolved_cache_path,
        dir.path().join("cache.json").display().to_string()
    );
    assert_eq!(report.config_file, config_file.display().to_string());

    let rendered = serde_json::to_value(&report).unwrap();
    assert_eq!(rendered["zone_name"], "Notes");

    crate::commands::config::run_config(
        ConfigCommands::Show { json: true },
        &config,
        Some(&config_file),
    )
    .unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_writes_the_cache() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &server.base_url());
    FileCredentialStore::new(dir.path().join("credentials.json"))
        .save(&Credentials::new("web", "api"))
        .unwrap();

    server.mock(|when, then| {
        when.method(POST)
            .path("/database/1/iCloud.net.shinyfrog.bear/production/private/zones/list");
        then.status(200).json_body(json!({"zones": [
            {"zoneID": {"zoneName": "Notes"}, "syncToken": "t0"}
        ]}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/database/1/iCloud.net.shinyfrog.bear/production/private/records/query");
        then.status(200).json_body(json!({"records": [{
            "recordName": "N1",
            "recordType": "SFNote",
            "fields": {"text": {"value": "# Hello\nworld", "type": "STRING"}}
        }]}));
    });

    run_sync(&config, false, true).await.unwrap();

    let cache = CacheStore::new(dir.path().join("cache.json")).load().unwrap();
    assert_eq!(cache.sync_token.as_deref(), Some("t0"));
    assert_eq!(cache.get("N1").unwrap().title, "Hello");

    let ready = ready_cache(&config).await.unwrap();
    assert_eq!(ready, cache);
}

#[tokio::test(flavor = "current_thread")]
async fn ready_cache_uses_fresh_cache_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "http://127.0.0.1:9");
    CacheStore::new(dir.path().join("cache.json"))
        .save(&sample_cache())
        .unwrap();

    let cache = ready_cache(&config).await.unwrap();
    assert_eq!(cache.len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn ready_cache_needs_credentials_for_tokenless_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "http://127.0.0.1:9");
    let mut tokenless = sample_cache();
    tokenless.sync_token = None;
    CacheStore::new(dir.path().join("cache.json"))
        .save(&tokenless)
        .unwrap();

    assert!(matches!(
        ready_cache(&config).await,
        Err(CliError::NotSignedIn)
    ));
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("bearsync.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_bearsync()"));
    assert!(script.contains("complete -F _bearsync"));
}

#[test]
fn run_completions_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("completions/zsh/_bearsync");

    run_completions(CompletionShell::Zsh, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("#compdef bearsync"));
}
