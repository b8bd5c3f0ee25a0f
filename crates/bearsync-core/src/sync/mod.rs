//! Synchronization engine.
//!
//! Keeps the local [`NoteCache`] consistent with the `Notes` zone. A full
//! sync rebuilds the cache from a record query; an incremental sync replays
//! the zone change feed from the stored token. Incremental runs fall back to
//! a full sync when the service rejects the request (expired or unknown
//! token, for instance).

use chrono::Utc;

use crate::cache::{CacheStore, NoteCache};
use crate::cloudkit::{CloudKitClient, QuerySort, Record, RecordQuery};
use crate::config::ClientConfig;
use crate::models::{fields, CachedNote, SyncStats};
use crate::value::FieldValue;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// Result of one sync run: how it ran, what changed, and the saved cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    pub stats: SyncStats,
    pub cache: NoteCache,
}

pub struct SyncEngine<'a> {
    client: &'a CloudKitClient,
    store: &'a CacheStore,
    record_type: String,
    page_size: usize,
}

impl<'a> SyncEngine<'a> {
    pub fn new(client: &'a CloudKitClient, store: &'a CacheStore, config: &ClientConfig) -> Self {
        Self {
            client,
            store,
            record_type: config.record_type.clone(),
            page_size: config.page_size.max(1),
        }
    }

    /// Sync the cache, choosing the mode from what is stored.
    ///
    /// Runs a full sync when `force_full` is set, when no readable cache
    /// exists, or when the cache has no change token.
    pub async fn sync(&self, force_full: bool) -> Result<SyncOutcome> {
        if force_full {
            return self.full_sync().await;
        }

        match self.store.load_or_none() {
            Some(cache) => self.refresh(cache).await,
            None => {
                tracing::info!("No local cache; running full sync");
                self.full_sync().await
            }
        }
    }

    /// Return a cache fit for reading: synced if missing or tokenless,
    /// refreshed if stale.
    pub async fn ensure_ready(&self) -> Result<NoteCache> {
        match self.store.load_or_none() {
            None => {
                tracing::info!("No local cache; running full sync");
                Ok(self.full_sync().await?.cache)
            }
            Some(cache) if cache.sync_token.is_none() => {
                tracing::info!("Cache has no change token; running full sync");
                Ok(self.full_sync().await?.cache)
            }
            Some(cache) if cache.is_stale(Utc::now()) => {
                tracing::info!("Cache is stale; refreshing");
                Ok(self.refresh(cache).await?.cache)
            }
            Some(cache) => Ok(cache),
        }
    }

    async fn refresh(&self, cache: NoteCache) -> Result<SyncOutcome> {
        if cache.sync_token.is_none() {
            tracing::info!("Cache has no change token; running full sync");
            return self.full_sync().await;
        }

        match self.incremental_sync(cache).await {
            Ok(outcome) => Ok(outcome),
            Err(error) if error.is_api_error() => {
                tracing::warn!("Incremental sync rejected, falling back to full sync: {}", error);
                self.full_sync().await
            }
            Err(error) => Err(error),
        }
    }

    /// Rebuild the cache from every record of the tracked type.
    pub async fn full_sync(&self) -> Result<SyncOutcome> {
        let baseline = self.baseline_token().await?;
        if baseline.is_none() {
            tracing::warn!(
                "Zone {} reported no change token; next sync will be full again",
                self.client.zone().zone_name
            );
        }

        let query = RecordQuery::new(self.record_type.as_str())
            .sort(QuerySort::descending(fields::MODIFICATION_DATE))
            .limit(self.page_size)
            .desired_keys(fields::DESIRED_KEYS.iter().copied());
        let records = self.client.query_all(&query).await?;

        let mut cache = NoteCache::new(baseline, Utc::now());
        let mut stats = SyncStats::default();

        for record in records {
            if record.is_deleted() || record.is_error() {
                continue;
            }
            match resolve_text(self.client, &record).await {
                Ok(text) => {
                    cache.upsert(CachedNote::from_record(&record, text));
                }
                Err(error) => {
                    tracing::warn!("Skipping note {}: {}", record.record_name, error);
                    stats.failed += 1;
                }
            }
        }
        stats.added = cache.len();

        self.store.save(&cache)?;
        tracing::info!("Full sync finished: {}", stats);

        Ok(SyncOutcome {
            mode: SyncMode::Full,
            stats,
            cache,
        })
    }

    /// Apply the zone change feed since the cache's token.
    pub async fn incremental_sync(&self, mut cache: NoteCache) -> Result<SyncOutcome> {
        let desired_keys = fields::desired_keys();
        let mut token = cache.sync_token.clone();
        let mut stats = SyncStats::default();
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .zone_changes(token.as_deref(), &desired_keys)
                .await?;
            pages += 1;

            for record in page.records {
                self.apply_change(&mut cache, record, &mut stats).await;
            }

            let advanced = page.sync_token.is_some() && page.sync_token != token;
            if page.sync_token.is_some() {
                token = page.sync_token;
            }
            if !page.more_coming {
                break;
            }
            if !advanced {
                tracing::warn!("Change feed reported more changes without a new token; stopping");
                break;
            }
        }

        cache.sync_token = token;
        cache.last_sync_date = Some(Utc::now());
        self.store.save(&cache)?;
        tracing::info!("Incremental sync finished after {} pages: {}", pages, stats);

        Ok(SyncOutcome {
            mode: SyncMode::Incremental,
            stats,
            cache,
        })
    }

    async fn apply_change(&self, cache: &mut NoteCache, record: Record, stats: &mut SyncStats) {
        if record.is_deleted() {
            if cache.remove(&record.record_name).is_some() {
                stats.deleted += 1;
            }
            return;
        }
        if let Some(code) = &record.server_error_code {
            tracing::warn!("Change for {} carried error {}", record.record_name, code);
            stats.failed += 1;
            return;
        }
        if record.record_type != self.record_type {
            tracing::debug!(
                "Ignoring change to {} of type {}",
                record.record_name,
                record.record_type
            );
            return;
        }

        match resolve_text(self.client, &record).await {
            Ok(text) => {
                if cache.upsert(CachedNote::from_record(&record, text)) {
                    stats.added += 1;
                } else {
                    stats.updated += 1;
                }
            }
            Err(error) => {
                tracing::warn!("Failed to resolve text of {}: {}", record.record_name, error);
                stats.failed += 1;
                if let Some(previous) = cache.get(&record.record_name).map(|note| note.text.clone()) {
                    cache.upsert(CachedNote::from_record(&record, previous));
                }
            }
        }
    }

    async fn baseline_token(&self) -> Result<Option<String>> {
        let zone_name = &self.client.zone().zone_name;
        let zones = self.client.list_zones().await?;
        Ok(zones
            .into_iter()
            .find(|zone| &zone.zone_id.zone_name == zone_name)
            .and_then(|zone| zone.sync_token))
    }
}

/// Body text of a note record: the inline `text` field, else the `textADP`
/// asset downloaded from the service. A record with neither has no body.
pub async fn resolve_text(client: &CloudKitClient, record: &Record) -> Result<String> {
    if let Some(text) = record.string_field(fields::TEXT).filter(|text| !text.is_empty()) {
        return Ok(text.to_string());
    }

    match record
        .field(fields::TEXT_ASSET)
        .and_then(FieldValue::download_url)
    {
        Some(url) => Ok(client.download_asset(url).await?),
        None => Ok(record.string_field(fields::TEXT).unwrap_or_default().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::auth::Credentials;

    struct Harness {
        server: MockServer,
        config: ClientConfig,
        client: CloudKitClient,
        store: CacheStore,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        async fn start() -> Self {
            let server = MockServer::start_async().await;
            let dir = tempfile::tempdir().unwrap();
            let config = ClientConfig {
                api_base_url: server.base_url(),
                ..ClientConfig::default()
            };
            let client = CloudKitClient::new(&config, Credentials::new("web", "api")).unwrap();
            let store = CacheStore::new(dir.path().join("cache.json"));
            Self {
                server,
                config,
                client,
                store,
                _dir: dir,
            }
        }

        fn engine(&self) -> SyncEngine<'_> {
            SyncEngine::new(&self.client, &self.store, &self.config)
        }
    }

    fn route(path: &str) -> String {
        format!("/database/1/iCloud.net.shinyfrog.bear/production/private/{path}")
    }

    fn note_json(record_name: &str, text: &str) -> Value {
        json!({
            "recordName": record_name,
            "recordType": "SFNote",
            "recordChangeTag": format!("tag-{record_name}"),
            "fields": {
                "text": {"value": text, "type": "STRING"},
                "uniqueIdentifier": {"value": format!("UID-{record_name}"), "type": "STRING"},
                "trashed": {"value": 0, "type": "INT64"}
            }
        })
    }

    fn asset_note_json(record_name: &str, download_url: &str) -> Value {
        json!({
            "recordName": record_name,
            "recordType": "SFNote",
            "fields": {
                "textADP": {
                    "value": {"downloadURL": download_url, "size": 42},
                    "type": "ASSETID"
                }
            }
        })
    }

    fn cached(record_name: &str, text: &str) -> CachedNote {
        CachedNote {
            record_name: record_name.to_string(),
            title: crate::models::title_from_text(text),
            text: text.to_string(),
            ..CachedNote::default()
        }
    }

    fn seeded_cache(token: &str, notes: &[(&str, &str)]) -> NoteCache {
        let mut cache = NoteCache::new(Some(token.to_string()), Utc::now());
        for (record_name, text) in notes {
            cache.upsert(cached(record_name, text));
        }
        cache
    }

    fn mock_zones<'a>(server: &'a MockServer, token: &str) -> httpmock::Mock<'a> {
        server.mock(|when, then| {
            when.method(POST).path(route("zones/list"));
            then.status(200).json_body(json!({"zones": [
                {"zoneID": {"zoneName": "Notes"}, "syncToken": token}
            ]}));
        })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_sync_resolves_inline_and_asset_text() {
        let harness = Harness::start().await;
        let server = &harness.server;
        mock_zones(server, "t0");
        server.mock(|when, then| {
            when.method(POST)
                .path(route("records/query"))
                .json_body_partial(r#"{"query":{"recordType":"SFNote"},"resultsLimit":200}"#);
            then.status(200).json_body(json!({"records": [
                note_json("a", "# Alpha\ninline body"),
                asset_note_json("b", &server.url("/assets/b/${f}")),
                asset_note_json("c", &server.url("/assets/missing/${f}")),
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/assets/b/text.txt");
            then.status(200).body("# Beta\nfrom asset #work");
        });
        server.mock(|when, then| {
            when.method(GET).path("/assets/missing/text.txt");
            then.status(404);
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        assert_eq!(outcome.mode, SyncMode::Full);
        assert_eq!(
            outcome.stats,
            SyncStats {
                added: 2,
                failed: 1,
                ..SyncStats::default()
            }
        );
        assert_eq!(outcome.cache.sync_token.as_deref(), Some("t0"));
        assert_eq!(outcome.cache.get("b").unwrap().title, "Beta");
        assert_eq!(outcome.cache.get("b").unwrap().tags, vec!["work"]);
        assert!(outcome.cache.get("c").is_none());
        assert_eq!(harness.store.load().unwrap(), outcome.cache);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn incremental_sync_counts_adds_and_deletes() {
        let harness = Harness::start().await;
        harness
            .store
            .save(&seeded_cache("t1", &[("old", "Old note")]))
            .unwrap();
        harness.server.mock(|when, then| {
            when.method(POST)
                .path(route("changes/zone"))
                .json_body_partial(r#"{"zones":[{"zoneID":{"zoneName":"Notes"},"syncToken":"t1"}]}"#);
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "moreComing": false,
                "syncToken": "t2",
                "records": [
                    note_json("a", "A"),
                    note_json("b", "B"),
                    {"recordName": "old", "deleted": true},
                    {"recordName": "never-seen", "deleted": true}
                ]
            }]}));
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        assert_eq!(outcome.mode, SyncMode::Incremental);
        assert_eq!(
            outcome.stats,
            SyncStats {
                added: 2,
                deleted: 1,
                ..SyncStats::default()
            }
        );
        assert!(outcome.cache.get("old").is_none());
        assert_eq!(outcome.cache.sync_token.as_deref(), Some("t2"));
        assert_eq!(harness.store.load().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn incremental_sync_follows_more_coming() {
        let harness = Harness::start().await;
        harness.store.save(&seeded_cache("t1", &[])).unwrap();
        let first = harness.server.mock(|when, then| {
            when.method(POST)
                .path(route("changes/zone"))
                .body_contains("\"syncToken\":\"t1\"");
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "moreComing": true,
                "syncToken": "t2",
                "records": [note_json("a", "first")]
            }]}));
        });
        let second = harness.server.mock(|when, then| {
            when.method(POST)
                .path(route("changes/zone"))
                .body_contains("\"syncToken\":\"t2\"");
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "moreComing": false,
                "syncToken": "t3",
                "records": [note_json("a", "second"), note_json("b", "other")]
            }]}));
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        first.assert_hits(1);
        second.assert_hits(1);
        assert_eq!(outcome.cache.get("a").unwrap().text, "second");
        assert_eq!(outcome.cache.sync_token.as_deref(), Some("t3"));
        assert_eq!(
            outcome.stats,
            SyncStats {
                added: 2,
                updated: 1,
                ..SyncStats::default()
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejected_change_feed_falls_back_to_full_sync() {
        let harness = Harness::start().await;
        harness
            .store
            .save(&seeded_cache("expired", &[("old", "Old")]))
            .unwrap();
        harness.server.mock(|when, then| {
            when.method(POST).path(route("changes/zone"));
            then.status(400).body("bad sync token");
        });
        mock_zones(&harness.server, "fresh");
        harness.server.mock(|when, then| {
            when.method(POST).path(route("records/query"));
            then.status(200)
                .json_body(json!({"records": [note_json("a", "A")]}));
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        assert_eq!(outcome.mode, SyncMode::Full);
        assert_eq!(outcome.cache.sync_token.as_deref(), Some("fresh"));
        assert!(outcome.cache.get("old").is_none());
        assert_eq!(outcome.stats.to_string(), "1 new");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn expired_session_does_not_fall_back() {
        let harness = Harness::start().await;
        harness.store.save(&seeded_cache("t1", &[])).unwrap();
        harness.server.mock(|when, then| {
            when.method(POST).path(route("changes/zone"));
            then.status(401);
        });
        let zones = mock_zones(&harness.server, "t0");

        let error = harness.engine().sync(false).await.unwrap_err();

        assert!(error.is_auth_expired());
        zones.assert_hits(0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cache_without_token_forces_full_sync() {
        let harness = Harness::start().await;
        let mut cache = seeded_cache("unused", &[("a", "A")]);
        cache.sync_token = None;
        harness.store.save(&cache).unwrap();
        let zones = mock_zones(&harness.server, "t9");
        harness.server.mock(|when, then| {
            when.method(POST).path(route("records/query"));
            then.status(200).json_body(json!({"records": []}));
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        zones.assert_hits(1);
        assert_eq!(outcome.mode, SyncMode::Full);
        assert!(outcome.cache.is_empty());
        assert_eq!(outcome.stats.to_string(), "no changes");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_asset_keeps_previous_body() {
        let harness = Harness::start().await;
        harness
            .store
            .save(&seeded_cache("t1", &[("a", "old body")]))
            .unwrap();
        let mut change = asset_note_json("a", &harness.server.url("/assets/gone/${f}"));
        change["fields"]["title"] = json!({"value": "Renamed", "type": "STRING"});
        harness.server.mock(|when, then| {
            when.method(POST).path(route("changes/zone"));
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "syncToken": "t2",
                "records": [change]
            }]}));
        });
        harness.server.mock(|when, then| {
            when.method(GET).path("/assets/gone/text.txt");
            then.status(500);
        });

        let outcome = harness.engine().sync(false).await.unwrap();

        let note = outcome.cache.get("a").unwrap();
        assert_eq!(note.text, "old body");
        assert_eq!(note.title, "Renamed");
        assert_eq!(outcome.stats.to_string(), "1 failed");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ensure_ready_only_refreshes_stale_caches() {
        let harness = Harness::start().await;
        let feed = harness.server.mock(|when, then| {
            when.method(POST).path(route("changes/zone"));
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "syncToken": "t2",
                "records": []
            }]}));
        });

        harness.store.save(&seeded_cache("t1", &[("a", "A")])).unwrap();
        let cache = harness.engine().ensure_ready().await.unwrap();
        assert_eq!(cache.sync_token.as_deref(), Some("t1"));
        feed.assert_hits(0);

        let mut stale = seeded_cache("t1", &[("a", "A")]);
        stale.last_sync_date = Some(Utc::now() - Duration::seconds(400));
        harness.store.save(&stale).unwrap();
        let cache = harness.engine().ensure_ready().await.unwrap();
        assert_eq!(cache.sync_token.as_deref(), Some("t2"));
        feed.assert_hits(1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ensure_ready_resyncs_fresh_cache_without_token() {
        let harness = Harness::start().await;
        let zones = mock_zones(&harness.server, "t9");
        harness.server.mock(|when, then| {
            when.method(POST).path(route("records/query"));
            then.status(200)
                .json_body(json!({"records": [note_json("a", "# Alpha")]}));
        });

        let mut tokenless = NoteCache::new(None, Utc::now());
        tokenless.upsert(cached("old", "# Old"));
        harness.store.save(&tokenless).unwrap();

        let cache = harness.engine().ensure_ready().await.unwrap();
        assert_eq!(cache.sync_token.as_deref(), Some("t9"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("old").is_none());
        zones.assert_hits(1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_then_incremental_scenario() {
        let harness = Harness::start().await;
        let server = &harness.server;
        mock_zones(server, "t1");
        server.mock(|when, then| {
            when.method(POST).path(route("records/query"));
            then.status(200).json_body(json!({"records": [
                note_json("a", "# Alpha\nv1"),
                asset_note_json("b", &server.url("/assets/b/${f}")),
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/assets/b/text.txt");
            then.status(200).body("# Beta");
        });
        server.mock(|when, then| {
            when.method(POST)
                .path(route("changes/zone"))
                .body_contains("\"syncToken\":\"t1\"");
            then.status(200).json_body(json!({"zones": [{
                "zoneID": {"zoneName": "Notes"},
                "moreComing": false,
                "syncToken": "t2",
                "records": [
                    note_json("a", "# Alpha\nv2"),
                    {"recordName": "b", "deleted": true}
                ]
            }]}));
        });

        let engine = harness.engine();
        let first = engine.sync(false).await.unwrap();
        assert_eq!(first.stats.to_string(), "2 new");
        assert_eq!(first.cache.len(), 2);

        let second = engine.sync(false).await.unwrap();
        assert_eq!(second.stats.to_string(), "1 updated, 1 deleted");
        assert_eq!(second.cache.len(), 1);
        assert_eq!(second.cache.get("a").unwrap().text, "# Alpha\nv2");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn resolve_text_prefers_inline_body() {
        let harness = Harness::start().await;
        let record: Record = serde_json::from_value(json!({
            "recordName": "x",
            "recordType": "SFNote",
            "fields": {
                "text": {"value": "inline", "type": "STRING"},
                "textADP": {"value": {"downloadURL": "http://127.0.0.1:9/never"}, "type": "ASSETID"}
            }
        }))
        .unwrap();
        assert_eq!(resolve_text(&harness.client, &record).await.unwrap(), "inline");

        let empty = Record::new("y", "SFNote");
        assert_eq!(resolve_text(&harness.client, &empty).await.unwrap(), "");
    }
}
