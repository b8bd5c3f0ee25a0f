//! Note mutations: create, append, trash and archive.
//!
//! Every write stamps a new conflict marker and echoes the revision tag last
//! seen for the record; the server decides whether the tag is current. The
//! saved record is written back into the local cache.

use chrono::Utc;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::cloudkit::{
    CloudKitClient, CloudKitError, QueryFilter, Record, RecordOperation, RecordQuery,
};
use crate::config::ClientConfig;
use crate::marker::MarkerCodec;
use crate::models::{extract_tags, fields, title_from_text, CachedNote};
use crate::sync::resolve_text;
use crate::value::RecordField;
use crate::{Error, Result};

pub struct NoteEditor<'a> {
    client: &'a CloudKitClient,
    store: &'a CacheStore,
    codec: MarkerCodec,
    record_type: String,
}

impl<'a> NoteEditor<'a> {
    pub fn new(client: &'a CloudKitClient, store: &'a CacheStore, config: &ClientConfig) -> Self {
        Self {
            client,
            store,
            codec: MarkerCodec::new(config.device_id.clone()),
            record_type: config.record_type.clone(),
        }
    }

    /// Create a note. Tags not already written in the body are appended to
    /// it as a final `#tag` line.
    pub async fn create(&self, text: &str, tags: &[String]) -> Result<CachedNote> {
        self.create_with_identifier(new_identifier(), text, tags).await
    }

    async fn create_with_identifier(
        &self,
        identifier: String,
        text: &str,
        tags: &[String],
    ) -> Result<CachedNote> {
        let tags = normalize_tags(tags)?;
        let mut body = text.trim_end().to_string();
        if body.trim().is_empty() {
            return Err(Error::InvalidInput("Note content cannot be empty".to_string()));
        }

        let present = extract_tags(&body);
        let missing = tags
            .iter()
            .filter(|tag| !present.contains(tag))
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            body.push_str("\n\n");
            body.push_str(&missing.join(" "));
        }

        let now = Utc::now().timestamp_millis();
        let mut record = Record::new(identifier.clone(), self.record_type.clone());
        record.set_field(fields::TITLE, RecordField::string(title_from_text(&body)));
        record.set_field(fields::TEXT, RecordField::string(body.clone()));
        record.set_field(fields::UNIQUE_IDENTIFIER, RecordField::string(identifier));
        record.set_field(fields::TAGS, RecordField::string_list(extract_tags(&body)));
        record.set_field(fields::CREATION_DATE, RecordField::timestamp(now));
        record.set_field(fields::MODIFICATION_DATE, RecordField::timestamp(now));
        for flag in [
            fields::PINNED,
            fields::ARCHIVED,
            fields::TRASHED,
            fields::LOCKED,
            fields::HAS_FILES,
        ] {
            record.set_field(flag, RecordField::int64(0));
        }
        record.set_field(
            fields::VECTOR_CLOCK,
            RecordField::bytes(self.codec.increment_base64(None)),
        );

        let saved = self.submit(RecordOperation::create(record.clone())).await?;
        tracing::info!("Created note {}", saved.record_name);
        self.remember(record, saved, body)
    }

    /// Append `text` to the end of a note's body.
    pub async fn append(&self, id: &str, text: &str) -> Result<CachedNote> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Text to append cannot be empty".to_string()));
        }

        let current = self.resolve(id).await?;
        let existing = resolve_text(self.client, &current).await?;
        let body = if existing.is_empty() || existing.ends_with('\n') {
            format!("{existing}{text}")
        } else {
            format!("{existing}\n{text}")
        };

        let mut tags = current
            .field(fields::TAGS)
            .map(crate::value::FieldValue::string_items)
            .unwrap_or_default();
        for tag in extract_tags(&body) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        self.update(
            current,
            vec![
                (fields::TITLE, RecordField::string(title_from_text(&body))),
                (fields::TEXT, RecordField::string(body.clone())),
                (fields::TAGS, RecordField::string_list(tags)),
            ],
            body,
        )
        .await
    }

    pub async fn set_trashed(&self, id: &str, trashed: bool) -> Result<CachedNote> {
        self.set_flag(id, fields::TRASHED, trashed).await
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> Result<CachedNote> {
        self.set_flag(id, fields::ARCHIVED, archived).await
    }

    async fn set_flag(&self, id: &str, name: &str, value: bool) -> Result<CachedNote> {
        let current = self.resolve(id).await?;
        let body = self.known_body(&current).await?;
        self.update(
            current,
            vec![(name, RecordField::int64(i64::from(value)))],
            body,
        )
        .await
    }

    /// Find a record by record name, then by unique identifier: through the
    /// cache first, then with a server-side query.
    pub async fn resolve(&self, id: &str) -> Result<Record> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::InvalidInput("Note id cannot be empty".to_string()));
        }

        let desired_keys = fields::desired_keys();
        if let Some(record) = self
            .client
            .lookup(&[id], &desired_keys)
            .await?
            .into_iter()
            .next()
        {
            return Ok(record);
        }

        let cached_name = self.store.load_or_none().and_then(|cache| {
            cache
                .find_by_unique_identifier(id)
                .map(|note| note.record_name.clone())
        });
        if let Some(record_name) = cached_name.filter(|name| name != id) {
            tracing::debug!("Resolved {} to record {} through the cache", id, record_name);
            if let Some(record) = self
                .client
                .lookup(&[record_name.as_str()], &desired_keys)
                .await?
                .into_iter()
                .next()
            {
                return Ok(record);
            }
        }

        let query = RecordQuery::new(self.record_type.as_str())
            .filter(QueryFilter::equals(
                fields::UNIQUE_IDENTIFIER,
                RecordField::string(id),
            ))
            .limit(1)
            .desired_keys(desired_keys);
        let record = self
            .client
            .query(&query)
            .await?
            .into_iter()
            .find(|record| !record.is_deleted() && !record.is_error())
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        tracing::debug!("Resolved {} to record {} by query", id, record.record_name);
        Ok(record)
    }

    /// Body to cache for a flag change: the cached copy when there is one.
    async fn known_body(&self, record: &Record) -> Result<String> {
        let cached = self
            .store
            .load_or_none()
            .and_then(|cache| cache.get(&record.record_name).map(|note| note.text.clone()));
        match cached {
            Some(text) => Ok(text),
            None => resolve_text(self.client, record).await,
        }
    }

    async fn update(
        &self,
        current: Record,
        changes: Vec<(&str, RecordField)>,
        body: String,
    ) -> Result<CachedNote> {
        let mut outgoing = Record::new(current.record_name.clone(), current.record_type.clone());
        if outgoing.record_type.is_empty() {
            outgoing.record_type.clone_from(&self.record_type);
        }
        outgoing.record_change_tag.clone_from(&current.record_change_tag);

        for (name, field) in changes {
            outgoing.set_field(name, field);
        }
        outgoing.set_field(
            fields::MODIFICATION_DATE,
            RecordField::timestamp(Utc::now().timestamp_millis()),
        );
        outgoing.set_field(
            fields::VECTOR_CLOCK,
            RecordField::bytes(
                self.codec
                    .increment_base64(current.string_field(fields::VECTOR_CLOCK)),
            ),
        );

        let saved = self.submit(RecordOperation::update(outgoing.clone())).await?;
        tracing::info!("Updated note {}", saved.record_name);

        let mut merged = current;
        merged.fields.extend(outgoing.fields);
        self.remember(merged, saved, body)
    }

    async fn submit(&self, operation: RecordOperation) -> Result<Record> {
        let record_name = operation.record.record_name.clone();
        let saved = self
            .client
            .modify(std::slice::from_ref(&operation))
            .await?
            .into_iter()
            .find(|record| record.record_name == record_name)
            .ok_or_else(|| {
                CloudKitError::Network(format!("modify response did not include {record_name}"))
            })?;

        if saved.is_error() {
            return Err(Error::Rejected {
                record_name,
                code: saved.server_error_code.unwrap_or_default(),
                reason: saved.reason.unwrap_or_default(),
            });
        }
        Ok(saved)
    }

    /// Overlay the server's copy on what was sent and store it in the cache.
    fn remember(&self, mut record: Record, saved: Record, body: String) -> Result<CachedNote> {
        record.fields.extend(
            saved
                .fields
                .into_iter()
                .filter(|(_, field)| !field.value.is_null()),
        );
        record.record_change_tag = saved.record_change_tag.or(record.record_change_tag);
        record.created = saved.created.or(record.created);
        record.modified = saved.modified.or(record.modified);

        let note = CachedNote::from_record(&record, body);
        let mut cache = self.store.load_or_none().unwrap_or_default();
        cache.upsert(note.clone());
        self.store.save(&cache)?;
        Ok(note)
    }
}

/// Record name and unique identifier of a new note: an upper-case UUID.
fn new_identifier() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut normalized = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("Tag '{tag}' cannot contain spaces")));
        }
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}
