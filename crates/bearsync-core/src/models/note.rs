//! Cached note model

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cloudkit::Record;

/// Field names of the `SFNote` record type.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const SUBTITLE: &str = "subtitle";
    pub const TEXT: &str = "text";
    pub const TEXT_ASSET: &str = "textADP";
    pub const UNIQUE_IDENTIFIER: &str = "uniqueIdentifier";
    pub const TAGS: &str = "tagsStrings";
    pub const CREATION_DATE: &str = "sf_creationDate";
    pub const MODIFICATION_DATE: &str = "sf_modificationDate";
    pub const PINNED: &str = "pinned";
    pub const ARCHIVED: &str = "archived";
    pub const TRASHED: &str = "trashed";
    pub const LOCKED: &str = "locked";
    pub const HAS_FILES: &str = "hasFiles";
    pub const VECTOR_CLOCK: &str = "vectorClock";

    /// Projection requested for every note fetch.
    pub const DESIRED_KEYS: &[&str] = &[
        TITLE,
        SUBTITLE,
        TEXT,
        TEXT_ASSET,
        UNIQUE_IDENTIFIER,
        TAGS,
        CREATION_DATE,
        MODIFICATION_DATE,
        PINNED,
        ARCHIVED,
        TRASHED,
        LOCKED,
        HAS_FILES,
        VECTOR_CLOCK,
    ];

    pub fn desired_keys() -> Vec<String> {
        DESIRED_KEYS.iter().map(ToString::to_string).collect()
    }
}

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)#([a-zA-Z][a-zA-Z0-9_/-]*)").expect("Invalid regex")
});

/// A note as kept in the local cache: record fields flattened, body resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct CachedNote {
    /// CloudKit record name
    pub record_name: String,
    /// Bear's own note identifier
    #[serde(default)]
    pub unique_identifier: Option<String>,
    pub title: String,
    /// Full markdown body
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub has_files: bool,
    /// Last server revision tag seen for this record
    #[serde(default)]
    pub record_change_tag: Option<String>,
    /// Last conflict marker seen for this record (base64)
    #[serde(default)]
    pub vector_clock: Option<String>,
}

impl CachedNote {
    /// Project a record and its resolved body into a cache entry.
    #[must_use]
    pub fn from_record(record: &Record, text: String) -> Self {
        let title = record
            .string_field(fields::TITLE)
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map_or_else(|| title_from_text(&text), ToString::to_string);

        let tags = record
            .field(fields::TAGS)
            .map(crate::value::FieldValue::string_items)
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(|| extract_tags(&text));

        Self {
            record_name: record.record_name.clone(),
            unique_identifier: record
                .string_field(fields::UNIQUE_IDENTIFIER)
                .map(ToString::to_string),
            title,
            tags,
            created_at: timestamp_field(record, fields::CREATION_DATE)
                .or_else(|| record.created.as_ref().and_then(|stamp| from_millis(stamp.timestamp))),
            modified_at: timestamp_field(record, fields::MODIFICATION_DATE).or_else(|| {
                record
                    .modified
                    .as_ref()
                    .and_then(|stamp| from_millis(stamp.timestamp))
            }),
            pinned: record.flag(fields::PINNED),
            archived: record.flag(fields::ARCHIVED),
            trashed: record.flag(fields::TRASHED),
            locked: record.flag(fields::LOCKED),
            has_files: record.flag(fields::HAS_FILES),
            record_change_tag: record.record_change_tag.clone(),
            vector_clock: record
                .string_field(fields::VECTOR_CLOCK)
                .map(ToString::to_string),
            text,
        }
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.is_empty() {
            self.text.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.chars().take(max_len).collect()
    }
}

/// Title of a markdown body: its first non-empty line without heading marks.
#[must_use]
pub fn title_from_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Extract #tags from text
///
/// Valid tags match the pattern: `#[a-zA-Z][a-zA-Z0-9_/-]*` and must start a
/// word, so markdown headings (`# Title`) are not tags. Tags are returned in
/// lowercase, deduplicated and sorted.
///
/// # Examples
///
/// ```
/// use bearsync_core::models::extract_tags;
///
/// let tags = extract_tags("Hello #world this is #Rust-lang");
/// assert_eq!(tags, vec!["rust-lang", "world"]);
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    TAG_PATTERN
        .captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn timestamp_field(record: &Record, name: &str) -> Option<DateTime<Utc>> {
    record.field(name)?.as_i64().and_then(from_millis)
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::RecordField;

    fn note_record() -> Record {
        let mut record = Record::new("REC-1", "SFNote");
        record.record_change_tag = Some("tag-1".to_string());
        record.set_field(fields::UNIQUE_IDENTIFIER, RecordField::string("UID-1"));
        record.set_field(fields::PINNED, RecordField::int64(1));
        record.set_field(fields::ARCHIVED, RecordField::int64(0));
        record.set_field(fields::LOCKED, RecordField::flag(false));
        record.set_field(fields::CREATION_DATE, RecordField::timestamp(1_700_000_000_000));
        record.set_field(fields::VECTOR_CLOCK, RecordField::bytes("YnBsaXN0MDA="));
        record
    }

    #[test]
    fn from_record_flattens_fields() {
        let note = CachedNote::from_record(&note_record(), "# Groceries\nmilk #home".to_string());

        assert_eq!(note.record_name, "REC-1");
        assert_eq!(note.unique_identifier.as_deref(), Some("UID-1"));
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.tags, vec!["home"]);
        assert!(note.pinned);
        assert!(!note.archived);
        assert!(!note.locked);
        assert_eq!(
            note.created_at.map(|date| date.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(note.modified_at, None);
        assert_eq!(note.record_change_tag.as_deref(), Some("tag-1"));
        assert_eq!(note.vector_clock.as_deref(), Some("YnBsaXN0MDA="));
    }

    #[test]
    fn explicit_title_and_tags_win() {
        let mut record = note_record();
        record.set_field(fields::TITLE, RecordField::string("Shopping"));
        record.set_field(fields::TAGS, RecordField::string_list(["errands"]));

        let note = CachedNote::from_record(&record, "# Groceries\n#home".to_string());
        assert_eq!(note.title, "Shopping");
        assert_eq!(note.tags, vec!["errands"]);
    }

    #[test]
    fn title_from_text_skips_blank_lines() {
        assert_eq!(title_from_text("\n\n## Plans\nbody"), "Plans");
        assert_eq!(title_from_text(""), "");
    }

    #[test]
    fn test_extract_tags_basic() {
        let tags = extract_tags("Hello #world");
        assert_eq!(tags, vec!["world"]);
    }

    #[test]
    fn test_extract_tags_nested_and_deduplicated() {
        let tags = extract_tags("#work/projects #Work/Projects #home");
        assert_eq!(tags, vec!["home", "work/projects"]);
    }

    #[test]
    fn test_extract_tags_ignores_headings_and_numbers() {
        assert!(extract_tags("# Heading\n#123 issue").is_empty());
        assert!(extract_tags("email me at a#b").is_empty());
    }

    #[test]
    fn test_title_preview() {
        let note = CachedNote {
            text: "First line\nSecond line".to_string(),
            ..CachedNote::default()
        };
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");
    }
}
