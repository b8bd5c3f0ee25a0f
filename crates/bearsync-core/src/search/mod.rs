//! Listing and search over the local note cache.
//!
//! Results are ordered by modification date, newest first; notes without a
//! date sort last.

use std::cmp::Reverse;

use crate::cache::NoteCache;
use crate::models::CachedNote;

/// Which notes a listing includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    pub include_archived: bool,
    pub include_trashed: bool,
    /// Only notes carrying this tag (case-insensitive, `#` optional)
    pub tag: Option<String>,
}

impl NoteFilter {
    fn matches(&self, note: &CachedNote) -> bool {
        if note.trashed && !self.include_trashed {
            return false;
        }
        if note.archived && !self.include_archived {
            return false;
        }
        self.tag.as_deref().is_none_or(|wanted| has_tag(note, wanted))
    }
}

/// List cached notes that pass `filter`, newest first.
pub fn list_notes<'a>(cache: &'a NoteCache, filter: &NoteFilter, limit: usize) -> Vec<&'a CachedNote> {
    let mut notes = cache
        .notes
        .values()
        .filter(|note| filter.matches(note))
        .collect::<Vec<_>>();
    sort_newest_first(&mut notes);
    notes.truncate(limit);
    notes
}

/// Case-insensitive substring search over title, body and tags.
///
/// Trashed notes are never returned. An empty query matches nothing.
pub fn search_notes<'a>(cache: &'a NoteCache, query: &str, limit: usize) -> Vec<&'a CachedNote> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let tag_needle = needle.trim_start_matches('#');

    let mut notes = cache
        .notes
        .values()
        .filter(|note| !note.trashed)
        .filter(|note| {
            note.title.to_lowercase().contains(&needle)
                || note.text.to_lowercase().contains(&needle)
                || note.tags.iter().any(|tag| tag.contains(tag_needle))
        })
        .collect::<Vec<_>>();
    sort_newest_first(&mut notes);
    notes.truncate(limit);
    notes
}

fn has_tag(note: &CachedNote, wanted: &str) -> bool {
    let wanted = wanted.trim().trim_start_matches('#').to_lowercase();
    note.tags.iter().any(|tag| {
        *tag == wanted
            || tag
                .strip_prefix(wanted.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn sort_newest_first(notes: &mut [&CachedNote]) {
    notes.sort_by_key(|note| (Reverse(note.modified_at), note.record_name.clone()));
}
