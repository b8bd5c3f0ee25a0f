//! Data models for bearsync

mod note;
mod sync_stats;

pub use note::{extract_tags, fields, title_from_text, CachedNote};
pub use sync_stats::SyncStats;
