//! bearsync-core - Core library for bearsync
//!
//! This crate contains the CloudKit protocol client, the local note cache,
//! the synchronization engine, and the conflict marker codec used by the
//! `bearsync` command-line interface.

pub mod auth;
pub mod cache;
pub mod cloudkit;
pub mod config;
pub mod error;
pub mod marker;
pub mod models;
pub mod notes;
pub mod search;
pub mod sync;
pub mod util;
pub mod value;

pub use error::{Error, Result};
pub use models::{CachedNote, SyncStats};
