pub mod add;
pub mod append;
pub mod archive;
pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod list;
pub mod search;
pub mod show;
pub mod sync;
pub mod trash;
