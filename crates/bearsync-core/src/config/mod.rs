//! Client configuration.
//!
//! Defaults match the Bear web app. A JSON file in the user config directory
//! can override any field, and a few environment variables override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const APP_DIR_NAME: &str = "bearsync";
const CONFIG_FILE_NAME: &str = "config.json";
const CACHE_FILE_NAME: &str = "cache.json";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

const ENV_API_BASE_URL: &str = "BEARSYNC_API_BASE_URL";
const ENV_CONTAINER: &str = "BEARSYNC_CONTAINER";
const ENV_ENVIRONMENT: &str = "BEARSYNC_ENVIRONMENT";
const ENV_CACHE_PATH: &str = "BEARSYNC_CACHE_PATH";
const ENV_CREDENTIALS_PATH: &str = "BEARSYNC_CREDENTIALS_PATH";
const ENV_DEVICE_ID: &str = "BEARSYNC_DEVICE_ID";

pub const DEFAULT_API_BASE_URL: &str = "https://api.apple-cloudkit.com";
pub const DEFAULT_CONTAINER: &str = "iCloud.net.shinyfrog.bear";
pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_DATABASE: &str = "private";
pub const DEFAULT_ZONE: &str = "Notes";
pub const DEFAULT_RECORD_TYPE: &str = "SFNote";
pub const DEFAULT_ORIGIN: &str = "https://web.bear.app";
pub const DEFAULT_DEVICE_ID: &str = "bearsync";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub container: String,
    pub environment: String,
    pub database: String,
    pub zone_name: String,
    pub record_type: String,
    pub origin: String,
    /// Device identity stamped into conflict markers.
    pub device_id: String,
    pub page_size: usize,
    pub cache_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            zone_name: DEFAULT_ZONE.to_string(),
            record_type: DEFAULT_RECORD_TYPE.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            page_size: crate::cloudkit::RecordQuery::DEFAULT_LIMIT,
            cache_path: None,
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&default_config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(value) = read(ENV_API_BASE_URL) {
            self.api_base_url = value;
        }
        if let Some(value) = read(ENV_CONTAINER) {
            self.container = value;
        }
        if let Some(value) = read(ENV_ENVIRONMENT) {
            self.environment = value;
        }
        if let Some(value) = read(ENV_DEVICE_ID) {
            self.device_id = value;
        }
        if let Some(value) = read(ENV_CACHE_PATH) {
            self.cache_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read(ENV_CREDENTIALS_PATH) {
            self.credentials_path = Some(PathBuf::from(value));
        }
    }

    /// Base URL of the configured database, e.g.
    /// `https://api.apple-cloudkit.com/database/1/<container>/production/private`.
    pub fn database_url(&self) -> Result<String> {
        let base = self.api_base_url.trim().trim_end_matches('/');
        if !is_http_url(base) {
            return Err(Error::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }

        let segments = [
            ("container", &self.container),
            ("environment", &self.environment),
            ("database", &self.database),
        ];
        for (name, value) in segments {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }

        Ok(format!(
            "{base}/database/1/{}/{}/{}",
            self.container.trim(),
            self.environment.trim(),
            self.database.trim()
        ))
    }

    pub fn resolve_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(CACHE_FILE_NAME)),
        }
    }

    pub fn resolve_credentials_path(&self) -> Result<PathBuf> {
        match &self.credentials_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(CREDENTIALS_FILE_NAME)),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| Error::Config("Failed to resolve config directory".to_string()))
}

fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| Error::Config("Failed to resolve data directory".to_string()))
}
