//! CloudKit credential pair and the places it can come from.
//!
//! Signing in happens outside this crate (a browser flow hands back the web
//! auth token). The core only needs [`CredentialSource::acquire_credential`].

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;
use crate::{Error, Result};

const ENV_WEB_AUTH_TOKEN: &str = "BEARSYNC_WEB_AUTH_TOKEN";
const ENV_API_TOKEN: &str = "BEARSYNC_API_TOKEN";

/// The two values attached to every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Per-session web auth token (`ckWebAuthToken`).
    pub bearer_token: String,
    /// Fixed API token of the container (`ckAPIToken`).
    #[serde(alias = "fixedServiceToken")]
    pub service_token: String,
}

impl Credentials {
    pub fn new(bearer_token: impl Into<String>, service_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            service_token: service_token.into(),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.bearer_token.trim().is_empty() {
            return Err(Error::Credentials("web auth token must not be empty".into()));
        }
        if self.service_token.trim().is_empty() {
            return Err(Error::Credentials("API token must not be empty".into()));
        }
        Ok(self)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("bearer_token", &"[REDACTED]")
            .field("service_token", &"[REDACTED]")
            .finish()
    }
}

/// Anything that can hand out a credential pair.
pub trait CredentialSource {
    /// Returns `Ok(None)` when this source has nothing configured.
    fn acquire_credential(&self) -> Result<Option<Credentials>>;
}

/// Return the first credential pair any source provides.
pub fn acquire_from(sources: &[&dyn CredentialSource]) -> Result<Option<Credentials>> {
    for source in sources {
        if let Some(credentials) = source.acquire_credential()? {
            return Ok(Some(credentials));
        }
    }
    Ok(None)
}

/// Reads `BEARSYNC_WEB_AUTH_TOKEN` and `BEARSYNC_API_TOKEN`.
pub struct EnvCredentialSource<F = fn(&str) -> Option<String>> {
    lookup: F,
}

impl EnvCredentialSource {
    pub fn from_env() -> Self {
        Self {
            lookup: |key| std::env::var(key).ok(),
        }
    }
}

impl<F: Fn(&str) -> Option<String>> EnvCredentialSource<F> {
    pub const fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }
}

impl<F: Fn(&str) -> Option<String>> CredentialSource for EnvCredentialSource<F> {
    fn acquire_credential(&self) -> Result<Option<Credentials>> {
        let bearer = normalize_text_option((self.lookup)(ENV_WEB_AUTH_TOKEN));
        let service = normalize_text_option((self.lookup)(ENV_API_TOKEN));

        match (bearer, service) {
            (None, None) => Ok(None),
            (Some(bearer), Some(service)) => Ok(Some(Credentials::new(bearer, service))),
            _ => Err(Error::Credentials(format!(
                "set both {ENV_WEB_AUTH_TOKEN} and {ENV_API_TOKEN}, or neither"
            ))),
        }
    }
}

/// JSON credential file, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let credentials = credentials.clone().validate()?;
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        restrict_permissions(file.as_file())?;
        file.write_all(serde_json::to_string_pretty(&credentials)?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|error| error.error)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

impl CredentialSource for FileCredentialStore {
    fn acquire_credential(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let credentials: Credentials = serde_json::from_str(&raw).map_err(|error| {
            Error::Credentials(format!(
                "Failed to parse credentials at {}: {}",
                self.path.display(),
                error
            ))
        })?;
        credentials.validate().map(Some)
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn restrict_permissions(_file: &std::fs::File) -> Result<()> {
    Ok(())
}
