//! CloudKit web services client.
//!
//! Speaks the same request shapes as the Bear web app so the service treats
//! this client as an equivalent peer. Every call is a single POST against the
//! private database of the configured container, authenticated with two query
//! parameters.

mod types;

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use types::{
    OperationType, QueryFilter, QueryPage, QuerySort, Record, RecordOperation, RecordQuery,
    RecordStamp, ZoneChangesPage, ZoneId, ZoneInfo,
};
use types::{
    LookupRequest, ModifyRequest, QueryBody, QueryRequest, RecordName, RecordsResponse,
    ZoneChangesEntry, ZoneChangesRequest, ZoneChangesResponse, ZonesResponse,
};

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::util::compact_text;

const HTTP_TIMEOUT_SECS: u64 = 30;
const ASSET_FILE_NAME: &str = "text.txt";

#[derive(Debug, Error)]
pub enum CloudKitError {
    #[error("CloudKit session expired; sign in again")]
    AuthExpired,
    #[error("CloudKit API error {code}: {body}")]
    Api { code: String, body: String },
    #[error("CloudKit request failed: {0}")]
    Network(String),
    #[error("Asset download failed: {0}")]
    AssetDownload(String),
}

pub type CloudKitResult<T> = Result<T, CloudKitError>;

/// Authenticated client bound to one container database and zone.
#[derive(Clone)]
pub struct CloudKitClient {
    database_url: String,
    origin: String,
    zone: ZoneId,
    credentials: Credentials,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudKitClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CloudKitClient")
            .field("database_url", &self.database_url)
            .field("zone", &self.zone)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl CloudKitClient {
    pub fn new(config: &ClientConfig, credentials: Credentials) -> crate::Result<Self> {
        let database_url = config.database_url()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| CloudKitError::Network(error.to_string()))?;

        Ok(Self {
            database_url,
            origin: config.origin.clone(),
            zone: ZoneId::new(config.zone_name.clone()),
            credentials,
            client,
        })
    }

    pub const fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Full URL of a database route, credentials included.
    pub fn endpoint_url(&self, route: &str) -> String {
        format!(
            "{}/{}?ckWebAuthToken={}&ckAPIToken={}",
            self.database_url,
            route.trim_start_matches('/'),
            encode_credential(&self.credentials.bearer_token),
            encode_credential(&self.credentials.service_token),
        )
    }

    /// List the zones of the database with their current change tokens.
    pub async fn list_zones(&self) -> CloudKitResult<Vec<ZoneInfo>> {
        let response: ZonesResponse = self.post("zones/list", &serde_json::json!({})).await?;
        Ok(response.zones)
    }

    /// Fetch a single page of query results.
    pub async fn query_page(
        &self,
        query: &RecordQuery,
        continuation_marker: Option<&str>,
    ) -> CloudKitResult<QueryPage> {
        let request = QueryRequest {
            zone_id: &self.zone,
            query: QueryBody {
                record_type: &query.record_type,
                filter_by: &query.filters,
                sort_by: &query.sort,
            },
            results_limit: query.limit,
            desired_keys: &query.desired_keys,
            continuation_marker,
        };
        self.post("records/query", &request).await
    }

    /// Fetch the first page of query results.
    pub async fn query(&self, query: &RecordQuery) -> CloudKitResult<Vec<Record>> {
        Ok(self.query_page(query, None).await?.records)
    }

    /// Fetch every page of query results, in server order.
    pub async fn query_all(&self, query: &RecordQuery) -> CloudKitResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut marker: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.query_page(query, marker.as_deref()).await?;
            pages += 1;
            records.extend(page.records);

            match page.continuation_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Query for {} returned {} records in {} pages",
            query.record_type,
            records.len(),
            pages
        );
        Ok(records)
    }

    /// Look records up by name. Names the server cannot find are left out.
    pub async fn lookup(
        &self,
        record_names: &[&str],
        desired_keys: &[String],
    ) -> CloudKitResult<Vec<Record>> {
        let request = LookupRequest {
            records: record_names
                .iter()
                .copied()
                .map(|record_name| RecordName { record_name })
                .collect(),
            zone_id: &self.zone,
            desired_keys,
        };
        let response: RecordsResponse = self.post("records/lookup", &request).await?;

        Ok(response
            .records
            .into_iter()
            .filter(|record| {
                if let Some(code) = &record.server_error_code {
                    tracing::debug!("Lookup skipped {}: {}", record.record_name, code);
                    false
                } else {
                    true
                }
            })
            .collect())
    }

    /// Submit a batch of create/update operations.
    ///
    /// The returned list mirrors the batch; entries the server refused carry
    /// `serverErrorCode`. Whether a partly refused batch applied the rest is
    /// up to the service.
    pub async fn modify(&self, operations: &[RecordOperation]) -> CloudKitResult<Vec<Record>> {
        let request = ModifyRequest {
            operations,
            zone_id: &self.zone,
        };
        let response: RecordsResponse = self.post("records/modify", &request).await?;
        Ok(response.records)
    }

    /// Fetch one page of the zone change feed, starting after `sync_token`.
    pub async fn zone_changes(
        &self,
        sync_token: Option<&str>,
        desired_keys: &[String],
    ) -> CloudKitResult<ZoneChangesPage> {
        let request = ZoneChangesRequest {
            zones: [ZoneChangesEntry {
                zone_id: &self.zone,
                sync_token,
                desired_keys,
            }],
        };
        let response: ZoneChangesResponse = self.post("changes/zone", &request).await?;
        let page = response
            .zones
            .into_iter()
            .find(|page| page.zone_id.zone_name == self.zone.zone_name)
            .ok_or_else(|| {
                CloudKitError::Network(format!(
                    "change feed response did not include zone {}",
                    self.zone.zone_name
                ))
            })?;

        if let Some(code) = page.server_error_code {
            return Err(CloudKitError::Api {
                code,
                body: compact_text(page.reason.as_deref().unwrap_or_default()),
            });
        }
        Ok(page)
    }

    /// Download an asset body as UTF-8 text from its pre-authorized URL.
    pub async fn download_asset(&self, url: &str) -> CloudKitResult<String> {
        let url = url.replace("${f}", ASSET_FILE_NAME);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| CloudKitError::AssetDownload(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(CloudKitError::AssetDownload(format!(
                "HTTP {status} for {}",
                compact_text(&url)
            )));
        }

        response
            .text()
            .await
            .map_err(|error| CloudKitError::AssetDownload(error.to_string()))
    }

    async fn post<B, R>(&self, route: &str, body: &B) -> CloudKitResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!("POST {}", route);
        let payload = serde_json::to_string(body)
            .map_err(|error| CloudKitError::Network(format!("failed to encode {route}: {error}")))?;

        let response = self
            .client
            .post(self.endpoint_url(route))
            .header(CONTENT_TYPE, "text/plain")
            .header(ACCEPT, "application/json")
            .header(ORIGIN, &self.origin)
            .body(payload)
            .send()
            .await
            .map_err(|error| CloudKitError::Network(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status.as_u16() == 421 {
            return Err(CloudKitError::AuthExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudKitError::Api {
                code: status.as_u16().to_string(),
                body: compact_text(&body),
            });
        }

        response.json::<R>().await.map_err(|error| {
            CloudKitError::Network(format!("failed to decode {route} response: {error}"))
        })
    }
}

/// Percent-encode a credential for the query string.
///
/// The service reads a literal `+` as a space, so `+` must go out as `%2B`.
pub fn encode_credential(value: &str) -> String {
    urlencoding::encode(value).replace('+', "%2B")
}
