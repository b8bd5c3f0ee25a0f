//! Request and response shapes of the CloudKit web services API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{FieldValue, RecordField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneId {
    pub zone_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_record_name: Option<String>,
}

impl ZoneId {
    pub fn new(zone_name: impl Into<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
            owner_record_name: None,
        }
    }
}

/// A zone and its current position in the change history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    #[serde(rename = "zoneID")]
    pub zone_id: ZoneId,
    #[serde(default)]
    pub sync_token: Option<String>,
}

/// Who touched a record, and when (milliseconds since the epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStamp {
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_record_name: Option<String>,
    #[serde(rename = "deviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// A CloudKit record. Lookup and modify responses also use this shape for
/// per-record failures, which carry `serverErrorCode` instead of fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub record_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub record_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, RecordField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_change_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<RecordStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<RecordStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Record {
    pub fn new(record_name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .get(name)
            .map(|field| &field.value)
            .filter(|value| !value.is_null())
    }

    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }

    /// Read a 0/1 flag field; absent fields are `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.field(name).is_some_and(FieldValue::as_flag)
    }

    pub fn set_field(&mut self, name: &str, field: RecordField) {
        self.fields.insert(name.to_string(), field);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }

    pub const fn is_error(&self) -> bool {
        self.server_error_code.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub comparator: String,
    pub field_name: String,
    pub field_value: RecordField,
}

impl QueryFilter {
    pub fn equals(field_name: impl Into<String>, field_value: RecordField) -> Self {
        Self {
            comparator: "EQUALS".to_string(),
            field_name: field_name.into(),
            field_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySort {
    pub field_name: String,
    pub ascending: bool,
}

impl QuerySort {
    pub fn descending(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: false,
        }
    }
}

/// A record query: type, filters, sort order, page size and projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub record_type: String,
    pub filters: Vec<QueryFilter>,
    pub sort: Vec<QuerySort>,
    pub limit: usize,
    pub desired_keys: Vec<String>,
}

impl RecordQuery {
    pub const DEFAULT_LIMIT: usize = 200;

    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            filters: Vec::new(),
            sort: Vec::new(),
            limit: Self::DEFAULT_LIMIT,
            desired_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: QuerySort) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn desired_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desired_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub continuation_marker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOperation {
    pub operation_type: OperationType,
    pub record: Record,
}

impl RecordOperation {
    pub const fn create(record: Record) -> Self {
        Self {
            operation_type: OperationType::Create,
            record,
        }
    }

    pub const fn update(record: Record) -> Self {
        Self {
            operation_type: OperationType::Update,
            record,
        }
    }
}

/// One page of a zone's change feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneChangesPage {
    #[serde(rename = "zoneID")]
    pub zone_id: ZoneId,
    #[serde(default)]
    pub more_coming: bool,
    #[serde(default)]
    pub sync_token: Option<String>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub server_error_code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Request and response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRequest<'a> {
    #[serde(rename = "zoneID")]
    pub zone_id: &'a ZoneId,
    pub query: QueryBody<'a>,
    pub results_limit: usize,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub desired_keys: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_marker: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryBody<'a> {
    pub record_type: &'a str,
    pub filter_by: &'a [QueryFilter],
    pub sort_by: &'a [QuerySort],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LookupRequest<'a> {
    pub records: Vec<RecordName<'a>>,
    #[serde(rename = "zoneID")]
    pub zone_id: &'a ZoneId,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub desired_keys: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordName<'a> {
    pub record_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModifyRequest<'a> {
    pub operations: &'a [RecordOperation],
    #[serde(rename = "zoneID")]
    pub zone_id: &'a ZoneId,
}

#[derive(Debug, Serialize)]
pub(crate) struct ZoneChangesRequest<'a> {
    pub zones: [ZoneChangesEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZoneChangesEntry<'a> {
    #[serde(rename = "zoneID")]
    pub zone_id: &'a ZoneId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub desired_keys: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordsResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZonesResponse {
    #[serde(default)]
    pub zones: Vec<ZoneInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZoneChangesResponse {
    #[serde(default)]
    pub zones: Vec<ZoneChangesPage>,
}
