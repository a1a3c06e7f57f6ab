use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::fs;
use std::path::Path;

use crate::{
    CRED_ERR_FILE_NOT_FOUND, CRED_ERR_IMPORT_NOT_OBJECT, CRED_ERR_INVALID_JSON, CRED_ERR_READ,
    CRED_ERR_SERIALIZE, CRED_ERR_WRITE, ToolError, write_atomic,
};

pub const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_AUTH_METHOD: &str = "IdC";
const DEFAULT_PROVIDER: &str = "BuilderId";

/// Fields a record needs before it can be refreshed.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "refreshToken",
    "expiresAt",
    "region",
    "clientId",
    "clientSecret",
];
const IMPORT_REQUIRED_FIELDS: [&str; 3] = ["refreshToken", "clientId", "clientSecret"];

/// One stored account entry. Unknown keys are carried through `extra` untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<UsageQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credit quota. `remaining` is always `limit - used`, floored at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredQuota")]
pub struct UsageQuota {
    limit: u64,
    used: u64,
    remaining: u64,
}

#[derive(Deserialize)]
struct StoredQuota {
    #[serde(default)]
    limit: f64,
    #[serde(default)]
    used: f64,
}

impl From<StoredQuota> for UsageQuota {
    fn from(stored: StoredQuota) -> Self {
        UsageQuota::new(count_from_f64(stored.limit), count_from_f64(stored.used))
    }
}

impl UsageQuota {
    pub fn new(limit: u64, used: u64) -> Self {
        UsageQuota {
            limit,
            used,
            remaining: limit.saturating_sub(used),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// Truncates toward zero; negative and non-finite counts become zero.
pub(crate) fn count_from_f64(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.trunc() as u64
    } else {
        0
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl CredentialRecord {
    pub fn email(&self) -> Option<&str> {
        non_empty(&self.email)
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(&self.region)
    }

    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_id)
    }

    pub fn client_secret(&self) -> Option<&str> {
        non_empty(&self.client_secret)
    }

    pub fn expires_at_raw(&self) -> Option<&str> {
        non_empty(&self.expires_at)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_raw().and_then(parse_timestamp)
    }

    pub fn subscription_title(&self) -> Option<&str> {
        non_empty(&self.subscription_title)
    }

    /// Non-empty value of a camelCase field name, for the required-field checks.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "email" => self.email(),
            "accessToken" => self.access_token(),
            "refreshToken" => self.refresh_token(),
            "expiresAt" => self.expires_at_raw(),
            "region" => self.region(),
            "clientId" => self.client_id(),
            "clientSecret" => self.client_secret(),
            "subscriptionTitle" => self.subscription_title(),
            other => self
                .extra
                .get(other)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .into_iter()
            .filter(|name| self.field(name).is_none())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Records without a parseable expiry count as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires_at| expires_at <= now)
    }
}

/// Parses RFC 3339, or a naive ISO-8601 timestamp which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Complete records ordered by expiry, latest first. Missing expiry sorts last.
pub fn valid_credentials(records: &[CredentialRecord]) -> Result<Vec<CredentialRecord>, ToolError> {
    let mut valid: Vec<CredentialRecord> = records
        .iter()
        .filter(|record| record.is_valid())
        .cloned()
        .collect();
    if valid.is_empty() {
        return Err(ToolError::NoValidCredentials);
    }
    valid.sort_by_key(|record| Reverse(record.expires_at().unwrap_or(DateTime::<Utc>::MIN_UTC)));
    Ok(valid)
}

/// Builds a new record from a pasted JSON object, applying defaults for optional keys.
pub fn import_record(json: &str) -> Result<CredentialRecord, ToolError> {
    let value: Value = serde_json::from_str(json.trim())
        .map_err(|err| ToolError::InvalidImport(err.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(ToolError::InvalidImport(CRED_ERR_IMPORT_NOT_OBJECT.to_string()));
    };
    for field in IMPORT_REQUIRED_FIELDS {
        let present = map
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.trim().is_empty());
        if !present {
            return Err(ToolError::MissingField(field));
        }
    }
    let region_missing = map
        .get("region")
        .and_then(Value::as_str)
        .is_none_or(|value| value.trim().is_empty());
    if region_missing {
        map.insert("region".to_string(), Value::from(DEFAULT_REGION));
    }
    for (key, default) in [
        ("email", ""),
        ("accessToken", ""),
        ("expiresAt", ""),
        ("authMethod", DEFAULT_AUTH_METHOD),
        ("provider", DEFAULT_PROVIDER),
    ] {
        map.entry(key).or_insert_with(|| Value::from(default));
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|err| ToolError::InvalidImport(err.to_string()))
}

pub fn read_collection(path: &Path) -> Result<Vec<CredentialRecord>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(crate::msg1(CRED_ERR_FILE_NOT_FOUND, path.display()));
        }
        Err(err) => return Err(crate::msg2(CRED_ERR_READ, path.display(), err)),
    };
    serde_json::from_str(&contents)
        .map_err(|err| crate::msg2(CRED_ERR_INVALID_JSON, path.display(), err))
}

/// Like `read_collection`, but a missing file is an empty collection.
pub fn read_collection_or_empty(path: &Path) -> Result<Vec<CredentialRecord>, String> {
    if path.exists() {
        read_collection(path)
    } else {
        Ok(Vec::new())
    }
}

pub fn write_collection(path: &Path, records: &[CredentialRecord]) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(records).map_err(|err| crate::msg1(CRED_ERR_SERIALIZE, err))?;
    write_atomic(path, format!("{json}\n").as_bytes())
        .map_err(|err| crate::msg2(CRED_ERR_WRITE, path.display(), err))
}

/// Identifies a stored record across a refresh, which may rotate its refresh token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    ClientId(String),
    RefreshToken(String),
}

impl RecordKey {
    pub fn of(record: &CredentialRecord) -> Option<RecordKey> {
        if let Some(client_id) = record.client_id() {
            return Some(RecordKey::ClientId(client_id.to_string()));
        }
        record
            .refresh_token()
            .map(|token| RecordKey::RefreshToken(token.to_string()))
    }

    pub fn matches(&self, record: &CredentialRecord) -> bool {
        match self {
            RecordKey::ClientId(id) => record.client_id() == Some(id.as_str()),
            RecordKey::RefreshToken(token) => record.refresh_token() == Some(token.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Updated(usize),
    Appended,
}

/// Writes the refreshed token fields back into the stored record with the same key.
pub fn merge_refreshed(
    collection: &mut Vec<CredentialRecord>,
    key: Option<&RecordKey>,
    refreshed: &CredentialRecord,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let stamp = format_timestamp(now);
    let position = key.and_then(|key| collection.iter().position(|record| key.matches(record)));
    let Some(idx) = position else {
        let mut appended = refreshed.clone();
        appended.last_refreshed = Some(stamp);
        collection.push(appended);
        return MergeOutcome::Appended;
    };
    let stored = &mut collection[idx];
    stored.access_token = refreshed.access_token.clone();
    stored.refresh_token = refreshed.refresh_token.clone();
    stored.expires_at = refreshed.expires_at.clone();
    if refreshed.usage_limit.is_some() {
        stored.usage_limit = refreshed.usage_limit;
    }
    if stored.email().is_none() && refreshed.email().is_some() {
        stored.email = refreshed.email.clone();
    }
    stored.last_refreshed = Some(stamp);
    MergeOutcome::Updated(idx)
}
