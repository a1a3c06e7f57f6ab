use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{CredentialRecord, EXPORT_ERR_SERIALIZE, EXPORT_ERR_WRITE, ToolError, write_atomic};

pub const EXPORT_FIELDS: [&str; 6] = [
    "accessToken",
    "refreshToken",
    "expiresAt",
    "region",
    "clientId",
    "clientSecret",
];

/// The single-credential file consumed by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub region: String,
    pub client_id: String,
    pub client_secret: String,
}

pub fn export_credential(record: &CredentialRecord) -> Result<ExportedCredential, ToolError> {
    let (
        Some(access_token),
        Some(refresh_token),
        Some(expires_at),
        Some(region),
        Some(client_id),
        Some(client_secret),
    ) = (
        record.access_token(),
        record.refresh_token(),
        record.expires_at_raw(),
        record.region(),
        record.client_id(),
        record.client_secret(),
    )
    else {
        let missing = EXPORT_FIELDS
            .into_iter()
            .filter(|name| record.field(name).is_none())
            .collect();
        return Err(ToolError::IncompleteRecord(missing));
    };
    Ok(ExportedCredential {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires_at: expires_at.to_string(),
        region: region.to_string(),
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
    })
}

pub fn write_exported(path: &Path, exported: &ExportedCredential) -> Result<(), String> {
    let json = serde_json::to_string_pretty(exported)
        .map_err(|err| crate::msg1(EXPORT_ERR_SERIALIZE, err))?;
    write_atomic(path, format!("{json}\n").as_bytes())
        .map_err(|err| crate::msg2(EXPORT_ERR_WRITE, path.display(), err))
}

/// Refresh token of the currently exported credential, used to mark it in listings.
/// A missing file is not an error.
pub fn read_exported_refresh_token(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value
        .get("refreshToken")
        .and_then(serde_json::Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string))
}
