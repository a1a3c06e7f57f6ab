use ciborium::Value;
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    Endpoints, USAGE_ERR_ENCODE, USAGE_ERR_INVALID_RESPONSE, USAGE_ERR_REQUEST_FAILED_CODE,
    USAGE_ERR_SERVICE_UNREACHABLE, USAGE_QUOTA_LINE, USAGE_UNAVAILABLE_DEFAULT, UsageQuota,
    count_from_f64, is_plain, style_text, use_color_stdout,
};

const USAGE_TIMEOUT: Duration = Duration::from_secs(10);
const AMZ_USER_AGENT: &str = "aws-sdk-js/1.0.0 kiro-account-manager/1.0.0";
const CREDIT_RESOURCE: &str = "CREDIT";
const TRIAL_ACTIVE: &str = "ACTIVE";
const BAR_WIDTH: usize = 20;

#[derive(Debug)]
pub enum UsageFetchError {
    Status(u16),
    Transport(String),
    Encode(String),
    Parse(String),
}

impl UsageFetchError {
    pub fn message(&self) -> String {
        match self {
            UsageFetchError::Status(code) => crate::msg1(USAGE_ERR_REQUEST_FAILED_CODE, code),
            UsageFetchError::Transport(err) => crate::msg1(USAGE_ERR_SERVICE_UNREACHABLE, err),
            UsageFetchError::Encode(err) => crate::msg1(USAGE_ERR_ENCODE, err),
            UsageFetchError::Parse(err) => crate::msg1(USAGE_ERR_INVALID_RESPONSE, err),
        }
    }
}

impl std::fmt::Display for UsageFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageRequest {
    is_email_required: bool,
    origin: &'static str,
}

/// Looks up the credit quota for an access token. Any failure yields `None`.
pub fn fetch_usage_quota(endpoints: &Endpoints, access_token: &str) -> Option<UsageQuota> {
    if access_token.is_empty() {
        return None;
    }
    match fetch_usage_document(&endpoints.usage, access_token) {
        Ok(document) => {
            let quota = quota_from_document(&document);
            if quota.is_none() {
                tracing::debug!("usage response carried no credit quota");
            }
            quota
        }
        Err(err) => {
            tracing::debug!(error = %err, "usage lookup failed");
            None
        }
    }
}

fn fetch_usage_document(url: &str, access_token: &str) -> Result<Value, UsageFetchError> {
    let request = UsageRequest {
        is_email_required: true,
        origin: "KIRO_IDE",
    };
    let mut body = Vec::new();
    ciborium::into_writer(&request, &mut body)
        .map_err(|err| UsageFetchError::Encode(err.to_string()))?;

    let config = ureq::Agent::config_builder()
        .timeout_global(Some(USAGE_TIMEOUT))
        .build();
    let agent: ureq::Agent = config.into();
    let response = match agent
        .post(url)
        .header("accept", "application/cbor")
        .header("content-type", "application/cbor")
        .header("smithy-protocol", "rpc-v2-cbor")
        .header("amz-sdk-invocation-id", &Uuid::new_v4().to_string())
        .header("amz-sdk-request", "attempt=1; max=1")
        .header("x-amz-user-agent", AMZ_USER_AGENT)
        .header("authorization", &format!("Bearer {access_token}"))
        .header("cookie", &format!("Idp=BuilderId; AccessToken={access_token}"))
        .send(&body[..])
    {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(code)) => return Err(UsageFetchError::Status(code)),
        Err(err) => return Err(UsageFetchError::Transport(err.to_string())),
    };
    let status = response.status().as_u16();
    if status != 200 {
        return Err(UsageFetchError::Status(status));
    }
    let bytes = response
        .into_body()
        .read_to_vec()
        .map_err(|err| UsageFetchError::Transport(err.to_string()))?;
    ciborium::from_reader(bytes.as_slice()).map_err(|err| UsageFetchError::Parse(err.to_string()))
}

/// Extracts the CREDIT entry, adding an active free trial on top of the base allowance.
fn quota_from_document(document: &Value) -> Option<UsageQuota> {
    let root = document.as_map()?;
    if map_get(root, "__type").is_some() {
        return None;
    }
    let credit = map_get(root, "usageBreakdownList")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_map)
        .find(|entry| {
            map_get(entry, "resourceType").and_then(Value::as_text) == Some(CREDIT_RESOURCE)
        })?;
    let mut limit = count_of(map_get(credit, "usageLimit"));
    let mut used = count_of(map_get(credit, "currentUsage"));
    let trial = map_get(credit, "freeTrialInfo")
        .and_then(Value::as_map)
        .filter(|trial| {
            map_get(trial, "freeTrialStatus").and_then(Value::as_text) == Some(TRIAL_ACTIVE)
        });
    if let Some(trial) = trial {
        limit = limit.saturating_add(count_of(map_get(trial, "usageLimit")));
        used = used.saturating_add(count_of(map_get(trial, "currentUsage")));
    }
    Some(UsageQuota::new(limit, used))
}

fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(entry_key, _)| entry_key.as_text() == Some(key))
        .map(|(_, value)| value)
}

fn count_of(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Integer(int)) => u64::try_from(*int).unwrap_or(0),
        Some(Value::Float(float)) => count_from_f64(*float),
        _ => 0,
    }
}

pub fn usage_unavailable() -> &'static str {
    USAGE_UNAVAILABLE_DEFAULT
}

/// One-line quota summary, with a remaining-credit bar unless output is plain.
pub fn format_quota(quota: &UsageQuota) -> String {
    let summary = crate::msg3(
        USAGE_QUOTA_LINE,
        quota.used(),
        quota.limit(),
        quota.remaining(),
    );
    if is_plain() {
        return summary;
    }
    let left_percent = remaining_percent(quota);
    let bar = style_usage_bar(&render_bar(left_percent), left_percent);
    format!("{bar} {summary}")
}

pub fn format_usage_unavailable(use_color: bool) -> String {
    style_text(usage_unavailable(), use_color, |text| text.dimmed().italic())
}

fn remaining_percent(quota: &UsageQuota) -> f64 {
    if quota.limit() == 0 {
        return 0.0;
    }
    (quota.remaining() as f64 / quota.limit() as f64 * 100.0).clamp(0.0, 100.0)
}

fn render_bar(left_percent: f64) -> String {
    let filled = ((left_percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!(
        "{}{}",
        "▮".repeat(filled),
        "▯".repeat(BAR_WIDTH - filled)
    )
}

fn style_usage_bar(bar: &str, left_percent: f64) -> String {
    if !use_color_stdout() {
        return bar.to_string();
    }
    if left_percent >= 66.0 {
        bar.green().to_string()
    } else if left_percent >= 33.0 {
        bar.yellow().to_string()
    } else {
        bar.red().to_string()
    }
}
