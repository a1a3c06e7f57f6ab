use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{NoneAsEmptyString, serde_as};
use std::time::Duration;

use crate::{
    CredentialRecord, DEFAULT_REGION, Endpoints, ToolError, UpstreamError, fetch_usage_quota,
    format_timestamp,
};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const DESKTOP_USER_AGENT: &str = "KiroIDE-0.7.45";
const DEFAULT_EXPIRES_IN: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;
const ERROR_BODY_LOG_LIMIT: usize = 200;

/// How a record is refreshed. Records carrying a client id and secret use the
/// identity provider's OIDC token endpoint; everything else goes through the
/// desktop session endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthProtocol {
    IdentityProviderOidc,
    DesktopSession,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DesktopRefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OidcRefreshRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    access_token: Option<String>,
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[serde_as]
#[derive(Deserialize)]
struct AccessTokenClaims {
    #[serde(default)]
    #[serde_as(as = "NoneAsEmptyString")]
    email: Option<String>,
}

impl AuthProtocol {
    pub fn for_record(record: &CredentialRecord) -> Self {
        if record.client_id().is_some() && record.client_secret().is_some() {
            AuthProtocol::IdentityProviderOidc
        } else {
            AuthProtocol::DesktopSession
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AuthProtocol::IdentityProviderOidc => "aws-sso-oidc",
            AuthProtocol::DesktopSession => "kiro-desktop",
        }
    }

    pub fn exchange(
        self,
        record: &CredentialRecord,
        endpoints: &Endpoints,
    ) -> Result<TokenGrant, ToolError> {
        let refresh_token = record
            .refresh_token()
            .ok_or(ToolError::MissingField("refreshToken"))?;
        let region = record.region().unwrap_or(DEFAULT_REGION);
        let response = match self {
            AuthProtocol::DesktopSession => {
                let url = endpoints.desktop_refresh_url(region);
                let request = DesktopRefreshRequest { refresh_token };
                post_refresh(&url, &request, Some(DESKTOP_USER_AGENT))
            }
            AuthProtocol::IdentityProviderOidc => {
                let request = OidcRefreshRequest {
                    grant_type: "refresh_token",
                    client_id: record
                        .client_id()
                        .ok_or(ToolError::MissingField("clientId"))?,
                    client_secret: record
                        .client_secret()
                        .ok_or(ToolError::MissingField("clientSecret"))?,
                    refresh_token,
                };
                post_refresh(&endpoints.oidc_token_url(region), &request, None)
            }
        }?;
        Ok(grant_from_response(response)?)
    }
}

fn post_refresh<T: Serialize>(
    url: &str,
    request: &T,
    user_agent: Option<&str>,
) -> Result<RefreshResponse, UpstreamError> {
    tracing::debug!(url, "requesting token refresh");
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(EXCHANGE_TIMEOUT))
        .http_status_as_error(false)
        .build();
    let agent: ureq::Agent = config.into();
    let mut builder = agent.post(url).header("Content-Type", "application/json");
    if let Some(user_agent) = user_agent {
        builder = builder.header("User-Agent", user_agent);
    }
    let response = builder
        .send_json(request)
        .map_err(|err| UpstreamError::Transport(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.into_body().read_to_string().unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_BODY_LOG_LIMIT).collect();
        tracing::warn!(status = status.as_u16(), body = %snippet, "token refresh rejected");
        return Err(UpstreamError::Status(status.as_u16()));
    }
    response
        .into_body()
        .read_json::<RefreshResponse>()
        .map_err(|err| UpstreamError::InvalidResponse(err.to_string()))
}

fn grant_from_response(response: RefreshResponse) -> Result<TokenGrant, UpstreamError> {
    let Some(access_token) = response.access_token else {
        return Err(UpstreamError::MissingAccessToken);
    };
    Ok(TokenGrant {
        access_token,
        refresh_token: response.refresh_token,
        expires_in: response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
    })
}

/// Applies a grant: new access token, rotated refresh token when one was issued,
/// and an expiry one minute short of what the server granted.
pub fn apply_grant(record: &mut CredentialRecord, grant: TokenGrant, now: DateTime<Utc>) {
    let expires_at = TimeDelta::try_seconds(grant.expires_in.saturating_sub(EXPIRY_MARGIN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now);
    record.expires_at = Some(format_timestamp(expires_at));
    if record.email().is_none()
        && let Some(email) = email_from_access_token(&grant.access_token)
    {
        record.email = Some(email);
    }
    record.access_token = Some(grant.access_token);
    if let Some(refresh_token) = grant.refresh_token {
        record.refresh_token = Some(refresh_token);
    }
}

/// Reads the `email` claim when the access token happens to be a JWT.
pub fn email_from_access_token(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: AccessTokenClaims = serde_json::from_slice(&decoded).ok()?;
    claims.email
}

/// Exchanges the record's refresh token and attaches a fresh usage quota when
/// the usage lookup succeeds. The input record is left as it was.
pub fn refresh_record(
    record: &CredentialRecord,
    endpoints: &Endpoints,
) -> Result<CredentialRecord, ToolError> {
    let protocol = AuthProtocol::for_record(record);
    tracing::info!(protocol = protocol.label(), "refreshing credential");
    let grant = protocol.exchange(record, endpoints)?;
    let mut refreshed = record.clone();
    apply_grant(&mut refreshed, grant, Utc::now());
    if let Some(quota) = refreshed
        .access_token()
        .and_then(|token| fetch_usage_quota(endpoints, token))
    {
        refreshed.usage_limit = Some(quota);
    }
    Ok(refreshed)
}
