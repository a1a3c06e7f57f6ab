use std::fmt;

use crate::AuthMethod;
use crate::{
    CRED_ERR_INVALID_IMPORT, CRED_ERR_MISSING_FIELD, CRED_ERR_NO_VALID, EXPORT_ERR_INCOMPLETE,
    SWITCH_ERR_EMPTY_VALUE, SWITCH_ERR_TARGET_NOT_FOUND, UPSTREAM_ERR_INVALID_RESPONSE,
    UPSTREAM_ERR_MISSING_ACCESS_TOKEN, UPSTREAM_ERR_STATUS, UPSTREAM_ERR_TRANSPORT,
    UPSTREAM_ERR_UNAUTHORIZED,
};

/// Failures surfaced by the token lifecycle and auth switching operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolError {
    NoValidCredentials,
    MissingField(&'static str),
    Upstream(UpstreamError),
    IncompleteRecord(Vec<&'static str>),
    EmptyValue,
    InvalidImport(String),
    /// The chosen method's key line was not found inside its section.
    TargetLineNotFound(AuthMethod),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamError {
    Status(u16),
    Transport(String),
    InvalidResponse(String),
    MissingAccessToken,
}

impl ToolError {
    pub fn message(&self) -> String {
        match self {
            ToolError::NoValidCredentials => CRED_ERR_NO_VALID.to_string(),
            ToolError::MissingField(field) => crate::msg1(CRED_ERR_MISSING_FIELD, field),
            ToolError::Upstream(err) => err.message(),
            ToolError::IncompleteRecord(fields) => {
                crate::msg1(EXPORT_ERR_INCOMPLETE, fields.join(", "))
            }
            ToolError::EmptyValue => SWITCH_ERR_EMPTY_VALUE.to_string(),
            ToolError::InvalidImport(reason) => crate::msg1(CRED_ERR_INVALID_IMPORT, reason),
            ToolError::TargetLineNotFound(method) => {
                crate::msg2(SWITCH_ERR_TARGET_NOT_FOUND, method.key(), method.section_label())
            }
        }
    }
}

impl UpstreamError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UpstreamError::Status(code) => Some(*code),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            UpstreamError::Status(code @ (400 | 401 | 403)) => {
                crate::msg1(UPSTREAM_ERR_UNAUTHORIZED, code)
            }
            UpstreamError::Status(code) => crate::msg1(UPSTREAM_ERR_STATUS, code),
            UpstreamError::Transport(err) => crate::msg1(UPSTREAM_ERR_TRANSPORT, err),
            UpstreamError::InvalidResponse(err) => crate::msg1(UPSTREAM_ERR_INVALID_RESPONSE, err),
            UpstreamError::MissingAccessToken => UPSTREAM_ERR_MISSING_ACCESS_TOKEN.to_string(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ToolError {}

impl std::error::Error for UpstreamError {}

impl From<UpstreamError> for ToolError {
    fn from(err: UpstreamError) -> Self {
        ToolError::Upstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert!(
            ToolError::MissingField("clientSecret")
                .message()
                .contains("clientSecret")
        );
        let incomplete = ToolError::IncompleteRecord(vec!["accessToken", "clientSecret"]);
        assert!(incomplete.message().contains("accessToken, clientSecret"));
        assert!(
            ToolError::NoValidCredentials
                .to_string()
                .contains("No valid credentials")
        );
        let target = ToolError::TargetLineNotFound(AuthMethod::CliDb);
        assert!(target.message().contains("KIRO_CLI_DB_FILE"));
        assert!(target.message().contains("OPTION 3"));
    }

    #[test]
    fn upstream_status_variants() {
        let unauthorized = UpstreamError::Status(401);
        assert_eq!(unauthorized.status_code(), Some(401));
        assert!(unauthorized.message().contains("rejected"));
        let server = UpstreamError::Status(500);
        assert!(server.message().contains("(500)"));
        assert!(UpstreamError::Transport("timed out".into()).status_code().is_none());
        let wrapped: ToolError = UpstreamError::MissingAccessToken.into();
        assert!(wrapped.message().contains("access token"));
    }
}
