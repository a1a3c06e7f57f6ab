pub const CANCELLED_MESSAGE: &str = "Cancelled.";

pub const CRED_ERR_NO_VALID: &str =
    "Error: No valid credentials found. Every record needs refreshToken, expiresAt, region, clientId and clientSecret.";
pub const CRED_ERR_MISSING_FIELD: &str = "Error: Missing required field: {}";
pub const CRED_ERR_INVALID_IMPORT: &str = "Error: Invalid credential JSON: {}";
pub const CRED_ERR_IMPORT_NOT_OBJECT: &str = "expected a JSON object";
pub const CRED_ERR_FILE_NOT_FOUND: &str = "Error: Credentials file {} not found.";
pub const CRED_ERR_READ: &str = "Error: Could not read {}: {}";
pub const CRED_ERR_INVALID_JSON: &str = "Error: Invalid JSON in {}: {}";
pub const CRED_ERR_SERIALIZE: &str = "Error: Could not serialize credentials: {}";
pub const CRED_ERR_WRITE: &str = "Error: Could not write {}: {}";

pub const UPSTREAM_ERR_UNAUTHORIZED: &str =
    "Error: Refresh token rejected ({})\nImport the account again with a fresh refresh token.";
pub const UPSTREAM_ERR_STATUS: &str = "Error: Token refresh failed. ({})";
pub const UPSTREAM_ERR_TRANSPORT: &str = "Error: Could not reach the token service: {}";
pub const UPSTREAM_ERR_INVALID_RESPONSE: &str = "Error: Invalid refresh response: {}";
pub const UPSTREAM_ERR_MISSING_ACCESS_TOKEN: &str =
    "Error: Refresh response is missing an access token.";

pub const USAGE_ERR_REQUEST_FAILED_CODE: &str = "Error: Usage request failed. ({})";
pub const USAGE_ERR_SERVICE_UNREACHABLE: &str = "Error: Could not reach usage service: {}";
pub const USAGE_ERR_INVALID_RESPONSE: &str = "Error: Invalid usage response: {}";
pub const USAGE_ERR_ENCODE: &str = "Error: Could not encode usage request: {}";
pub const USAGE_UNAVAILABLE_DEFAULT: &str = "Data not available";
pub const USAGE_QUOTA_LINE: &str = "{}/{} credits used ({} left)";

pub const EXPORT_ERR_INCOMPLETE: &str = "Error: Credential cannot be exported, missing: {}";
pub const EXPORT_ERR_SERIALIZE: &str = "Error: Could not serialize exported credential: {}";
pub const EXPORT_ERR_WRITE: &str = "Error: Could not write {}: {}";

pub const SWITCH_ERR_FILE_NOT_FOUND: &str = "Error: Environment file {} not found.";
pub const SWITCH_ERR_READ: &str = "Error: Could not read {}: {}";
pub const SWITCH_ERR_WRITE: &str = "Error: Could not write {}: {}";
pub const SWITCH_ERR_EMPTY_VALUE: &str = "Error: Value cannot be empty.";
pub const SWITCH_ERR_TARGET_NOT_FOUND: &str =
    "Error: No {} line found under the {} section. Nothing was changed.";
pub const SWITCH_MSG_ACTIVE: &str = "Active auth method: {} ({})";
pub const SWITCH_MSG_VALUE: &str = "Value: {}";
pub const SWITCH_MSG_NONE: &str = "No auth method is active in the environment file.";
pub const SWITCH_MSG_SWITCHED: &str = "Switched auth to {}";
pub const SWITCH_PROMPT_VALUE: &str = "Value for {}:";
pub const SWITCH_HINT_RESTART: &str =
    "Other auth methods were commented out. Restart the gateway to apply.";

pub const ACCOUNT_MSG_REFRESHED: &str = "Refreshed {}";
pub const ACCOUNT_MSG_REFRESHED_COUNT: &str = "Refreshed {} of {} credentials.";
pub const ACCOUNT_MSG_ADDED: &str = "Added {}";
pub const ACCOUNT_MSG_UPDATED_EXISTING: &str = "Updated existing credential {}";
pub const ACCOUNT_MSG_EXPORTED: &str = "Exported {} to {}";
pub const ACCOUNT_WARN_REFRESH_FAILED: &str = "Could not refresh {}";
pub const ACCOUNT_WARN_NO_VALID: &str = "No valid credentials found.";
pub const ACCOUNT_WARN_EXPORTED_EXPIRED: &str = "The exported access token has already expired.";
pub const ACCOUNT_HINT_REFRESH_EXPORTED: &str = "Run {refresh} first, then export again.";
pub const ACCOUNT_HINT_ADD: &str = "Run {add} to import a credential.";
pub const ACCOUNT_HINT_HIDDEN_INCOMPLETE: &str = "{} incomplete records hidden";
pub const ACCOUNT_STATUS_VALID: &str = "valid";
pub const ACCOUNT_STATUS_EXPIRED: &str = "expired";
pub const ACCOUNT_DETAIL_EXPIRES: &str = "Expires: {} ({})";
pub const ACCOUNT_DETAIL_REGION: &str = "Region: {}";
pub const ACCOUNT_DETAIL_CLIENT: &str = "Client ID: {}";
pub const ACCOUNT_DETAIL_CREDITS: &str = "Credits: {}";
pub const ACCOUNT_DETAIL_REFRESHED: &str = "Last refreshed: {}";
pub const ACCOUNT_PROMPT_SELECT: &str = "Select a credential to {}";
pub const ACCOUNT_PROMPT_REFRESH: &str = "Refresh {}?";
pub const ACCOUNT_PROMPT_REFRESH_ALL: &str = "Refresh all {} valid credentials?";
pub const ACCOUNT_PROMPT_EXPORT: &str = "Export {} to {}?";
pub const ACCOUNT_PROMPT_IMPORT: &str = "Paste credential JSON:";
pub const ACCOUNT_SELECT_HELP: &str = "Type to search • Use ↑/↓ to select • ENTER to confirm";
pub const ACCOUNT_IMPORT_HELP: &str = "Needs refreshToken, clientId and clientSecret";
pub const ACCOUNT_ERR_INDEX_RANGE: &str = "Error: Index {} is out of range (1-{}).";
pub const ACCOUNT_ERR_CLIENT_NOT_FOUND: &str =
    "Error: No valid credential with client id '{}'. Run {} to see them.";
pub const ACCOUNT_ERR_TTY_REQUIRED: &str =
    "Error: {} selection requires a TTY. Run `{} {}` interactively or pass --index.";
pub const ACCOUNT_ERR_CONFIRM_REQUIRED: &str =
    "Error: This action requires confirmation. Re-run with `--yes` to skip the prompt.";
pub const ACCOUNT_ERR_PROMPT_CONTEXT: &str = "Error: Could not prompt for {}: {}";
pub const ACCOUNT_ERR_READ_STDIN: &str = "Error: Could not read credential JSON from stdin: {}";
pub const ACCOUNT_ERR_EMPTY_IMPORT: &str =
    "Error: No credential JSON given. Pass --json or pipe it on stdin.";
pub const ACCOUNT_ERR_REFRESH_ALL_FAILED: &str = "Error: No credential could be refreshed.";

pub const UI_WARNING_PREFIX: &str = "Warning: ";
pub const UI_INFO_PREFIX: &str = "Info: {}";
pub const UI_ERROR_PREFIX: &str = "Error:";
pub const UI_CURRENT_BADGE: &str = "(current)";
pub const UI_UNKNOWN_ACCOUNT: &str = "unknown account";

pub const COMMON_ERR_RESOLVE_HOME: &str = "Error: Could not resolve working directory: {}";
pub const COMMON_ERR_RESOLVE_PARENT: &str = "Error: Cannot resolve parent directory for {}";
pub const COMMON_ERR_CREATE_DIR: &str = "Error: Cannot create directory {}: {}";
pub const COMMON_ERR_INVALID_FILE_NAME: &str = "Error: Invalid file name {}";
pub const COMMON_ERR_GET_TIME: &str = "Error: Failed to get time: {}";
pub const COMMON_ERR_CREATE_TEMP: &str = "Error: Failed to create temp file for {}: {}";
pub const COMMON_ERR_WRITE_TEMP: &str = "Error: Failed to write temp file for {}: {}";
pub const COMMON_ERR_REPLACE_FILE: &str = "Error: Failed to replace {}: {}";
pub const COMMON_ERR_EXISTS_NOT_FILE: &str = "Error: {} exists and is not a file";
pub const COMMON_ERR_LOCK_OPEN: &str = "Error: Could not open credentials lock {}: {}";
pub const COMMON_ERR_LOCK_ACQUIRE: &str =
    "Error: Could not acquire credentials lock. Ensure no other {} is running and retry.";
pub const COMMON_ERR_LOCK_HELD: &str = "Error: Could not lock credentials file: {}";

pub fn msg1(template: &str, a: impl std::fmt::Display) -> String {
    template.replacen("{}", &a.to_string(), 1)
}

pub fn msg2(template: &str, a: impl std::fmt::Display, b: impl std::fmt::Display) -> String {
    let out = template.replacen("{}", &a.to_string(), 1);
    out.replacen("{}", &b.to_string(), 1)
}

pub fn msg3(
    template: &str,
    a: impl std::fmt::Display,
    b: impl std::fmt::Display,
    c: impl std::fmt::Display,
) -> String {
    let out = template.replacen("{}", &a.to_string(), 1);
    let out = out.replacen("{}", &b.to_string(), 1);
    out.replacen("{}", &c.to_string(), 1)
}
