use chrono::{DateTime, Utc};
use colored::Colorize;
use inquire::{Confirm, Select, Text};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, IsTerminal as _, Read as _};

use crate::cli::TargetArgs;
use crate::{
    ACCOUNT_DETAIL_CLIENT, ACCOUNT_DETAIL_CREDITS, ACCOUNT_DETAIL_EXPIRES, ACCOUNT_DETAIL_REFRESHED,
    ACCOUNT_DETAIL_REGION, ACCOUNT_ERR_CLIENT_NOT_FOUND, ACCOUNT_ERR_CONFIRM_REQUIRED,
    ACCOUNT_ERR_EMPTY_IMPORT, ACCOUNT_ERR_INDEX_RANGE, ACCOUNT_ERR_PROMPT_CONTEXT,
    ACCOUNT_ERR_READ_STDIN, ACCOUNT_ERR_REFRESH_ALL_FAILED, ACCOUNT_ERR_TTY_REQUIRED,
    ACCOUNT_HINT_ADD, ACCOUNT_HINT_HIDDEN_INCOMPLETE, ACCOUNT_HINT_REFRESH_EXPORTED,
    ACCOUNT_IMPORT_HELP, ACCOUNT_MSG_ADDED, ACCOUNT_MSG_EXPORTED, ACCOUNT_MSG_REFRESHED,
    ACCOUNT_MSG_REFRESHED_COUNT, ACCOUNT_MSG_UPDATED_EXISTING, ACCOUNT_PROMPT_EXPORT,
    ACCOUNT_PROMPT_IMPORT, ACCOUNT_PROMPT_REFRESH, ACCOUNT_PROMPT_REFRESH_ALL,
    ACCOUNT_PROMPT_SELECT, ACCOUNT_SELECT_HELP, ACCOUNT_STATUS_EXPIRED, ACCOUNT_STATUS_VALID,
    ACCOUNT_WARN_EXPORTED_EXPIRED, ACCOUNT_WARN_NO_VALID, ACCOUNT_WARN_REFRESH_FAILED,
    SWITCH_HINT_RESTART, SWITCH_MSG_ACTIVE, SWITCH_MSG_NONE, SWITCH_MSG_SWITCHED,
    SWITCH_MSG_VALUE, SWITCH_PROMPT_VALUE, UI_UNKNOWN_ACCOUNT,
};
use crate::{AuthMethod, AuthSwitcher, Endpoints, Paths, ToolError, command_name};
use crate::{
    CANCELLED_MESSAGE, format_account_display, format_action, format_command, format_entry_header,
    format_error, format_hint, format_quota, format_usage_unavailable, format_warning,
    inquire_select_render_config, is_inquire_cancel, is_plain, print_output_block, style_text,
    use_color_stderr, use_color_stdout,
};
use crate::{
    CredentialRecord, MergeOutcome, RecordKey, export_credential, import_record,
    lock_collection, merge_refreshed, read_collection, read_collection_or_empty,
    read_exported_refresh_token, refresh_record, valid_credentials, write_collection,
    write_exported,
};

const MAX_REFRESH_CONCURRENCY: usize = 4;
const CLIENT_ID_DISPLAY_CHARS: usize = 12;
const SWITCH_VALUE_DISPLAY_CHARS: usize = 50;

pub fn list_credentials(paths: &Paths) -> Result<(), String> {
    let use_color = use_color_stdout();
    let collection = read_collection(&paths.tokens)?;
    let Ok(valid) = valid_credentials(&collection) else {
        let hint = add_hint(use_color);
        print_output_block(&format!(
            "{}\n{hint}",
            format_warning(ACCOUNT_WARN_NO_VALID, use_color)
        ));
        return Ok(());
    };
    let current = current_refresh_token(paths);
    let now = Utc::now();
    let mut lines = Vec::with_capacity(valid.len() * 6);
    for (idx, record) in valid.iter().enumerate() {
        if idx > 0 && !is_plain() {
            lines.push(String::new());
        }
        lines.extend(render_entry(idx + 1, record, current.as_deref(), now, use_color));
    }
    let hidden = collection.len() - valid.len();
    if hidden > 0 {
        lines.push(String::new());
        lines.push(format_hint(
            &crate::msg1(ACCOUNT_HINT_HIDDEN_INCOMPLETE, hidden),
            use_color,
        ));
    }
    print_output_block(&lines.join("\n"));
    Ok(())
}

pub fn refresh_credentials(
    paths: &Paths,
    endpoints: &Endpoints,
    target: &TargetArgs,
    all: bool,
    yes: bool,
) -> Result<(), String> {
    if all {
        return refresh_all_credentials(paths, endpoints, yes);
    }
    let collection = read_collection(&paths.tokens)?;
    let valid = valid_credentials(&collection).map_err(|err| err.message())?;
    let current = current_refresh_token(paths);
    let idx = select_record(&valid, target, "refresh", current.as_deref())?;
    let selected = &valid[idx];
    let label = account_label(selected);
    if !confirm_action(&crate::msg1(ACCOUNT_PROMPT_REFRESH, &label), yes)? {
        return Err(CANCELLED_MESSAGE.to_string());
    }

    let key = RecordKey::of(selected);
    let _lock = lock_collection(paths)?;
    let mut collection = read_collection(&paths.tokens)?;
    let latest = key
        .as_ref()
        .and_then(|key| collection.iter().find(|record| key.matches(record)))
        .cloned()
        .unwrap_or_else(|| selected.clone());
    let refreshed = refresh_record(&latest, endpoints).map_err(|err| err.message())?;
    merge_refreshed(&mut collection, key.as_ref(), &refreshed, Utc::now());
    write_collection(&paths.tokens, &collection)?;

    let use_color = use_color_stdout();
    let mut lines = vec![format_action(
        &crate::msg1(ACCOUNT_MSG_REFRESHED, &label),
        use_color,
    )];
    lines.extend(refresh_details(&refreshed, use_color));
    print_output_block(&lines.join("\n"));
    Ok(())
}

fn refresh_all_credentials(paths: &Paths, endpoints: &Endpoints, yes: bool) -> Result<(), String> {
    let snapshot = read_collection(&paths.tokens)?;
    let count = valid_credentials(&snapshot).map_err(|err| err.message())?.len();
    if !confirm_action(&crate::msg1(ACCOUNT_PROMPT_REFRESH_ALL, count), yes)? {
        return Err(CANCELLED_MESSAGE.to_string());
    }

    let _lock = lock_collection(paths)?;
    let mut collection = read_collection(&paths.tokens)?;
    let targets = distinct_records(valid_credentials(&collection).map_err(|err| err.message())?);
    let results = refresh_in_chunks(&targets, endpoints);

    let use_color = use_color_stdout();
    let now = Utc::now();
    let mut lines = Vec::with_capacity(targets.len() + 1);
    let mut refreshed_count = 0usize;
    for (record, result) in targets.iter().zip(results) {
        let label = account_label(record);
        match result {
            Ok(refreshed) => {
                merge_refreshed(&mut collection, RecordKey::of(record).as_ref(), &refreshed, now);
                refreshed_count += 1;
                lines.push(format_action(
                    &crate::msg1(ACCOUNT_MSG_REFRESHED, &label),
                    use_color,
                ));
            }
            Err(err) => {
                tracing::debug!(account = %label, error = %err, "refresh failed");
                lines.push(format_warning(
                    &crate::msg1(ACCOUNT_WARN_REFRESH_FAILED, &label),
                    use_color,
                ));
                lines.push(format_error(&err.message()));
            }
        }
    }
    if refreshed_count > 0 {
        write_collection(&paths.tokens, &collection)?;
    }
    lines.push(String::new());
    lines.push(crate::msg2(
        ACCOUNT_MSG_REFRESHED_COUNT,
        refreshed_count,
        targets.len(),
    ));
    print_output_block(&lines.join("\n"));
    if refreshed_count == 0 {
        return Err(ACCOUNT_ERR_REFRESH_ALL_FAILED.to_string());
    }
    Ok(())
}

/// One entry per record key; records sharing a client id are refreshed once.
fn distinct_records(records: Vec<CredentialRecord>) -> Vec<CredentialRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| RecordKey::of(record).is_none_or(|key| seen.insert(key)))
        .collect()
}

fn refresh_in_chunks(
    targets: &[CredentialRecord],
    endpoints: &Endpoints,
) -> Vec<Result<CredentialRecord, ToolError>> {
    let mut results = Vec::with_capacity(targets.len());
    for chunk in targets.chunks(MAX_REFRESH_CONCURRENCY) {
        let mut chunk_results: Vec<_> = chunk
            .par_iter()
            .map(|record| refresh_record(record, endpoints))
            .collect();
        results.append(&mut chunk_results);
    }
    results
}

pub fn add_credential(
    paths: &Paths,
    endpoints: &Endpoints,
    json: Option<String>,
) -> Result<(), String> {
    let input = match json {
        Some(json) => json,
        None => read_import_json()?,
    };
    let record = import_record(&input).map_err(|err| err.message())?;
    let refreshed = refresh_record(&record, endpoints).map_err(|err| err.message())?;

    let _lock = lock_collection(paths)?;
    let mut collection = read_collection_or_empty(&paths.tokens)?;
    let outcome = merge_refreshed(
        &mut collection,
        RecordKey::of(&record).as_ref(),
        &refreshed,
        Utc::now(),
    );
    write_collection(&paths.tokens, &collection)?;

    let use_color = use_color_stdout();
    let label = account_label(&refreshed);
    let message = match outcome {
        MergeOutcome::Appended => crate::msg1(ACCOUNT_MSG_ADDED, &label),
        MergeOutcome::Updated(_) => crate::msg1(ACCOUNT_MSG_UPDATED_EXISTING, &label),
    };
    let mut lines = vec![format_action(&message, use_color)];
    lines.extend(refresh_details(&refreshed, use_color));
    print_output_block(&lines.join("\n"));
    Ok(())
}

fn read_import_json() -> Result<String, String> {
    if io::stdin().is_terminal() {
        let prompt = Text::new(ACCOUNT_PROMPT_IMPORT)
            .with_help_message(ACCOUNT_IMPORT_HELP)
            .with_render_config(inquire_select_render_config())
            .prompt();
        return handle_inquire_result(prompt, "import");
    }
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|err| crate::msg1(ACCOUNT_ERR_READ_STDIN, err))?;
    if input.trim().is_empty() {
        return Err(ACCOUNT_ERR_EMPTY_IMPORT.to_string());
    }
    Ok(input)
}

pub fn export_selected(paths: &Paths, target: &TargetArgs, yes: bool) -> Result<(), String> {
    let collection = read_collection(&paths.tokens)?;
    let valid = valid_credentials(&collection).map_err(|err| err.message())?;
    let current = current_refresh_token(paths);
    let idx = select_record(&valid, target, "export", current.as_deref())?;
    let selected = &valid[idx];
    let exported = export_credential(selected).map_err(|err| err.message())?;
    let label = account_label(selected);
    let prompt = crate::msg2(ACCOUNT_PROMPT_EXPORT, &label, paths.credentials.display());
    if !confirm_action(&prompt, yes)? {
        return Err(CANCELLED_MESSAGE.to_string());
    }
    write_exported(&paths.credentials, &exported)?;

    let use_color = use_color_stdout();
    let mut lines = vec![format_action(
        &crate::msg2(ACCOUNT_MSG_EXPORTED, &label, paths.credentials.display()),
        use_color,
    )];
    if selected.is_expired(Utc::now()) {
        let refresh = format_command("refresh", use_color);
        lines.push(format_warning(ACCOUNT_WARN_EXPORTED_EXPIRED, use_color));
        lines.push(format_hint(
            &ACCOUNT_HINT_REFRESH_EXPORTED.replace("{refresh}", &refresh),
            use_color,
        ));
    }
    print_output_block(&lines.join("\n"));
    Ok(())
}

pub fn auth_status(paths: &Paths) -> Result<(), String> {
    let switcher = AuthSwitcher::open(&paths.env)?;
    let use_color = use_color_stdout();
    let message = match switcher.current()? {
        Some(current) => {
            let method = style_text(current.method.key(), use_color, |text| text.bold());
            format!(
                "{}\n{}",
                crate::msg2(SWITCH_MSG_ACTIVE, method, current.method.name()),
                crate::msg1(SWITCH_MSG_VALUE, current.value)
            )
        }
        None => format_warning(SWITCH_MSG_NONE, use_color),
    };
    print_output_block(&message);
    Ok(())
}

pub fn auth_switch(paths: &Paths, method: AuthMethod, value: Option<String>) -> Result<(), String> {
    let switcher = AuthSwitcher::open(&paths.env)?;
    let value = match value.or_else(|| method.default_value()) {
        Some(value) => value,
        None => prompt_switch_value(method)?,
    };
    switcher.switch(method, &value)?;
    tracing::info!(
        path = %switcher.path().display(),
        method = method.name(),
        "auth method switched"
    );

    let use_color = use_color_stdout();
    let lines = [
        format_action(&crate::msg1(SWITCH_MSG_SWITCHED, method.key()), use_color),
        crate::msg1(SWITCH_MSG_VALUE, shorten(value.trim(), SWITCH_VALUE_DISPLAY_CHARS)),
        format_hint(SWITCH_HINT_RESTART, use_color),
    ];
    print_output_block(&lines.join("\n"));
    Ok(())
}

fn prompt_switch_value(method: AuthMethod) -> Result<String, String> {
    if !io::stdin().is_terminal() {
        return Err(ToolError::EmptyValue.message());
    }
    let prompt = Text::new(&crate::msg1(SWITCH_PROMPT_VALUE, method.key()))
        .with_render_config(inquire_select_render_config())
        .prompt();
    handle_inquire_result(prompt, "value")
}

fn current_refresh_token(paths: &Paths) -> Option<String> {
    match read_exported_refresh_token(&paths.credentials) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                "ignoring unreadable exported credential"
            );
            None
        }
    }
}

fn select_record(
    valid: &[CredentialRecord],
    target: &TargetArgs,
    action: &str,
    current: Option<&str>,
) -> Result<usize, String> {
    if let Some(index) = target.index {
        return index
            .checked_sub(1)
            .filter(|idx| *idx < valid.len())
            .ok_or_else(|| crate::msg2(ACCOUNT_ERR_INDEX_RANGE, index, valid.len()));
    }
    if let Some(client_id) = target.client_id.as_deref() {
        return valid
            .iter()
            .position(|record| record.client_id() == Some(client_id))
            .ok_or_else(|| {
                crate::msg2(
                    ACCOUNT_ERR_CLIENT_NOT_FOUND,
                    client_id,
                    format_command("list", use_color_stderr()),
                )
            });
    }
    require_tty(action)?;
    let candidates = build_candidates(valid, current);
    let prompt = Select::new(&crate::msg1(ACCOUNT_PROMPT_SELECT, action), candidates)
        .with_help_message(ACCOUNT_SELECT_HELP)
        .with_render_config(inquire_select_render_config())
        .prompt();
    let chosen = handle_inquire_result(prompt, "selection")?;
    Ok(chosen.position - 1)
}

fn build_candidates(valid: &[CredentialRecord], current: Option<&str>) -> Vec<Candidate> {
    let use_color = use_color_stderr();
    valid
        .iter()
        .enumerate()
        .map(|(idx, record)| Candidate {
            position: idx + 1,
            display: format_account_display(
                idx + 1,
                record.email(),
                record.subscription_title(),
                is_current(record, current),
                use_color,
            ),
        })
        .collect()
}

#[derive(Clone)]
struct Candidate {
    position: usize,
    display: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format_entry_header(&self.display, use_color_stderr());
        write!(f, "{header}")
    }
}

fn is_current(record: &CredentialRecord, current: Option<&str>) -> bool {
    current.is_some() && record.refresh_token() == current
}

fn render_entry(
    position: usize,
    record: &CredentialRecord,
    current: Option<&str>,
    now: DateTime<Utc>,
    use_color: bool,
) -> Vec<String> {
    let display = format_account_display(
        position,
        record.email(),
        record.subscription_title(),
        is_current(record, current),
        use_color,
    );
    let mut lines = vec![format_entry_header(&display, use_color)];
    let status = if record.is_expired(now) {
        style_text(ACCOUNT_STATUS_EXPIRED, use_color, |text| text.red())
    } else {
        style_text(ACCOUNT_STATUS_VALID, use_color, |text| text.green())
    };
    let expires = record.expires_at_raw().unwrap_or_default();
    lines.push(detail(crate::msg2(ACCOUNT_DETAIL_EXPIRES, expires, status)));
    lines.push(detail(crate::msg1(
        ACCOUNT_DETAIL_REGION,
        record.region().unwrap_or_default(),
    )));
    lines.push(detail(crate::msg1(
        ACCOUNT_DETAIL_CLIENT,
        shorten(record.client_id().unwrap_or_default(), CLIENT_ID_DISPLAY_CHARS),
    )));
    lines.push(detail(credits_line(record, use_color)));
    if let Some(last) = record.last_refreshed.as_deref() {
        lines.push(detail(crate::msg1(ACCOUNT_DETAIL_REFRESHED, last)));
    }
    lines
}

fn refresh_details(record: &CredentialRecord, use_color: bool) -> Vec<String> {
    vec![
        detail(crate::msg2(
            ACCOUNT_DETAIL_EXPIRES,
            record.expires_at_raw().unwrap_or_default(),
            ACCOUNT_STATUS_VALID,
        )),
        detail(credits_line(record, use_color)),
    ]
}

fn credits_line(record: &CredentialRecord, use_color: bool) -> String {
    let credits = match record.usage_limit.as_ref() {
        Some(quota) => format_quota(quota),
        None => format_usage_unavailable(use_color),
    };
    crate::msg1(ACCOUNT_DETAIL_CREDITS, credits)
}

fn detail(line: String) -> String {
    if is_plain() { line } else { format!("  {line}") }
}

fn account_label(record: &CredentialRecord) -> String {
    if let Some(email) = record.email() {
        return email.to_string();
    }
    record
        .client_id()
        .map(|id| shorten(id, CLIENT_ID_DISPLAY_CHARS))
        .unwrap_or_else(|| UI_UNKNOWN_ACCOUNT.to_string())
}

fn shorten(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let head: String = value.chars().take(max_chars).collect();
    format!("{head}...")
}

fn add_hint(use_color: bool) -> String {
    let add = format_command("add", use_color);
    format_hint(&ACCOUNT_HINT_ADD.replace("{add}", &add), use_color)
}

fn confirm_action(prompt: &str, yes: bool) -> Result<bool, String> {
    if yes {
        return Ok(true);
    }
    let is_tty = io::stdin().is_terminal();
    if !is_tty {
        return Err(ACCOUNT_ERR_CONFIRM_REQUIRED.to_string());
    }
    let selection = Confirm::new(prompt)
        .with_default(true)
        .with_render_config(inquire_select_render_config())
        .prompt();
    confirm_action_with(is_tty, selection)
}

fn confirm_action_with(
    is_tty: bool,
    selection: Result<bool, inquire::error::InquireError>,
) -> Result<bool, String> {
    if !is_tty {
        return Err(ACCOUNT_ERR_CONFIRM_REQUIRED.to_string());
    }
    match selection {
        Ok(value) => Ok(value),
        Err(err) if is_inquire_cancel(&err) => Err(CANCELLED_MESSAGE.to_string()),
        Err(err) => Err(crate::msg2(ACCOUNT_ERR_PROMPT_CONTEXT, "confirmation", err)),
    }
}

pub(crate) fn require_tty(action: &str) -> Result<(), String> {
    require_tty_with(io::stdin().is_terminal(), action)
}

fn require_tty_with(is_tty: bool, action: &str) -> Result<(), String> {
    if is_tty {
        Ok(())
    } else {
        Err(crate::msg3(
            ACCOUNT_ERR_TTY_REQUIRED,
            action,
            command_name(),
            action,
        ))
    }
}

fn handle_inquire_result<T>(
    result: Result<T, inquire::error::InquireError>,
    context: &str,
) -> Result<T, String> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if is_inquire_cancel(&err) => Err(CANCELLED_MESSAGE.to_string()),
        Err(err) => Err(crate::msg2(ACCOUNT_ERR_PROMPT_CONTEXT, context, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        closed_port_url, http_ok_response, make_paths, set_plain_guard, spawn_repeating_server,
        spawn_server,
    };
    use crate::{LOCK_TEST_MUTEX, read_collection};
    use serde_json::json;
    use std::fs;

    const OK_REFRESH: &str =
        r#"{"accessToken":"fresh-access","refreshToken":"fresh-refresh","expiresIn":3600}"#;

    fn stored(client_id: &str, email: &str, expires_at: &str) -> serde_json::Value {
        json!({
            "email": email,
            "accessToken": format!("old-{client_id}"),
            "refreshToken": format!("rt-{client_id}"),
            "expiresAt": expires_at,
            "region": "us-east-1",
            "clientId": client_id,
            "clientSecret": "cs",
            "provider": "BuilderId"
        })
    }

    fn write_tokens(paths: &Paths, records: serde_json::Value) {
        fs::write(&paths.tokens, serde_json::to_string_pretty(&records).unwrap()).unwrap();
    }

    fn endpoints_for(url: &str) -> Endpoints {
        Endpoints {
            desktop_refresh: format!("{url}/{{region}}/refreshToken"),
            oidc_token: format!("{url}/token"),
            usage: closed_port_url(),
        }
    }

    fn by_index(index: usize) -> TargetArgs {
        TargetArgs {
            index: Some(index),
            client_id: None,
        }
    }

    #[test]
    fn require_tty_with_variants() {
        assert!(require_tty_with(true, "refresh").is_ok());
        let err = require_tty_with(false, "refresh").unwrap_err();
        assert!(err.contains("requires a TTY"));
    }

    #[test]
    fn confirm_action_with_variants() {
        let err = confirm_action_with(false, Ok(true)).unwrap_err();
        assert!(err.contains("--yes"));
        assert!(confirm_action_with(true, Ok(true)).unwrap());
        assert!(!confirm_action_with(true, Ok(false)).unwrap());
        let err =
            confirm_action_with(true, Err(inquire::error::InquireError::OperationCanceled))
                .unwrap_err();
        assert_eq!(err, CANCELLED_MESSAGE);
        assert!(confirm_action("unused", true).unwrap());
    }

    #[test]
    fn handle_inquire_result_variants() {
        let ok: Result<i32, inquire::error::InquireError> = Ok(1);
        assert_eq!(handle_inquire_result(ok, "selection").unwrap(), 1);
        let err: Result<(), inquire::error::InquireError> =
            Err(inquire::error::InquireError::OperationInterrupted);
        assert_eq!(
            handle_inquire_result(err, "selection").unwrap_err(),
            CANCELLED_MESSAGE
        );
    }

    #[test]
    fn select_record_by_index_and_client_id() {
        let records: Vec<CredentialRecord> = ["a", "b"]
            .iter()
            .map(|id| serde_json::from_value(stored(id, "", "2025-01-01T00:00:00")).unwrap())
            .collect();
        assert_eq!(select_record(&records, &by_index(2), "refresh", None).unwrap(), 1);
        let err = select_record(&records, &by_index(0), "refresh", None).unwrap_err();
        assert!(err.contains("out of range"));
        let err = select_record(&records, &by_index(3), "refresh", None).unwrap_err();
        assert!(err.contains("1-2"));
        let target = TargetArgs {
            index: None,
            client_id: Some("b".to_string()),
        };
        assert_eq!(select_record(&records, &target, "export", None).unwrap(), 1);
        let target = TargetArgs {
            index: None,
            client_id: Some("zzz".to_string()),
        };
        assert!(
            select_record(&records, &target, "export", None)
                .unwrap_err()
                .contains("zzz")
        );
    }

    #[test]
    fn labels_and_current_marker() {
        let mut record: CredentialRecord =
            serde_json::from_value(stored("client-identifier-long", "", "x")).unwrap();
        assert_eq!(account_label(&record), "client-ident...");
        record.email = Some("me@example.com".to_string());
        assert_eq!(account_label(&record), "me@example.com");
        assert!(is_current(&record, Some("rt-client-identifier-long")));
        assert!(!is_current(&record, None));
        assert_eq!(shorten("abc", 5), "abc");
    }

    #[test]
    fn distinct_records_skips_duplicate_keys() {
        let first: CredentialRecord = serde_json::from_value(stored("a", "1@x", "x")).unwrap();
        let twin: CredentialRecord = serde_json::from_value(stored("a", "2@x", "x")).unwrap();
        let other: CredentialRecord = serde_json::from_value(stored("b", "3@x", "x")).unwrap();
        let kept = distinct_records(vec![first, twin, other]);
        let emails: Vec<&str> = kept.iter().filter_map(|r| r.email()).collect();
        assert_eq!(emails, vec!["1@x", "3@x"]);
    }

    #[test]
    fn render_entry_plain() {
        let _plain = set_plain_guard(true);
        let mut record: CredentialRecord =
            serde_json::from_value(stored("cid", "me@example.com", "2025-01-01T00:00:00")).unwrap();
        record.usage_limit = Some(crate::UsageQuota::new(500, 120));
        record.last_refreshed = Some("2025-01-01T00:00:00".to_string());
        let lines = render_entry(1, &record, Some("rt-cid"), Utc::now(), false);
        assert_eq!(lines[0], "[1] me@example.com (current)");
        assert_eq!(lines[1], "Expires: 2025-01-01T00:00:00 (expired)");
        assert_eq!(lines[4], "Credits: 120/500 credits used (380 left)");
        assert_eq!(lines[5], "Last refreshed: 2025-01-01T00:00:00");
    }

    #[test]
    fn list_credentials_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        assert!(list_credentials(&paths).unwrap_err().contains("not found"));
        write_tokens(&paths, json!([{"email": "broken@example.com"}]));
        list_credentials(&paths).unwrap();
        write_tokens(
            &paths,
            json!([stored("a", "a@x", "2025-01-01T00:00:00"), {"email": "broken"}]),
        );
        fs::write(&paths.credentials, "not json").unwrap();
        list_credentials(&paths).unwrap();
    }

    #[test]
    fn refresh_by_index_updates_collection() {
        let _guard = LOCK_TEST_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        write_tokens(
            &paths,
            json!([
                stored("older", "old@x", "2025-01-01T00:00:00"),
                stored("newer", "new@x", "2025-06-01T00:00:00")
            ]),
        );
        let url = spawn_server(http_ok_response(OK_REFRESH, "application/json"));
        refresh_credentials(&paths, &endpoints_for(&url), &by_index(1), false, true).unwrap();

        let collection = read_collection(&paths.tokens).unwrap();
        assert_eq!(collection[0].access_token(), Some("old-older"));
        assert!(collection[0].last_refreshed.is_none());
        assert_eq!(collection[1].access_token(), Some("fresh-access"));
        assert_eq!(collection[1].refresh_token(), Some("fresh-refresh"));
        assert!(collection[1].last_refreshed.is_some());
        assert_eq!(
            collection[1].extra.get("provider"),
            Some(&json!("BuilderId"))
        );
    }

    #[test]
    fn refresh_failure_leaves_collection() {
        let _guard = LOCK_TEST_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        write_tokens(&paths, json!([stored("a", "a@x", "2025-01-01T00:00:00")]));
        let before = fs::read_to_string(&paths.tokens).unwrap();
        let url = spawn_server(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        );
        let err =
            refresh_credentials(&paths, &endpoints_for(&url), &by_index(1), false, true)
                .unwrap_err();
        assert!(err.contains("401"));
        assert_eq!(fs::read_to_string(&paths.tokens).unwrap(), before);
    }

    #[test]
    fn refresh_all_refreshes_each_record() {
        let _guard = LOCK_TEST_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        write_tokens(
            &paths,
            json!([
                stored("a", "a@x", "2025-01-01T00:00:00"),
                stored("b", "b@x", "2025-02-01T00:00:00"),
                {"email": "incomplete@x"}
            ]),
        );
        let url = spawn_repeating_server(http_ok_response(OK_REFRESH, "application/json"), 2);
        refresh_credentials(
            &paths,
            &endpoints_for(&url),
            &TargetArgs::default(),
            true,
            true,
        )
        .unwrap();
        let collection = read_collection(&paths.tokens).unwrap();
        assert_eq!(collection.len(), 3);
        assert!(collection[..2].iter().all(|r| r.last_refreshed.is_some()));
        assert!(collection[2].last_refreshed.is_none());
    }

    #[test]
    fn add_credential_creates_collection() {
        let _guard = LOCK_TEST_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        let url = spawn_server(http_ok_response(OK_REFRESH, "application/json"));
        let json = r#"{"refreshToken":"rt","clientId":"cid","clientSecret":"cs"}"#;
        add_credential(&paths, &endpoints_for(&url), Some(json.to_string())).unwrap();
        let collection = read_collection(&paths.tokens).unwrap();
        assert_eq!(collection.len(), 1);
        let added = &collection[0];
        assert_eq!(added.access_token(), Some("fresh-access"));
        assert_eq!(added.region(), Some("us-east-1"));
        assert!(added.is_valid());

        let err = add_credential(&paths, &endpoints_for(&url), Some("{}".to_string())).unwrap_err();
        assert!(err.contains("refreshToken"));
    }

    #[test]
    fn export_writes_gateway_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        write_tokens(
            &paths,
            json!([
                stored("a", "a@x", "2025-01-01T00:00:00"),
                stored("b", "b@x", "2099-01-01T00:00:00")
            ]),
        );
        export_selected(&paths, &by_index(1), true).unwrap();
        let exported: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.credentials).unwrap()).unwrap();
        assert_eq!(exported["clientId"], json!("b"));
        assert_eq!(exported.as_object().unwrap().len(), 6);
        assert_eq!(current_refresh_token(&paths).as_deref(), Some("rt-b"));
    }

    #[test]
    fn export_incomplete_record_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        let mut record = stored("a", "a@x", "2025-01-01T00:00:00");
        record["accessToken"] = json!("");
        write_tokens(&paths, json!([record]));
        let err = export_selected(&paths, &by_index(1), true).unwrap_err();
        assert!(err.contains("accessToken"));
        assert!(!paths.credentials.exists());
    }

    #[test]
    fn auth_commands_rewrite_env_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = make_paths(dir.path());
        assert!(auth_status(&paths).is_err());
        fs::write(
            &paths.env,
            "# OPTION 1\nKIRO_CREDS_FILE=\"a.json\"\n# OPTION 2\n# REFRESH_TOKEN=\n",
        )
        .unwrap();
        auth_status(&paths).unwrap();
        auth_switch(&paths, AuthMethod::RefreshToken, Some("tok".to_string())).unwrap();
        let contents = fs::read_to_string(&paths.env).unwrap();
        assert_eq!(
            contents,
            "# OPTION 1\n# KIRO_CREDS_FILE=\"a.json\"\n# OPTION 2\nREFRESH_TOKEN=\"tok\"\n"
        );
        auth_switch(&paths, AuthMethod::CredsFile, None).unwrap();
        let contents = fs::read_to_string(&paths.env).unwrap();
        assert!(contents.contains("\nKIRO_CREDS_FILE=\"./kiro-credentials.json\"\n"));
        let err = auth_switch(&paths, AuthMethod::CliDb, Some("/db".to_string())).unwrap_err();
        assert!(err.contains("KIRO_CLI_DB_FILE"));
    }
}
