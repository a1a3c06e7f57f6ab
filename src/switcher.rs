use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::BaseDirs;

use crate::{SWITCH_ERR_FILE_NOT_FOUND, SWITCH_ERR_READ, SWITCH_ERR_WRITE, ToolError, write_atomic};

const REFRESH_TOKEN_DISPLAY_CHARS: usize = 30;
const DEFAULT_CREDS_FILE: &str = "./kiro-credentials.json";
const CLI_DB_RELATIVE: [&str; 2] = ["kiro-cli", "data.sqlite3"];
const CLI_DB_FALLBACK: &str = "~/.local/share/kiro-cli/data.sqlite3";

/// Gateway authentication methods, one per `.env` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum AuthMethod {
    /// KIRO_CREDS_FILE: path to an exported credentials file
    CredsFile,
    /// REFRESH_TOKEN: a raw refresh token
    RefreshToken,
    /// KIRO_CLI_DB_FILE: path to the kiro-cli sqlite database
    CliDb,
}

impl AuthMethod {
    pub const ALL: [AuthMethod; 3] = [
        AuthMethod::CredsFile,
        AuthMethod::RefreshToken,
        AuthMethod::CliDb,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AuthMethod::CredsFile => "KIRO_CREDS_FILE",
            AuthMethod::RefreshToken => "REFRESH_TOKEN",
            AuthMethod::CliDb => "KIRO_CLI_DB_FILE",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AuthMethod::CredsFile => "creds-file",
            AuthMethod::RefreshToken => "refresh-token",
            AuthMethod::CliDb => "cli-db",
        }
    }

    pub fn section_label(self) -> &'static str {
        match self {
            AuthMethod::CredsFile => "OPTION 1",
            AuthMethod::RefreshToken => "OPTION 2",
            AuthMethod::CliDb => "OPTION 3",
        }
    }

    /// Value used when `auth switch` is given no explicit value.
    pub fn default_value(self) -> Option<String> {
        match self {
            AuthMethod::CredsFile => Some(DEFAULT_CREDS_FILE.to_string()),
            AuthMethod::RefreshToken => None,
            AuthMethod::CliDb => Some(
                BaseDirs::new()
                    .map(|dirs| {
                        let mut path = dirs.data_local_dir().to_path_buf();
                        path.extend(CLI_DB_RELATIVE);
                        path.display().to_string()
                    })
                    .unwrap_or_else(|| CLI_DB_FALLBACK.to_string()),
            ),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentAuth {
    pub method: AuthMethod,
    pub value: String,
}

/// Where a line sits in the `.env` layout. `Extra` is the fourth option block,
/// whose assignments are commented out like any other non-chosen method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Outside,
    Method(AuthMethod),
    Extra,
}

const SECTION_MARKERS: [(&[&str], Section); 4] = [
    (
        &["OPTION 1", "选项 1"],
        Section::Method(AuthMethod::CredsFile),
    ),
    (
        &["OPTION 2", "选项 2"],
        Section::Method(AuthMethod::RefreshToken),
    ),
    (&["OPTION 3", "选项 3"], Section::Method(AuthMethod::CliDb)),
    (&["OPTION 4", "选项 4"], Section::Extra),
];
const SECTION_END_PREFIX: &str = "# ===";
const SECTION_END_MARKERS: [&str; 3] = ["PROFILE ARN", "OPTIONAL", "可选"];

/// Option headers win over the end markers, so `OPTION 2 (OPTIONAL)` opens section 2.
fn section_marker(line: &str) -> Option<Section> {
    let option = SECTION_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|marker| line.contains(marker)))
        .map(|(_, section)| *section);
    if option.is_some() {
        return option;
    }
    let ends_section = line.starts_with(SECTION_END_PREFIX)
        && SECTION_END_MARKERS.iter().any(|marker| line.contains(marker));
    ends_section.then_some(Section::Outside)
}

/// Matches `KEY=value` or `KEY = value` for one of the recognized keys.
fn assignment(text: &str) -> Option<(AuthMethod, &str)> {
    AuthMethod::ALL.into_iter().find_map(|method| {
        let rest = text.strip_prefix(method.key())?;
        let value = rest.trim_start().strip_prefix('=')?;
        Some((method, value))
    })
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn strip_inline_comment(value: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in value.char_indices() {
        match ch {
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            '#' if !in_single && !in_double => return &value[..idx],
            _ => {}
        }
    }
    value
}

fn clean_value(raw: &str) -> &str {
    strip_inline_comment(raw)
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'')
}

fn display_value(method: AuthMethod, value: &str) -> String {
    if method == AuthMethod::RefreshToken && value.chars().count() > REFRESH_TOKEN_DISPLAY_CHARS {
        let head: String = value.chars().take(REFRESH_TOKEN_DISPLAY_CHARS).collect();
        return format!("{head}...");
    }
    value.to_string()
}

/// The first uncommented recognized assignment, with refresh tokens shortened for display.
pub fn inspect_auth(document: &str) -> Option<CurrentAuth> {
    document.lines().find_map(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let (method, raw) = assignment(trimmed)?;
        Some(CurrentAuth {
            method,
            value: display_value(method, clean_value(raw)),
        })
    })
}

/// Activates `method` with `value` and comments out the other method assignments.
///
/// The first `KEY=` line (commented or not) inside the method's own section is
/// replaced. Active recognized assignments in every other option section are
/// prefixed with `# `. Lines outside the option sections, blank lines, and line
/// endings are kept byte for byte. Nothing is returned for writing unless the
/// target line was found.
pub fn switch_auth(document: &str, method: AuthMethod, value: &str) -> Result<String, ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::EmptyValue);
    }
    let mut section = Section::Outside;
    let mut target_written = false;
    let mut out = String::with_capacity(document.len() + value.len() + 8);
    for line in document.split_inclusive('\n') {
        if let Some(marker) = section_marker(line) {
            section = marker;
            out.push_str(line);
            continue;
        }
        let (body, ending) = split_line_ending(line);
        let trimmed = body.trim_start();
        let is_comment = trimmed.starts_with('#');
        let uncommented = trimmed.trim_start_matches('#').trim_start();
        match (section, assignment(uncommented)) {
            (Section::Method(current), Some((key, _)))
                if current == method && key == method && !target_written =>
            {
                out.push_str(&format!("{}=\"{value}\"{ending}", method.key()));
                target_written = true;
            }
            (Section::Method(_) | Section::Extra, Some(_)) if !is_comment => {
                out.push_str("# ");
                out.push_str(line);
            }
            _ => out.push_str(line),
        }
    }
    if !target_written {
        return Err(ToolError::TargetLineNotFound(method));
    }
    Ok(out)
}

/// File-backed wrapper around `inspect_auth` and `switch_auth`.
pub struct AuthSwitcher {
    path: PathBuf,
}

impl AuthSwitcher {
    pub fn open(path: &Path) -> Result<Self, String> {
        if !path.is_file() {
            return Err(crate::msg1(SWITCH_ERR_FILE_NOT_FOUND, path.display()));
        }
        Ok(AuthSwitcher {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Result<Option<CurrentAuth>, String> {
        Ok(inspect_auth(&self.read()?))
    }

    pub fn switch(&self, method: AuthMethod, value: &str) -> Result<(), String> {
        let document = self.read()?;
        let updated = switch_auth(&document, method, value).map_err(|err| err.message())?;
        tracing::debug!(path = %self.path.display(), method = method.name(), "rewriting env file");
        write_atomic(&self.path, updated.as_bytes())
            .map_err(|err| crate::msg2(SWITCH_ERR_WRITE, self.path.display(), err))
    }

    fn read(&self) -> Result<String, String> {
        fs::read_to_string(&self.path)
            .map_err(|err| crate::msg2(SWITCH_ERR_READ, self.path.display(), err))
    }
}
