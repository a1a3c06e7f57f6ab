use fslock::LockFile;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    COMMON_ERR_CREATE_DIR, COMMON_ERR_CREATE_TEMP, COMMON_ERR_EXISTS_NOT_FILE,
    COMMON_ERR_GET_TIME, COMMON_ERR_INVALID_FILE_NAME, COMMON_ERR_LOCK_ACQUIRE,
    COMMON_ERR_LOCK_HELD, COMMON_ERR_LOCK_OPEN, COMMON_ERR_REPLACE_FILE, COMMON_ERR_RESOLVE_HOME,
    COMMON_ERR_RESOLVE_PARENT, COMMON_ERR_WRITE_TEMP,
};

pub const HOME_ENV_VAR: &str = "KIRO_TOOLS_HOME";
pub const TOKENS_FILE_NAME: &str = "tokens_export.json";
pub const CREDENTIALS_FILE_NAME: &str = "kiro-credentials.json";
pub const ENV_FILE_NAME: &str = ".env";

pub const DESKTOP_REFRESH_URL: &str = "https://prod.{region}.auth.desktop.kiro.dev/refreshToken";
pub const OIDC_TOKEN_URL: &str = "https://oidc.{region}.amazonaws.com/token";
pub const USAGE_URL: &str =
    "https://app.kiro.dev/service/KiroWebPortalService/operation/GetUserUsageAndLimits";
const DESKTOP_REFRESH_URL_ENV_VAR: &str = "KIRO_DESKTOP_REFRESH_URL";
const OIDC_TOKEN_URL_ENV_VAR: &str = "KIRO_OIDC_TOKEN_URL";
const USAGE_URL_ENV_VAR: &str = "KIRO_USAGE_URL";
const REGION_PLACEHOLDER: &str = "{region}";

#[cfg(not(test))]
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Files the tool reads and writes, all rooted at one base directory unless overridden.
#[derive(Clone, Debug)]
pub struct Paths {
    pub home: PathBuf,
    pub tokens: PathBuf,
    pub credentials: PathBuf,
    pub env: PathBuf,
    pub tokens_lock: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct PathOverrides {
    pub tokens: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
    pub env: Option<PathBuf>,
}

/// Upstream URLs. `{region}` in the refresh URLs is replaced with the record's region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub desktop_refresh: String,
    pub oidc_token: String,
    pub usage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            desktop_refresh: DESKTOP_REFRESH_URL.to_string(),
            oidc_token: OIDC_TOKEN_URL.to_string(),
            usage: USAGE_URL.to_string(),
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        Self::with_overrides(
            env::var(DESKTOP_REFRESH_URL_ENV_VAR).ok(),
            env::var(OIDC_TOKEN_URL_ENV_VAR).ok(),
            env::var(USAGE_URL_ENV_VAR).ok(),
        )
    }

    fn with_overrides(
        desktop_refresh: Option<String>,
        oidc_token: Option<String>,
        usage: Option<String>,
    ) -> Self {
        let defaults = Endpoints::default();
        Endpoints {
            desktop_refresh: non_blank(desktop_refresh).unwrap_or(defaults.desktop_refresh),
            oidc_token: non_blank(oidc_token).unwrap_or(defaults.oidc_token),
            usage: non_blank(usage).unwrap_or(defaults.usage),
        }
    }

    pub fn desktop_refresh_url(&self, region: &str) -> String {
        self.desktop_refresh.replace(REGION_PLACEHOLDER, region)
    }

    pub fn oidc_token_url(&self, region: &str) -> String {
        self.oidc_token.replace(REGION_PLACEHOLDER, region)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn command_name() -> &'static str {
    static COMMAND_NAME: OnceLock<String> = OnceLock::new();
    COMMAND_NAME
        .get_or_init(|| {
            let env_value = env::var("KIRO_TOOLS_COMMAND").ok();
            compute_command_name_from(env_value, env::args_os())
        })
        .as_str()
}

fn compute_command_name_from<I>(env_value: Option<String>, mut args: I) -> String
where
    I: Iterator<Item = std::ffi::OsString>,
{
    if let Some(value) = non_blank(env_value) {
        return value;
    }
    args.next()
        .and_then(|arg| {
            Path::new(&arg)
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| package_command_name().to_string())
}

pub fn package_command_name() -> &'static str {
    "kiro-tools"
}

pub fn resolve_paths(overrides: PathOverrides) -> Result<Paths, String> {
    let home = match env::var_os(HOME_ENV_VAR).map(PathBuf::from) {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => env::current_dir().map_err(|err| crate::msg1(COMMON_ERR_RESOLVE_HOME, err))?,
    };
    Ok(paths_under(home, overrides))
}

fn paths_under(home: PathBuf, overrides: PathOverrides) -> Paths {
    let tokens = overrides
        .tokens
        .unwrap_or_else(|| home.join(TOKENS_FILE_NAME));
    let tokens_lock = lock_path_for(&tokens);
    Paths {
        credentials: overrides
            .credentials
            .unwrap_or_else(|| home.join(CREDENTIALS_FILE_NAME)),
        env: overrides.env.unwrap_or_else(|| home.join(ENV_FILE_NAME)),
        tokens,
        tokens_lock,
        home,
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| TOKENS_FILE_NAME.into());
    name.push(".lock");
    path.with_file_name(name)
}

pub fn ensure_paths(paths: &Paths) -> Result<(), String> {
    ensure_file_or_absent(&paths.tokens)?;
    ensure_file_or_absent(&paths.credentials)?;
    ensure_file_or_absent(&paths.env)?;
    ensure_file_or_absent(&paths.tokens_lock)?;
    Ok(())
}

fn ensure_file_or_absent(path: &Path) -> Result<(), String> {
    if path.exists() && !path.is_file() {
        return Err(crate::msg1(COMMON_ERR_EXISTS_NOT_FILE, path.display()));
    }
    Ok(())
}

const FAIL_WRITE_OPEN: usize = 1;
const FAIL_WRITE_WRITE: usize = 2;
const FAIL_WRITE_SYNC: usize = 3;
const FAIL_WRITE_RENAME: usize = 4;

#[cfg(test)]
thread_local! {
    static FAILPOINT: Cell<usize> = const { Cell::new(0) };
}
#[cfg(test)]
static FAILPOINT_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
fn maybe_fail(step: usize) -> std::io::Result<()> {
    if FAILPOINT.with(|failpoint| failpoint.get()) == step {
        return Err(std::io::Error::other("failpoint"));
    }
    Ok(())
}

#[cfg(not(test))]
fn maybe_fail(_step: usize) -> std::io::Result<()> {
    Ok(())
}

/// Replaces `path` with `contents` through a sibling temp file, keeping existing permissions.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), String> {
    let permissions = fs::metadata(path).ok().map(|meta| meta.permissions());
    let parent = path
        .parent()
        .ok_or_else(|| crate::msg1(COMMON_ERR_RESOLVE_PARENT, path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .map_err(|err| crate::msg2(COMMON_ERR_CREATE_DIR, parent.display(), err))?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| crate::msg1(COMMON_ERR_INVALID_FILE_NAME, path.display()))?;

    let (tmp_path, mut tmp_file) = create_temp_sibling(parent, file_name, path)?;
    let staged = maybe_fail(FAIL_WRITE_WRITE)
        .and_then(|_| tmp_file.write_all(contents))
        .and_then(|_| match permissions {
            Some(permissions) => fs::set_permissions(&tmp_path, permissions),
            None => Ok(()),
        })
        .and_then(|_| maybe_fail(FAIL_WRITE_SYNC))
        .and_then(|_| tmp_file.sync_all());
    if let Err(err) = staged {
        let _ = fs::remove_file(&tmp_path);
        return Err(crate::msg2(COMMON_ERR_WRITE_TEMP, path.display(), err));
    }
    drop(tmp_file);

    match maybe_fail(FAIL_WRITE_RENAME).and_then(|_| fs::rename(&tmp_path, path)) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            Err(crate::msg2(COMMON_ERR_REPLACE_FILE, path.display(), err))
        }
    }
}

fn create_temp_sibling(
    parent: &Path,
    file_name: &str,
    path: &Path,
) -> Result<(PathBuf, fs::File), String> {
    let pid = std::process::id();
    let mut attempt = 0u32;
    loop {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| crate::msg1(COMMON_ERR_GET_TIME, err))?
            .as_nanos();
        let tmp_path = parent.join(format!(".{file_name}.tmp-{pid}-{nanos}-{attempt}"));
        let opened = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .and_then(|file| {
                maybe_fail(FAIL_WRITE_OPEN)?;
                Ok(file)
            });
        match opened {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) => {
                let _ = fs::remove_file(&tmp_path);
                attempt += 1;
                if attempt >= 5 {
                    return Err(crate::msg2(COMMON_ERR_CREATE_TEMP, path.display(), err));
                }
            }
        }
    }
}

#[cfg(test)]
const LOCK_FAIL_ERR: usize = 1;
#[cfg(test)]
const LOCK_FAIL_BUSY: usize = 2;
#[cfg(test)]
static LOCK_FAILPOINT: AtomicUsize = AtomicUsize::new(0);
#[cfg(test)]
pub(crate) static LOCK_TEST_MUTEX: Mutex<()> = Mutex::new(());

/// Held while the credential collection is read, refreshed and rewritten.
#[derive(Debug)]
pub struct CollectionLock {
    _lock: LockFile,
}

pub fn lock_collection(paths: &Paths) -> Result<CollectionLock, String> {
    if let Some(parent) = paths.tokens_lock.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| crate::msg2(COMMON_ERR_CREATE_DIR, parent.display(), err))?;
    }
    let start = Instant::now();
    let mut lock = LockFile::open(&paths.tokens_lock)
        .map_err(|err| crate::msg2(COMMON_ERR_LOCK_OPEN, paths.tokens_lock.display(), err))?;
    loop {
        match try_lock(&mut lock) {
            Ok(true) => break,
            Ok(false) => {
                if start.elapsed() > lock_timeout() {
                    return Err(crate::msg1(COMMON_ERR_LOCK_ACQUIRE, command_name()));
                }
                tracing::debug!(lock = %paths.tokens_lock.display(), "collection lock busy");
                thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(err) => return Err(crate::msg1(COMMON_ERR_LOCK_HELD, err)),
        }
    }
    Ok(CollectionLock { _lock: lock })
}

#[cfg(not(test))]
fn lock_timeout() -> Duration {
    LOCK_TIMEOUT
}

#[cfg(not(test))]
fn try_lock(lock: &mut LockFile) -> Result<bool, fslock::Error> {
    lock.try_lock()
}

#[cfg(test)]
fn lock_timeout() -> Duration {
    Duration::from_millis(50)
}

#[cfg(test)]
fn try_lock(lock: &mut LockFile) -> Result<bool, fslock::Error> {
    match LOCK_FAILPOINT.load(Ordering::Relaxed) {
        LOCK_FAIL_ERR => Err(std::io::Error::other("fail")),
        LOCK_FAIL_BUSY => Ok(false),
        _ => lock.try_lock(),
    }
}
