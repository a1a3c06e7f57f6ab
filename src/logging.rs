use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "KIRO_TOOLS_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the stderr subscriber. Verbosity comes from `KIRO_TOOLS_LOG`
/// (`EnvFilter` syntax) and defaults to warnings only.
pub fn init_logging(ansi: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
