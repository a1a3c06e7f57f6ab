use clap::{FromArgMatches, error::ErrorKind};

use crate::cli::{AuthCommands, Cli, Commands, command_with_examples};

pub fn run_cli() {
    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    if let Err(message) = run_cli_with_args(args) {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run_cli_with_args(args: Vec<std::ffi::OsString>) -> Result<(), String> {
    if args.len() == 1 {
        let name = package_command_name();
        println!("{name} {}", env!("CARGO_PKG_VERSION"));
        println!();
        let mut cmd = command_with_examples();
        let _ = cmd.print_help();
        println!();
        return Ok(());
    }
    let cmd = command_with_examples();
    let matches = match cmd.clone().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let name = package_command_name();
                println!("{name} {}", env!("CARGO_PKG_VERSION"));
                println!();
                if err.kind() == ErrorKind::DisplayHelp {
                    let _ = err.print();
                    println!();
                }
                return Ok(());
            }
            return Err(err.to_string());
        }
    };
    let cli = Cli::from_arg_matches(&matches).map_err(|err| err.to_string())?;
    set_plain(cli.plain);
    init_logging(use_color_stderr());
    if let Err(message) = run(cli) {
        if message == CANCELLED_MESSAGE {
            let message = format_cancel(use_color_stdout());
            print_output_block(&message);
            return Ok(());
        }
        return Err(format_error(&message));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let paths = resolve_paths(PathOverrides {
        tokens: cli.tokens_file,
        credentials: cli.credentials_file,
        env: cli.env_file,
    })?;
    ensure_paths(&paths)?;
    let endpoints = Endpoints::from_env();
    tracing::debug!(home = %paths.home.display(), "resolved paths");

    match cli.command {
        Commands::List => list_credentials(&paths),
        Commands::Refresh { target, all, yes } => {
            refresh_credentials(&paths, &endpoints, &target, all, yes)
        }
        Commands::Add { json } => add_credential(&paths, &endpoints, json),
        Commands::Export { target, yes } => export_selected(&paths, &target, yes),
        Commands::Auth { command } => match command {
            AuthCommands::Status => auth_status(&paths),
            AuthCommands::Switch { method, value } => auth_switch(&paths, method, value),
        },
    }
}

mod accounts;
mod auth;
mod cli;
mod common;
mod credentials;
mod error;
mod export;
mod logging;
mod messages;
mod switcher;
#[cfg(test)]
mod test_utils;
mod ui;
mod usage;

pub(crate) use accounts::*;
pub(crate) use auth::*;
pub(crate) use common::*;
pub(crate) use credentials::*;
pub(crate) use error::*;
pub(crate) use export::*;
pub(crate) use logging::*;
pub(crate) use messages::*;
pub(crate) use switcher::*;
pub(crate) use ui::*;
pub(crate) use usage::*;

pub use auth::{AuthProtocol, TokenGrant, apply_grant, email_from_access_token};
pub use common::Endpoints;
pub use credentials::{
    CredentialRecord, MergeOutcome, RecordKey, UsageQuota, format_timestamp, import_record,
    merge_refreshed, parse_timestamp, valid_credentials,
};
pub use error::{ToolError, UpstreamError};
pub use export::{ExportedCredential, export_credential};
pub use switcher::{AuthMethod, CurrentAuth, inspect_auth, switch_auth};
pub use usage::fetch_usage_quota;
