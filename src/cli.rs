use clap::{Args, Command, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use crate::{AuthMethod, command_name};

#[derive(Parser)]
#[command(author, version, about, color = clap::ColorChoice::Never)]
pub struct Cli {
    /// Disable styling and separators
    #[arg(long, global = true)]
    pub plain: bool,
    /// Credential collection file (default: ./tokens_export.json)
    #[arg(long, global = true, value_name = "path")]
    pub tokens_file: Option<PathBuf>,
    /// Exported single-credential file (default: ./kiro-credentials.json)
    #[arg(long, global = true, value_name = "path")]
    pub credentials_file: Option<PathBuf>,
    /// Gateway environment file (default: ./.env)
    #[arg(long, global = true, value_name = "path")]
    pub env_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List valid credentials, latest expiry first
    List,
    /// Refresh a credential's tokens and usage quota
    Refresh {
        #[command(flatten)]
        target: TargetArgs,
        /// Refresh every valid credential
        #[arg(long, conflicts_with_all = ["index", "client_id"])]
        all: bool,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Import a credential from JSON and refresh it
    Add {
        /// Credential JSON (read from stdin when omitted)
        #[arg(long, value_name = "json")]
        json: Option<String>,
    },
    /// Write one credential to the gateway's credentials file
    Export {
        #[command(flatten)]
        target: TargetArgs,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Inspect or change the gateway's auth method
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

/// Picks a credential without the interactive list.
#[derive(Args, Clone, Debug, Default)]
pub struct TargetArgs {
    /// 1-based position as shown by `list`
    #[arg(long, value_name = "n")]
    pub index: Option<usize>,
    /// Client id of the credential
    #[arg(long, value_name = "id", conflicts_with = "index")]
    pub client_id: Option<String>,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show the active auth method
    Status,
    /// Activate an auth method and comment out the others
    Switch {
        #[arg(value_enum)]
        method: AuthMethod,
        /// Value to assign (defaults depend on the method)
        value: Option<String>,
    },
}

pub fn command_with_examples() -> Command {
    let name = command_name();
    let mut cmd = Cli::command();
    cmd.set_bin_name(name);
    cmd = cmd.after_help(examples_root(name));
    cmd
}

fn examples_root(name: &str) -> String {
    format!(
        "Examples:\n  {name} list\n  {name} refresh --index 1\n  {name} refresh --all --yes\n  {name} add --json '{{\"refreshToken\":\"...\",\"clientId\":\"...\",\"clientSecret\":\"...\"}}'\n  {name} export --client-id abc123\n  {name} auth switch creds-file"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn target_flags_conflict() {
        let err = Cli::try_parse_from(["kiro-tools", "export", "--index", "1", "--client-id", "x"]);
        assert!(err.is_err());
        let err = Cli::try_parse_from(["kiro-tools", "refresh", "--all", "--index", "1"]);
        assert!(err.is_err());
    }

    #[test]
    fn parses_auth_switch_and_globals() {
        let cli = Cli::try_parse_from([
            "kiro-tools",
            "auth",
            "switch",
            "refresh-token",
            "tok",
            "--env-file",
            "/tmp/gw.env",
            "--plain",
        ])
        .unwrap();
        assert!(cli.plain);
        assert_eq!(cli.env_file, Some(PathBuf::from("/tmp/gw.env")));
        match cli.command {
            Commands::Auth {
                command: AuthCommands::Switch { method, value },
            } => {
                assert_eq!(method, AuthMethod::RefreshToken);
                assert_eq!(value.as_deref(), Some("tok"));
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn examples_mention_commands() {
        let text = examples_root("kiro-tools");
        assert!(text.contains("kiro-tools refresh --all --yes"));
        assert!(text.contains("auth switch creds-file"));
    }
}
