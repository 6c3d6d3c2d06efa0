//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// officecal - Microsoft 365 calendar from the command line
#[derive(Debug, Parser)]
#[command(name = "officecal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "OFFICECAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Application (client) ID of the Entra app registration
    #[arg(long, env = "OFFICECAL_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Tenant ID, domain, `organizations`, `common` or `consumers`
    #[arg(long, env = "OFFICECAL_TENANT_ID", global = true)]
    pub tenant_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign-in commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the signed-in user's profile
    Me,

    /// List calendars
    Calendars,

    /// List events in a time range
    Events {
        /// Range start, ISO 8601 (e.g. 2026-02-16T00:00:00)
        #[arg(long)]
        start: String,

        /// Range end, ISO 8601 (e.g. 2026-02-16T23:59:59)
        #[arg(long)]
        end: String,

        /// Read another user's shared calendar
        #[arg(long)]
        user: Option<String>,
    },

    /// List meeting rooms
    Rooms {
        /// Only rooms whose building contains this text
        #[arg(long)]
        building: Option<String>,
    },

    /// GET a raw resource path, e.g. /me/events
    Get {
        /// Path relative to the API base URL
        path: String,

        /// Follow @odata.nextLink and print every item
        #[arg(long)]
        all: bool,
    },
}

/// Sign-in actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Sign in with a device code
    Login {
        /// Seconds to wait for the sign-in to complete
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Open the verification page in the browser
        #[arg(long)]
        open: bool,

        /// Sign in again even if a usable credential is cached
        #[arg(long, short)]
        force: bool,
    },

    /// Show the cached sign-in state
    Status,

    /// Remove the cached credential
    Logout,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arguments() {
        let cli = Cli::try_parse_from([
            "officecal",
            "events",
            "--start",
            "2026-02-16T00:00:00",
            "--end",
            "2026-02-16T23:59:59",
            "--user",
            "grace@contoso.com",
        ])
        .unwrap();

        match cli.command {
            Command::Events { start, end, user } => {
                assert_eq!(start, "2026-02-16T00:00:00");
                assert_eq!(end, "2026-02-16T23:59:59");
                assert_eq!(user.as_deref(), Some("grace@contoso.com"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn login_defaults() {
        let cli = Cli::try_parse_from(["officecal", "auth", "login"]).unwrap();
        match cli.command {
            Command::Auth {
                action: AuthAction::Login { timeout, open, force },
            } => {
                assert_eq!(timeout, 300);
                assert!(!open);
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_tenant_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["officecal", "calendars", "--tenant-id", "consumers"]).unwrap();
        assert_eq!(cli.tenant_id.as_deref(), Some("consumers"));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["officecal"]).is_err());
    }
}
