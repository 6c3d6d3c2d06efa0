//! officecal command-line client.
//!
//! Signs in to Microsoft Graph with the device-code flow and reads calendar
//! data as JSON.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{CliError, CliResult};
