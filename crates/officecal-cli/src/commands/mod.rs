//! Command implementations.

pub mod auth;
pub mod calendar;
pub mod config;

use serde::Serialize;

use crate::error::CliResult;

/// Prints a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
