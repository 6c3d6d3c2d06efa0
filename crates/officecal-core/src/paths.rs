//! Per-user file locations.

use std::path::PathBuf;

/// Directory holding the cached credential record (`~/.officecal`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".officecal")
}

/// Default location of the credential file.
pub fn default_credential_path() -> PathBuf {
    data_dir().join("token_cache.json")
}

/// Directory holding `config.toml` (`~/.config/officecal`).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("officecal")
}

/// Default location of the CLI configuration file.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
