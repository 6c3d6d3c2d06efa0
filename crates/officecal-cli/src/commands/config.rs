//! Configuration commands.

use crate::config::ClientConfig;
use crate::error::{CliError, CliResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig) -> CliResult<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", rendered);
    Ok(())
}

/// Validate the configuration, including secret references.
pub fn validate(
    config: &ClientConfig,
    client_id: Option<&str>,
    tenant_id: Option<&str>,
) -> CliResult<()> {
    let graph = config
        .to_graph_config(client_id, tenant_id)
        .map_err(CliError::Config)?;
    println!("Configuration is valid.");
    println!("Authority: {}", graph.authority());
    println!("Scopes: {}", graph.scopes.join(" "));
    println!("Credential file: {}", graph.credential_path.display());
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> CliResult<()> {
    println!("config: {}", ClientConfig::default_path().display());
    Ok(())
}
