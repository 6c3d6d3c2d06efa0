//! CLI configuration.
//!
//! Settings live in `config.toml` under the user's config directory
//! (`~/.config/officecal/config.toml` on Linux). `client_id` and `tenant_id`
//! accept secret references (`pass::…`, `env::…`) and can be overridden on
//! the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use officecal_graph::{GraphConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug logging.
    pub debug: bool,

    /// App registration and endpoint settings.
    pub graph: GraphSettings,

    /// Retry tuning.
    pub retry: RetrySettings,
}

/// `[graph]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Application (client) ID.
    pub client_id: Option<String>,

    /// Tenant selector.
    pub tenant_id: Option<String>,

    /// Identity platform host.
    pub authority_host: Option<String>,

    /// API base URL.
    pub base_url: Option<String>,

    /// Credential cache location.
    pub credential_path: Option<PathBuf>,

    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Page cap for listings.
    pub max_pages: Option<usize>,
}

/// `[retry]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per request.
    pub max_attempts: Option<u32>,

    /// First backoff delay in milliseconds.
    pub base_delay_ms: Option<u64>,

    /// Backoff ceiling in seconds.
    pub max_delay_secs: Option<u64>,

    /// Longest `Retry-After` that will be waited out, in seconds.
    pub max_retry_after_secs: Option<u64>,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        officecal_core::paths::default_config_path()
    }

    /// Builds the Graph configuration.
    ///
    /// Command-line values take precedence over the file. Secret references
    /// are resolved here.
    pub fn to_graph_config(
        &self,
        client_id: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<GraphConfig, String> {
        let client_id = required(client_id, self.graph.client_id.as_deref(), "client_id")?;
        let tenant_id = required(tenant_id, self.graph.tenant_id.as_deref(), "tenant_id")?;

        let mut config = GraphConfig::new(client_id, tenant_id);
        if let Some(ref host) = self.graph.authority_host {
            config = config.with_authority_host(host);
        }
        if let Some(ref base_url) = self.graph.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(ref path) = self.graph.credential_path {
            config = config.with_credential_path(path);
        }
        if let Some(secs) = self.graph.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max_pages) = self.graph.max_pages {
            config = config.with_max_pages(max_pages);
        }
        let retry = self.retry.apply(config.retry.clone());
        config = config.with_retry(retry);

        config.validate()?;
        Ok(config)
    }
}

impl RetrySettings {
    fn apply(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(attempts) = self.max_attempts {
            policy = policy.with_max_attempts(attempts);
        }
        if let Some(ms) = self.base_delay_ms {
            policy.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.max_delay_secs {
            policy.max_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_retry_after_secs {
            policy = policy.with_max_retry_after(Duration::from_secs(secs));
        }
        policy
    }
}

fn required(cli: Option<&str>, file: Option<&str>, name: &str) -> Result<String, String> {
    let raw = cli.or(file).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        format!(
            "{} is not set. Pass --{} or add to {}:\n  \
             [graph]\n  \
             {} = \"...\"",
            name,
            name.replace('_', "-"),
            ClientConfig::default_path().display(),
            name
        )
    })?;
    crate::secret::resolve(raw).map_err(|e| format!("failed to resolve {}: {}", name, e))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn full_file() {
        let config: ClientConfig = toml::from_str(
            r#"
debug = true

[graph]
client_id = "3f2b1c4d-0000-4000-8000-123456789abc"
tenant_id = "consumers"
credential_path = "/tmp/officecal/token_cache.json"
timeout_secs = 10
max_pages = 5

[retry]
max_attempts = 4
base_delay_ms = 250
max_retry_after_secs = 30
"#,
        )
        .unwrap();

        let graph = config.to_graph_config(None, None).unwrap();
        assert_eq!(graph.client_id, "3f2b1c4d-0000-4000-8000-123456789abc");
        assert_eq!(graph.tenant, "consumers");
        assert_eq!(
            graph.credential_path,
            PathBuf::from("/tmp/officecal/token_cache.json")
        );
        assert_eq!(graph.timeout, Duration::from_secs(10));
        assert_eq!(graph.max_pages, 5);
        assert_eq!(graph.retry.max_attempts, 4);
        assert_eq!(graph.retry.base_delay, Duration::from_millis(250));
        assert_eq!(graph.retry.max_retry_after, Duration::from_secs(30));
        assert_eq!(graph.retry.retryable_statuses, vec![429, 503, 504]);
    }

    #[test]
    fn retry_defaults_without_section() {
        let config: ClientConfig =
            toml::from_str("[graph]\nclient_id = \"a\"\ntenant_id = \"b\"\n").unwrap();
        let graph = config.to_graph_config(None, None).unwrap();
        assert_eq!(graph.retry, RetryPolicy::default());
    }

    #[test]
    fn command_line_wins() {
        let config: ClientConfig = toml::from_str(
            r#"
[graph]
client_id = "from-file"
tenant_id = "contoso.com"
"#,
        )
        .unwrap();
        let graph = config
            .to_graph_config(Some("from-cli"), Some("consumers"))
            .unwrap();
        assert_eq!(graph.client_id, "from-cli");
        assert_eq!(graph.tenant, "consumers");
    }

    #[test]
    fn missing_ids_are_reported() {
        let err = ClientConfig::default()
            .to_graph_config(None, Some("consumers"))
            .unwrap_err();
        assert!(err.contains("client_id is not set"));
        assert!(err.contains("--client-id"));

        let err = ClientConfig::default()
            .to_graph_config(Some("id"), None)
            .unwrap_err();
        assert!(err.contains("tenant_id"));
    }

    #[test]
    fn env_reference_in_file() {
        unsafe {
            std::env::set_var("_OFFICECAL_CFG_CLIENT", "resolved-client");
        }
        let config: ClientConfig = toml::from_str(
            "[graph]\nclient_id = \"env::_OFFICECAL_CFG_CLIENT\"\ntenant_id = \"common\"\n",
        )
        .unwrap();
        let graph = config.to_graph_config(None, None).unwrap();
        assert_eq!(graph.client_id, "resolved-client");
        unsafe {
            std::env::remove_var("_OFFICECAL_CFG_CLIENT");
        }
    }

    #[test]
    fn invalid_settings_fail_validation() {
        let config: ClientConfig =
            toml::from_str("[graph]\nclient_id = \"a\"\ntenant_id = \"b\"\nmax_pages = 0\n")
                .unwrap();
        assert!(config.to_graph_config(None, None).is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph]\ntenant_id = \"organizations\"").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.graph.tenant_id.as_deref(), Some("organizations"));
        assert!(config.graph.client_id.is_none());
    }

    #[test]
    fn unparseable_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graph\n").unwrap();
        assert!(ClientConfig::load_from(file.path()).is_err());
    }
}
