//! Graph client configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::retry::RetryPolicy;

/// Configuration for the Graph boundary layer.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Application (client) ID of the app registration.
    pub client_id: String,

    /// Tenant selector: a directory GUID/domain, `organizations`, `common`
    /// or `consumers`.
    pub tenant: String,

    /// Identity platform host, without tenant.
    ///
    /// Defaults to `https://login.microsoftonline.com`.
    pub authority_host: String,

    /// API base URL, including the version segment.
    ///
    /// Defaults to `https://graph.microsoft.com/v1.0`.
    pub base_url: String,

    /// Delegated permissions to request.
    ///
    /// Derived from the tenant by [`GraphConfig::new`].
    pub scopes: Vec<String>,

    /// Path of the cached credential record.
    ///
    /// Defaults to `~/.officecal/token_cache.json`.
    pub credential_path: PathBuf,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// A token closer than this to expiry is refreshed before use.
    pub refresh_headroom: Duration,

    /// Maximum number of pages `get_all` will fetch.
    pub max_pages: usize,

    /// Retry policy for transient failures.
    pub retry: RetryPolicy,

    /// User agent string for requests.
    pub user_agent: String,
}

impl GraphConfig {
    /// Default identity platform host.
    pub const DEFAULT_AUTHORITY_HOST: &'static str = "https://login.microsoftonline.com";

    /// Default API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://graph.microsoft.com/v1.0";

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default page cap for paginated listings.
    pub const DEFAULT_MAX_PAGES: usize = 50;

    /// Scopes requested for work/school tenants.
    pub const ORG_SCOPES: &'static [&'static str] = &[
        "Calendars.ReadWrite",
        "Calendars.ReadWrite.Shared",
        "Place.Read.All",
        "User.Read",
    ];

    /// Scopes requested for personal accounts, which cannot share calendars.
    pub const PERSONAL_SCOPES: &'static [&'static str] = &["Calendars.ReadWrite", "User.Read"];

    /// Scopes always added so a refresh token and identity claims are issued.
    pub const SESSION_SCOPES: &'static [&'static str] = &["offline_access", "openid", "profile"];

    /// Creates a configuration for the given app registration and tenant.
    pub fn new(client_id: impl Into<String>, tenant: impl Into<String>) -> Self {
        let tenant = tenant.into();
        let scopes = Self::scopes_for_tenant(&tenant);
        Self {
            client_id: client_id.into(),
            tenant,
            authority_host: Self::DEFAULT_AUTHORITY_HOST.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            scopes,
            credential_path: officecal_core::paths::default_credential_path(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            refresh_headroom: Duration::from_secs(60),
            max_pages: Self::DEFAULT_MAX_PAGES,
            retry: RetryPolicy::default(),
            user_agent: format!("officecal/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Returns true if `tenant` targets personal Microsoft accounts rather
    /// than a single organisation.
    pub fn is_personal_tenant(tenant: &str) -> bool {
        matches!(tenant.to_ascii_lowercase().as_str(), "consumers" | "common")
    }

    /// Returns the permission set appropriate for `tenant`.
    pub fn scopes_for_tenant(tenant: &str) -> Vec<String> {
        let scopes = if Self::is_personal_tenant(tenant) {
            Self::PERSONAL_SCOPES
        } else {
            Self::ORG_SCOPES
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }

    /// Sets the identity platform host.
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the credential file path.
    pub fn with_credential_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_path = path.into();
        self
    }

    /// Sets the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the refresh headroom.
    pub fn with_refresh_headroom(mut self, headroom: Duration) -> Self {
        self.refresh_headroom = headroom;
        self
    }

    /// Sets the page cap.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Authority URL, e.g. `https://login.microsoftonline.com/consumers`.
    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host.trim_end_matches('/'), self.tenant)
    }

    /// Device authorization endpoint.
    pub fn device_code_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority())
    }

    /// Token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }

    /// Scopes sent to the identity platform, space separated.
    pub fn requested_scope(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .chain(Self::SESSION_SCOPES.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses the API base URL.
    pub fn parsed_base_url(&self) -> Result<Url, String> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| format!("invalid base_url {:?}: {}", self.base_url, e))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(format!("base_url {:?} must be an absolute http(s) URL", self.base_url));
        }
        Ok(url)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.tenant.trim().is_empty() {
            return Err("tenant is required".to_string());
        }
        if self.scopes.is_empty() {
            return Err("at least one scope is required".to_string());
        }
        if self.max_pages == 0 {
            return Err("max_pages must be at least 1".to_string());
        }
        self.parsed_base_url()?;
        Url::parse(&self.authority_host)
            .map_err(|e| format!("invalid authority_host {:?}: {}", self.authority_host, e))?;
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_tenant_gets_shared_and_place_scopes() {
        let config = GraphConfig::new("client", "contoso.onmicrosoft.com");
        assert!(config.scopes.contains(&"Calendars.ReadWrite.Shared".to_string()));
        assert!(config.scopes.contains(&"Place.Read.All".to_string()));
    }

    #[test]
    fn personal_tenants() {
        assert!(GraphConfig::is_personal_tenant("consumers"));
        assert!(GraphConfig::is_personal_tenant("COMMON"));
        assert!(!GraphConfig::is_personal_tenant("organizations"));

        let config = GraphConfig::new("client", "consumers");
        assert_eq!(
            config.scopes,
            vec!["Calendars.ReadWrite".to_string(), "User.Read".to_string()]
        );
    }

    #[test]
    fn endpoints() {
        let config = GraphConfig::new("client", "consumers")
            .with_authority_host("https://login.example.test/");
        assert_eq!(config.authority(), "https://login.example.test/consumers");
        assert_eq!(
            config.device_code_endpoint(),
            "https://login.example.test/consumers/oauth2/v2.0/devicecode"
        );
        assert_eq!(
            config.token_endpoint(),
            "https://login.example.test/consumers/oauth2/v2.0/token"
        );
    }

    #[test]
    fn requested_scope_includes_offline_access() {
        let config = GraphConfig::new("client", "consumers");
        assert_eq!(
            config.requested_scope(),
            "Calendars.ReadWrite User.Read offline_access openid profile"
        );
    }

    #[test]
    fn validation() {
        assert!(GraphConfig::new("client", "consumers").validate().is_ok());
        assert!(GraphConfig::new("", "consumers").validate().is_err());
        assert!(GraphConfig::new("client", " ").validate().is_err());
        assert!(
            GraphConfig::new("client", "consumers")
                .with_max_pages(0)
                .validate()
                .is_err()
        );
        assert!(
            GraphConfig::new("client", "consumers")
                .with_base_url("not a url")
                .validate()
                .is_err()
        );
        assert!(
            GraphConfig::new("client", "consumers")
                .with_scopes(vec![])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn builder_methods() {
        let config = GraphConfig::new("client", "consumers")
            .with_base_url("https://graph.example.test/beta")
            .with_credential_path("/tmp/creds.json")
            .with_timeout(Duration::from_secs(5))
            .with_refresh_headroom(Duration::from_secs(120))
            .with_max_pages(3);

        assert_eq!(config.base_url, "https://graph.example.test/beta");
        assert_eq!(config.credential_path, PathBuf::from("/tmp/creds.json"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_headroom, Duration::from_secs(120));
        assert_eq!(config.max_pages, 3);
    }
}
