//! Scripted [`HttpBackend`] for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::time::Instant;

use crate::config::GraphConfig;
use crate::http::{BoxFuture, HttpBackend, HttpRequest, HttpResponse, TransportError};
use crate::retry::RetryPolicy;

type Reply = Result<HttpResponse, TransportError>;

struct Route {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// A request seen by the backend, with the (paused-clock) time it arrived.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: HttpRequest,
    pub at: Instant,
}

/// Backend that answers from per-route reply queues.
///
/// A request is served by the first route whose pattern occurs in its URL
/// and that still has replies queued.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    routes: Arc<Mutex<Vec<Route>>>,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for URLs containing `pattern`.
    pub fn on(&self, pattern: &str, response: HttpResponse) -> &Self {
        self.push(pattern, Ok(response))
    }

    /// Queues a JSON reply for URLs containing `pattern`.
    pub fn on_json(&self, pattern: &str, status: u16, body: Value) -> &Self {
        self.push(pattern, Ok(HttpResponse::json(status, &body)))
    }

    /// Queues a transport failure for URLs containing `pattern`.
    pub fn on_failure(&self, pattern: &str, err: TransportError) -> &Self {
        self.push(pattern, Err(err))
    }

    fn push(&self, pattern: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of requests whose URL contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.request.url.as_str().contains(pattern))
            .count()
    }

    /// Total number of requests received.
    pub fn total(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn reply(&self, request: HttpRequest) -> Reply {
        let url = request.url.to_string();
        self.seen.lock().unwrap().push(Recorded {
            request,
            at: Instant::now(),
        });
        let mut routes = self.routes.lock().unwrap();
        routes
            .iter_mut()
            .find(|r| url.contains(&r.pattern) && !r.replies.is_empty())
            .and_then(|r| r.replies.pop_front())
            .unwrap_or_else(|| Err(TransportError::Other(format!("unscripted request to {}", url))))
    }
}

impl HttpBackend for ScriptedBackend {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let reply = self.reply(request);
        Box::pin(async move { reply })
    }
}

pub const TOKEN_PATH: &str = "/oauth2/v2.0/token";
pub const DEVICE_CODE_PATH: &str = "/oauth2/v2.0/devicecode";
pub const GRAPH_BASE: &str = "https://graph.example.test/v1.0";

/// Configuration pointing at test hosts, with a fast retry policy.
pub fn test_config(credential_path: impl Into<std::path::PathBuf>) -> GraphConfig {
    GraphConfig::new("test-client", "contoso.com")
        .with_authority_host("https://login.example.test")
        .with_base_url(GRAPH_BASE)
        .with_credential_path(credential_path)
        .with_retry(RetryPolicy::default().with_backoff(
            std::time::Duration::from_millis(100),
            std::time::Duration::from_secs(1),
            2.0,
        ))
}

/// A successful token endpoint response.
pub fn token_response(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> Value {
    let mut body = json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "expires_in": expires_in,
        "scope": "Calendars.ReadWrite User.Read",
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}

/// A device authorization response.
pub fn device_code_response() -> Value {
    json!({
        "device_code": "device-secret",
        "user_code": "ABCD-EFGH",
        "verification_uri": "https://microsoft.com/devicelogin",
        "expires_in": 900,
        "interval": 5,
        "message": "To sign in, use a web browser to open the page https://microsoft.com/devicelogin and enter the code ABCD-EFGH to authenticate."
    })
}

/// An OAuth error response body.
pub fn oauth_error(error: &str) -> Value {
    json!({
        "error": error,
        "error_description": format!("AADSTS00000: {}", error),
    })
}

/// Saves a credential valid for an hour for the configuration.
pub fn seed_credentials(config: &GraphConfig, access_token: &str) {
    crate::store::CredentialStore::new(&config.credential_path)
        .save(&crate::store::CredentialRecord {
            access_token: access_token.to_string(),
            refresh_token: Some("seed-refresh".to_string()),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            account: Some("ada@contoso.com".to_string()),
            authority: config.authority(),
            scopes: config.scopes.clone(),
        })
        .unwrap();
}
