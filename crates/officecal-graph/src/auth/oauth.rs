//! OAuth 2.0 device authorization grant (RFC 8628) and refresh-token grant
//! against the Microsoft identity platform.
//!
//! # Flow Overview
//!
//! 1. POST the client id and scopes to the device authorization endpoint
//! 2. Show the returned user code and verification URL to the user
//! 3. Poll the token endpoint with the device code until the user finishes
//! 4. Later, exchange the refresh token for a new access token silently
//!
//! This module only speaks the wire protocol. Deciding what a refusal means
//! (keep polling, sign in again, retry later) is up to the caller.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use officecal_core::DeviceCodeHandle;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::GraphConfig;
use crate::http::{HttpBackend, HttpRequest, HttpResponse, TransportError};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Polling interval used when the server does not send one.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const MAX_CODE_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// Failure talking to an identity platform endpoint.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The endpoint answered with an OAuth error.
    #[error("{error} ({status}): {description}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },

    /// The endpoint answered 2xx with an unusable body.
    #[error("invalid response from identity platform: {0}")]
    InvalidResponse(String),
}

impl OAuthError {
    /// The OAuth `error` code, if the endpoint sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns true if trying again later may succeed.
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, error, .. } => {
                *status >= 500 || *status == 429 || error == "temporarily_unavailable"
            }
            Self::InvalidResponse(_) => false,
        }
    }

    /// Returns true if the refresh token can no longer be used and only a new
    /// interactive sign-in will help.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self.code(),
            Some("invalid_grant" | "interaction_required" | "consent_required" | "login_required")
        )
    }
}

/// Tokens issued by the token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    /// Account label from the `id_token`, if one was issued.
    pub fn account(&self) -> Option<String> {
        self.id_token.as_deref().and_then(account_from_id_token)
    }
}

#[derive(Deserialize)]
struct DeviceAuthorization {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the identity platform endpoints of one app registration.
pub struct OAuthClient {
    backend: Arc<dyn HttpBackend>,
    client_id: String,
    scope: String,
    device_code_endpoint: String,
    token_endpoint: String,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Creates a client for the app registration in `config`.
    pub fn new(config: &GraphConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            backend,
            client_id: config.client_id.clone(),
            scope: config.requested_scope(),
            device_code_endpoint: config.device_code_endpoint(),
            token_endpoint: config.token_endpoint(),
        }
    }

    /// Starts a device authorization grant.
    pub async fn start_device_authorization(&self) -> Result<DeviceCodeHandle, OAuthError> {
        let body: DeviceAuthorization = self
            .call(
                &self.device_code_endpoint,
                vec![
                    ("client_id".to_string(), self.client_id.clone()),
                    ("scope".to_string(), self.scope.clone()),
                ],
            )
            .await?;

        let message = body.message.unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                body.verification_uri, body.user_code
            )
        });
        // Clamped so the expiry stays within chrono range.
        let expires_in = body.expires_in.min(MAX_CODE_LIFETIME_SECS) as i64;

        debug!(expires_in = body.expires_in, "device authorization started");
        Ok(DeviceCodeHandle {
            user_code: body.user_code,
            verification_uri: body.verification_uri,
            message,
            device_code: body.device_code,
            interval: body
                .interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        })
    }

    /// Polls the token endpoint once for a pending device authorization.
    ///
    /// While the user has not finished, this returns a `Rejected` error with
    /// code `authorization_pending` (or `slow_down`).
    pub async fn poll_device_code(&self, handle: &DeviceCodeHandle) -> Result<TokenGrant, OAuthError> {
        self.call(
            &self.token_endpoint,
            vec![
                ("grant_type".to_string(), DEVICE_CODE_GRANT.to_string()),
                ("client_id".to_string(), self.client_id.clone()),
                ("device_code".to_string(), handle.device_code.clone()),
            ],
        )
        .await
    }

    /// Exchanges a refresh token for new tokens.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        self.call(
            &self.token_endpoint,
            vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("client_id".to_string(), self.client_id.clone()),
                ("refresh_token".to_string(), refresh_token.to_string()),
                ("scope".to_string(), self.scope.clone()),
            ],
        )
        .await
    }

    async fn call<T>(&self, endpoint: &str, fields: Vec<(String, String)>) -> Result<T, OAuthError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = Url::parse(endpoint)
            .map_err(|e| OAuthError::InvalidResponse(format!("bad endpoint {}: {}", endpoint, e)))?;
        let response = self.backend.execute(HttpRequest::form(url, fields)).await?;

        if !response.is_success() {
            return Err(rejection(&response));
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))
    }
}

fn rejection(response: &HttpResponse) -> OAuthError {
    let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    OAuthError::Rejected {
        status: response.status,
        error: body.error.unwrap_or_else(|| "http_error".to_string()),
        description: body
            .error_description
            .unwrap_or_else(|| format!("identity platform returned HTTP {}", response.status)),
    }
}

/// Extracts a display label for the signed-in account from an `id_token`.
///
/// The token signature is not checked; the value is only used as a label.
pub fn account_from_id_token(id_token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Claims {
        preferred_username: Option<String>,
        upn: Option<String>,
        email: Option<String>,
    }

    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims
        .preferred_username
        .or(claims.upn)
        .or(claims.email)
        .filter(|s| !s.is_empty())
}
