//! Credential lifecycle: cached token, silent refresh, interactive sign-in.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use officecal_core::{AuthErrorReason, DeviceCodeHandle, ErrorKind, GraphError, GraphResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::oauth::{OAuthClient, OAuthError, TokenGrant};
use crate::config::GraphConfig;
use crate::http::HttpBackend;
use crate::store::{CredentialRecord, CredentialStore};

/// Extra wait added to the polling interval on `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Upper bound applied to `expires_in` from the token endpoint.
const MAX_TOKEN_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Sign-in state as seen from the local credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// No usable record.
    Unauthenticated,
    /// The cached access token can be used as is.
    Valid {
        account: Option<String>,
        expires_at: DateTime<Utc>,
    },
    /// The access token expired but a refresh token is available.
    Stale { account: Option<String> },
}

/// Hands out bearer tokens, refreshing or asking for sign-in as needed.
///
/// Concurrent callers that find the token near expiry may each refresh it;
/// the last record written wins.
#[derive(Debug)]
pub struct Authenticator {
    store: CredentialStore,
    oauth: OAuthClient,
    authority: String,
    scopes: Vec<String>,
    refresh_headroom: Duration,
    retryable_statuses: Vec<u16>,
}

impl Authenticator {
    /// Creates an authenticator for `config`, sending requests through `backend`.
    pub fn new(config: &GraphConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            store: CredentialStore::new(&config.credential_path),
            oauth: OAuthClient::new(config, backend),
            authority: config.authority(),
            scopes: config.scopes.clone(),
            refresh_headroom: config.refresh_headroom,
            retryable_statuses: config.retry.retryable_statuses.clone(),
        }
    }

    /// Returns the credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns an access token usable for at least the refresh headroom.
    ///
    /// Never waits for user interaction. Without a usable record this starts
    /// a device-code flow and fails with `AuthRequired` carrying its handle.
    pub async fn get_valid_token(&self) -> GraphResult<String> {
        match self.current_record()? {
            None => Err(self.sign_in_required("not signed in").await),
            Some(record) if record.is_valid(self.refresh_headroom) => Ok(record.access_token),
            Some(record) => {
                debug!(expires_at = %record.expires_at, "access token near expiry, refreshing");
                Ok(self.refresh(record).await?.access_token)
            }
        }
    }

    /// Refreshes regardless of the cached expiry.
    ///
    /// Used after the remote rejected a token that looked valid locally.
    pub async fn force_refresh(&self) -> GraphResult<String> {
        match self.current_record()? {
            None => Err(self.sign_in_required("not signed in").await),
            Some(record) => Ok(self.refresh(record).await?.access_token),
        }
    }

    /// Starts an interactive sign-in. Does not wait for the user.
    pub async fn begin_device_code_flow(&self) -> GraphResult<DeviceCodeHandle> {
        let handle = self
            .oauth
            .start_device_authorization()
            .await
            .map_err(|e| self.endpoint_error(e, "could not start sign-in"))?;
        info!(verification_uri = %handle.verification_uri, "device-code sign-in started");
        Ok(handle)
    }

    /// Waits for the user to finish the sign-in started with `handle`.
    ///
    /// Gives up with `AuthTimeout` after `timeout` or when the code expires,
    /// whichever comes first, and with `AuthDenied` if the user declines.
    pub async fn complete_device_code_flow(
        &self,
        handle: &DeviceCodeHandle,
        timeout: Duration,
    ) -> GraphResult<CredentialRecord> {
        let deadline = Instant::now() + timeout.min(handle.remaining());
        let mut interval = handle.interval.max(Duration::from_secs(1));

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(GraphError::auth_timeout(
                    "sign-in was not completed in time",
                ));
            }
            tokio::time::sleep(interval.min(deadline - now)).await;

            match self.oauth.poll_device_code(handle).await {
                Ok(grant) => {
                    let record = self.record_from_grant(grant, None, None);
                    self.store.save(&record)?;
                    info!(account = ?record.account, "signed in");
                    return Ok(record);
                }
                Err(e) => match e.code() {
                    Some("authorization_pending") => {}
                    Some("slow_down") => {
                        interval += SLOW_DOWN_STEP;
                        debug!(interval_secs = interval.as_secs(), "asked to slow down polling");
                    }
                    Some("access_denied" | "authorization_declined") => {
                        return Err(GraphError::auth_denied("sign-in was declined")
                            .with_code(e.code().unwrap_or_default()));
                    }
                    Some("expired_token" | "code_expired" | "bad_verification_code") => {
                        return Err(GraphError::auth_timeout("the sign-in code expired")
                            .with_code(e.code().unwrap_or_default()));
                    }
                    _ if e.is_temporary() => {
                        warn!(error = %e, "polling for sign-in failed, will poll again");
                    }
                    _ => return Err(self.endpoint_error(e, "sign-in failed")),
                },
            }
        }
    }

    /// Removes the cached credential. Returns whether one existed.
    pub fn sign_out(&self) -> GraphResult<bool> {
        let removed = self.store.clear()?;
        if removed {
            info!("signed out");
        }
        Ok(removed)
    }

    /// Reports the sign-in state without network I/O or store changes.
    pub fn status(&self) -> GraphResult<AuthStatus> {
        let record = match self.store.load() {
            Ok(Some(record)) if record.matches(&self.authority, &self.scopes) => record,
            Ok(_) => return Ok(AuthStatus::Unauthenticated),
            Err(e) if e.kind() == ErrorKind::CorruptStore => {
                warn!(error = %e, "credential record is corrupt");
                return Ok(AuthStatus::Unauthenticated);
            }
            Err(e) => return Err(e),
        };

        Ok(if record.is_valid(self.refresh_headroom) {
            AuthStatus::Valid {
                account: record.account,
                expires_at: record.expires_at,
            }
        } else if record.refresh_token.is_some() {
            AuthStatus::Stale {
                account: record.account,
            }
        } else {
            AuthStatus::Unauthenticated
        })
    }

    /// Loads the record if it belongs to this configuration.
    ///
    /// A corrupt file is cleared and treated as absent.
    fn current_record(&self) -> GraphResult<Option<CredentialRecord>> {
        match self.store.load() {
            Ok(Some(record)) if record.matches(&self.authority, &self.scopes) => Ok(Some(record)),
            Ok(Some(record)) => {
                debug!(
                    stored_authority = %record.authority,
                    "cached credential belongs to another authority or scope set, ignoring"
                );
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(e) if e.kind() == ErrorKind::CorruptStore => {
                warn!(error = %e, "discarding corrupt credential record");
                self.store.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, record: CredentialRecord) -> GraphResult<CredentialRecord> {
        let Some(refresh_token) = record.refresh_token.clone() else {
            self.store.clear()?;
            return Err(self.sign_in_required("session expired").await);
        };

        match self.oauth.refresh(&refresh_token).await {
            Ok(grant) => {
                let updated = self.record_from_grant(grant, Some(refresh_token), record.account);
                self.store.save(&updated)?;
                info!(expires_at = %updated.expires_at, "access token refreshed");
                Ok(updated)
            }
            Err(e) if e.requires_sign_in() => {
                warn!(error = %e, "refresh token no longer accepted, clearing credentials");
                self.store.clear()?;
                Err(self.sign_in_required("session expired or revoked").await)
            }
            Err(e) if e.is_temporary() => Err(GraphError::auth(
                AuthErrorReason::RefreshUnavailable,
                format!("token refresh failed, try again later: {}", e),
            )
            .with_source(e)),
            Err(e) => {
                let mut err = GraphError::auth(
                    AuthErrorReason::RefreshFailed,
                    format!("token refresh refused: {}", e),
                );
                if let OAuthError::Rejected { status, .. } = &e {
                    err = err.with_status(*status);
                }
                if let Some(code) = e.code() {
                    err = err.with_code(code);
                }
                Err(err.with_source(e))
            }
        }
    }

    fn record_from_grant(
        &self,
        grant: TokenGrant,
        previous_refresh_token: Option<String>,
        previous_account: Option<String>,
    ) -> CredentialRecord {
        let account = grant.account().or(previous_account);
        let expires_in = grant.expires_in.min(MAX_TOKEN_LIFETIME_SECS) as i64;
        CredentialRecord {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh_token),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
            account,
            authority: self.authority.clone(),
            scopes: self.scopes.clone(),
        }
    }

    /// Builds the `AuthRequired` error, attaching a freshly started sign-in.
    async fn sign_in_required(&self, message: &str) -> GraphError {
        let err = GraphError::auth_required(message);
        match self.begin_device_code_flow().await {
            Ok(handle) => err.with_sign_in(handle),
            Err(e) => {
                warn!(error = %e, "could not start device-code sign-in");
                err
            }
        }
    }

    fn endpoint_error(&self, e: OAuthError, context: &str) -> GraphError {
        match e {
            OAuthError::Transport(t) => {
                GraphError::transient(format!("{}: {}", context, t)).with_source(t)
            }
            OAuthError::Rejected {
                status,
                ref error,
                ref description,
            } => GraphError::from_status(
                status,
                &self.retryable_statuses,
                format!("{}: {}", context, description),
            )
            .with_code(error.clone()),
            OAuthError::InvalidResponse(ref msg) => {
                GraphError::invalid_response(format!("{}: {}", context, msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::http::TransportError;
    use crate::test_support::{
        DEVICE_CODE_PATH, ScriptedBackend, TOKEN_PATH, device_code_response, oauth_error,
        test_config, token_response,
    };

    struct Fixture {
        _dir: TempDir,
        config: GraphConfig,
        backend: ScriptedBackend,
        auth: Authenticator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path().join("token_cache.json"));
        let backend = ScriptedBackend::new();
        let auth = Authenticator::new(&config, Arc::new(backend.clone()));
        Fixture {
            _dir: dir,
            config,
            backend,
            auth,
        }
    }

    fn seed(f: &Fixture, access: &str, refresh: Option<&str>, expires_in: chrono::Duration) {
        f.auth
            .store()
            .save(&CredentialRecord {
                access_token: access.to_string(),
                refresh_token: refresh.map(String::from),
                expires_at: Utc::now() + expires_in,
                account: Some("ada@contoso.com".to_string()),
                authority: f.config.authority(),
                scopes: f.config.scopes.clone(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn cached_token_needs_no_network() {
        let f = fixture();
        seed(&f, "cached", Some("rt"), chrono::Duration::minutes(10));

        assert_eq!(f.auth.get_valid_token().await.unwrap(), "cached");
        assert_eq!(f.auth.get_valid_token().await.unwrap(), "cached");
        assert_eq!(f.backend.total(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_and_persisted() {
        let f = fixture();
        seed(&f, "old", Some("rt-1"), chrono::Duration::minutes(-5));
        f.backend
            .on_json(TOKEN_PATH, 200, token_response("fresh", Some("rt-2"), 3600));

        assert_eq!(f.auth.get_valid_token().await.unwrap(), "fresh");
        assert_eq!(f.auth.get_valid_token().await.unwrap(), "fresh");
        assert_eq!(f.backend.count(TOKEN_PATH), 1);

        let stored = f.auth.store().load().unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token.as_deref(), Some("rt-2"));
        assert_eq!(stored.account.as_deref(), Some("ada@contoso.com"));
    }

    #[tokio::test]
    async fn simultaneous_refreshes_leave_a_loadable_store() {
        let f = fixture();
        seed(&f, "old", Some("rt-1"), chrono::Duration::minutes(-5));
        f.backend
            .on_json(TOKEN_PATH, 200, token_response("fresh-a", Some("rt-2"), 3600))
            .on_json(TOKEN_PATH, 200, token_response("fresh-b", Some("rt-3"), 3600));

        let (a, b) = tokio::join!(f.auth.get_valid_token(), f.auth.get_valid_token());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(["fresh-a", "fresh-b"].contains(&a.as_str()));
        assert!(["fresh-a", "fresh-b"].contains(&b.as_str()));
        assert!((1..=2).contains(&f.backend.count(TOKEN_PATH)));

        let stored = f.auth.store().load().unwrap().unwrap();
        assert!(["fresh-a", "fresh-b"].contains(&stored.access_token.as_str()));
        assert!(matches!(stored.refresh_token.as_deref(), Some("rt-2" | "rt-3")));

        assert_eq!(f.auth.get_valid_token().await.unwrap(), stored.access_token);
    }

    #[tokio::test]
    async fn token_inside_headroom_is_refreshed() {
        let f = fixture();
        seed(&f, "old", Some("rt"), chrono::Duration::seconds(30));
        f.backend
            .on_json(TOKEN_PATH, 200, token_response("fresh", None, 3600));

        assert_eq!(f.auth.get_valid_token().await.unwrap(), "fresh");
        let stored = f.auth.store().load().unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn revoked_refresh_token_clears_store() {
        let f = fixture();
        seed(&f, "old", Some("revoked"), chrono::Duration::minutes(-5));
        f.backend
            .on_json(TOKEN_PATH, 400, oauth_error("invalid_grant"))
            .on_json(DEVICE_CODE_PATH, 200, device_code_response())
            .on_json(DEVICE_CODE_PATH, 200, device_code_response());

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert!(f.auth.store().load().unwrap().is_none());

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert_eq!(f.backend.count(TOKEN_PATH), 1);
    }

    #[tokio::test]
    async fn transient_refresh_failure_keeps_store() {
        let f = fixture();
        seed(&f, "old", Some("rt"), chrono::Duration::minutes(-5));
        f.backend
            .on_failure(TOKEN_PATH, TransportError::Connect("refused".into()));

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(err.auth_reason(), Some(AuthErrorReason::RefreshUnavailable));
        assert!(f.auth.store().load().unwrap().is_some());
    }

    #[tokio::test]
    async fn refused_refresh_is_refresh_failed() {
        let f = fixture();
        seed(&f, "old", Some("rt"), chrono::Duration::minutes(-5));
        f.backend
            .on_json(TOKEN_PATH, 401, oauth_error("invalid_client"));

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthErrorReason::RefreshFailed));
        assert_eq!(err.code(), Some("invalid_client"));
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn fresh_install_requires_sign_in_with_url() {
        let f = fixture();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response());

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        let handle = err.sign_in().unwrap();
        assert!(!handle.verification_uri.is_empty());
        assert_eq!(handle.user_code, "ABCD-EFGH");
        assert_eq!(f.backend.count(TOKEN_PATH), 0);
    }

    #[tokio::test]
    async fn sign_in_required_even_if_flow_cannot_start() {
        let f = fixture();
        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert!(err.sign_in().is_none());
    }

    #[tokio::test]
    async fn corrupt_store_is_treated_as_absent() {
        let f = fixture();
        std::fs::write(f.auth.store().path(), "not json").unwrap();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response());

        assert_eq!(f.auth.status().unwrap(), AuthStatus::Unauthenticated);
        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert!(!f.auth.store().path().exists());
    }

    #[tokio::test]
    async fn record_for_other_authority_is_ignored() {
        let f = fixture();
        f.auth
            .store()
            .save(&CredentialRecord {
                access_token: "elsewhere".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + chrono::Duration::hours(1),
                account: None,
                authority: "https://login.example.test/consumers".to_string(),
                scopes: f.config.scopes.clone(),
            })
            .unwrap();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response());

        let err = f.auth.get_valid_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
    }

    #[tokio::test(start_paused = true)]
    async fn device_flow_polls_until_granted() {
        let f = fixture();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response())
            .on_json(TOKEN_PATH, 400, oauth_error("authorization_pending"))
            .on_json(TOKEN_PATH, 400, oauth_error("slow_down"))
            .on_json(TOKEN_PATH, 200, token_response("signed-in", Some("rt"), 3600));

        let handle = f.auth.begin_device_code_flow().await.unwrap();
        let start = Instant::now();
        let record = f
            .auth
            .complete_device_code_flow(&handle, Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(record.access_token, "signed-in");
        assert_eq!(f.backend.count(TOKEN_PATH), 3);
        // 5s, 5s, then 10s after slow_down.
        let polls: Vec<_> = f
            .backend
            .requests()
            .into_iter()
            .filter(|r| r.request.url.as_str().contains(TOKEN_PATH))
            .map(|r| r.at - start)
            .collect();
        assert_eq!(polls[0], Duration::from_secs(5));
        assert_eq!(polls[1], Duration::from_secs(10));
        assert_eq!(polls[2], Duration::from_secs(20));

        assert_eq!(f.auth.get_valid_token().await.unwrap(), "signed-in");
    }

    #[tokio::test(start_paused = true)]
    async fn device_flow_denied() {
        let f = fixture();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response())
            .on_json(TOKEN_PATH, 400, oauth_error("access_denied"));

        let handle = f.auth.begin_device_code_flow().await.unwrap();
        let err = f
            .auth
            .complete_device_code_flow(&handle, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthDenied);
        assert!(f.auth.store().load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn device_flow_times_out() {
        let f = fixture();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response());
        for _ in 0..10 {
            f.backend
                .on_json(TOKEN_PATH, 400, oauth_error("authorization_pending"));
        }

        let handle = f.auth.begin_device_code_flow().await.unwrap();
        let err = f
            .auth
            .complete_device_code_flow(&handle, Duration::from_secs(12))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthTimeout);
        // Polls at 5s, 10s and the deadline.
        assert_eq!(f.backend.count(TOKEN_PATH), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn device_flow_survives_transient_poll_failure() {
        let f = fixture();
        f.backend
            .on_json(DEVICE_CODE_PATH, 200, device_code_response())
            .on_failure(TOKEN_PATH, TransportError::Timeout("slow".into()))
            .on_json(TOKEN_PATH, 200, token_response("ok", Some("rt"), 3600));

        let handle = f.auth.begin_device_code_flow().await.unwrap();
        let record = f
            .auth
            .complete_device_code_flow(&handle, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(record.access_token, "ok");
    }

    #[tokio::test]
    async fn status_and_sign_out() {
        let f = fixture();
        assert_eq!(f.auth.status().unwrap(), AuthStatus::Unauthenticated);

        seed(&f, "a", Some("rt"), chrono::Duration::minutes(-1));
        assert_eq!(
            f.auth.status().unwrap(),
            AuthStatus::Stale {
                account: Some("ada@contoso.com".to_string())
            }
        );

        seed(&f, "a", Some("rt"), chrono::Duration::minutes(30));
        assert!(matches!(f.auth.status().unwrap(), AuthStatus::Valid { .. }));

        assert!(f.auth.sign_out().unwrap());
        assert!(!f.auth.sign_out().unwrap());
        assert_eq!(f.auth.status().unwrap(), AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn force_refresh_ignores_local_expiry() {
        let f = fixture();
        seed(&f, "looks-valid", Some("rt"), chrono::Duration::hours(1));
        f.backend.on_json(
            TOKEN_PATH,
            200,
            json!({"access_token": "forced", "expires_in": 3600}),
        );

        assert_eq!(f.auth.force_refresh().await.unwrap(), "forced");
        assert_eq!(f.backend.count(TOKEN_PATH), 1);
    }
}
