//! Normalized error taxonomy.
//!
//! Every failure that leaves the Graph boundary layer is a [`GraphError`]:
//! remote error envelopes, transport failures, credential-store problems and
//! authentication outcomes all end up in this one shape, so callers can branch
//! on [`GraphError::kind`] or [`GraphError::classification`] without looking at
//! HTTP details.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceCodeHandle;

/// The kind of a normalized error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No usable credential; the caller must drive an interactive sign-in.
    AuthRequired,
    /// A credential exists but using or refreshing it failed.
    ///
    /// See [`AuthErrorReason`] for whether re-interaction is warranted.
    AuthError,
    /// The interactive sign-in did not complete in time or the code expired.
    AuthTimeout,
    /// The user (or the directory) declined the interactive sign-in.
    AuthDenied,
    /// Retryable network or remote condition, still failing after retries.
    Transient,
    /// The remote refused access to the resource (403).
    PermissionDenied,
    /// The resource does not exist (404).
    NotFound,
    /// Any other permanent refusal by the remote.
    RemoteRejected,
    /// A paginated listing advertised more pages than the configured cap.
    PaginationLimitExceeded,
    /// The credential file exists but cannot be parsed.
    CorruptStore,
    /// The credential file could not be read, written or removed.
    Storage,
    /// A successful response could not be decoded, or pointed somewhere unexpected.
    InvalidResponse,
    /// The client was set up with unusable settings.
    Configuration,
}

impl ErrorKind {
    /// Maps an HTTP status code to an error kind.
    ///
    /// `retryable` is the set of statuses treated as transient; anything else
    /// outside the explicitly named codes is a permanent rejection.
    pub fn from_status(status: u16, retryable: &[u16]) -> Self {
        match status {
            401 => Self::AuthError,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            s if retryable.contains(&s) => Self::Transient,
            _ => Self::RemoteRejected,
        }
    }

    /// Returns the coarse classification callers usually branch on.
    pub fn classification(&self) -> Classification {
        match self {
            Self::AuthRequired | Self::AuthTimeout | Self::AuthDenied => {
                Classification::AuthRequired
            }
            Self::AuthError => Classification::AuthError,
            Self::Transient => Classification::Transient,
            Self::PermissionDenied
            | Self::NotFound
            | Self::RemoteRejected
            | Self::PaginationLimitExceeded
            | Self::CorruptStore
            | Self::Storage
            | Self::InvalidResponse
            | Self::Configuration => Classification::Permanent,
        }
    }

    /// Returns true if an unchanged retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        self.classification() == Classification::Transient
    }

    /// Returns a stable machine-readable name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::AuthError => "auth_error",
            Self::AuthTimeout => "auth_timeout",
            Self::AuthDenied => "auth_denied",
            Self::Transient => "transient",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RemoteRejected => "remote_rejected",
            Self::PaginationLimitExceeded => "pagination_limit_exceeded",
            Self::CorruptStore => "corrupt_store",
            Self::Storage => "storage",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a normalized error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Retrying later, unchanged, may succeed.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// The user has to sign in (again).
    AuthRequired,
    /// Token use failed; see the [`AuthErrorReason`].
    AuthError,
}

/// Why an [`ErrorKind::AuthError`] happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorReason {
    /// The remote API rejected the bearer token (401).
    TokenRejected,
    /// The token endpoint could not be reached or was temporarily failing.
    RefreshUnavailable,
    /// The token endpoint refused the refresh for a non-interactive reason.
    RefreshFailed,
}

impl AuthErrorReason {
    /// Returns a stable machine-readable name for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenRejected => "token_rejected",
            Self::RefreshUnavailable => "refresh_unavailable",
            Self::RefreshFailed => "refresh_failed",
        }
    }
}

/// A failure surfaced by the remote API, the transport, or local credential handling.
#[derive(Debug, Error)]
pub struct GraphError {
    kind: ErrorKind,
    status: Option<u16>,
    code: Option<String>,
    message: String,
    request_id: Option<String>,
    retry_after: Option<Duration>,
    auth_reason: Option<AuthErrorReason>,
    sign_in: Option<Box<DeviceCodeHandle>>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GraphError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            request_id: None,
            retry_after: None,
            auth_reason: None,
            sign_in: None,
            source: None,
        }
    }

    /// Creates an error for an HTTP status, classified with `retryable`.
    pub fn from_status(status: u16, retryable: &[u16], message: impl Into<String>) -> Self {
        let kind = ErrorKind::from_status(status, retryable);
        let mut err = Self::new(kind, message).with_status(status);
        if kind == ErrorKind::AuthError {
            err.auth_reason = Some(AuthErrorReason::TokenRejected);
        }
        err
    }

    /// Creates a sign-in-required error.
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthRequired, message)
    }

    /// Creates an authentication error with a reason.
    pub fn auth(reason: AuthErrorReason, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::AuthError, message);
        err.auth_reason = Some(reason);
        err
    }

    /// Creates an interactive-sign-in timeout error.
    pub fn auth_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthTimeout, message)
    }

    /// Creates an interactive-sign-in denied error.
    pub fn auth_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthDenied, message)
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Creates a pagination cap error.
    pub fn pagination_limit(max_pages: usize) -> Self {
        Self::new(
            ErrorKind::PaginationLimitExceeded,
            format!("more than {} pages advertised by the remote", max_pages),
        )
    }

    /// Creates a corrupt credential store error.
    pub fn corrupt_store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptStore, message)
    }

    /// Creates a credential storage I/O error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the remote error code (e.g. `ErrorItemNotFound`).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the remote correlation identifier.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the remote-supplied retry hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attaches a pending device-code sign-in the caller can present.
    pub fn with_sign_in(mut self, handle: DeviceCodeHandle) -> Self {
        self.sign_in = Some(Box::new(handle));
        self
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the coarse classification.
    pub fn classification(&self) -> Classification {
        self.kind.classification()
    }

    /// Returns true if this error is transient.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns the HTTP status, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the remote error code, if present.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the remote correlation identifier, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns the remote-supplied retry hint, if present.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns the reason for an [`ErrorKind::AuthError`].
    pub fn auth_reason(&self) -> Option<AuthErrorReason> {
        self.auth_reason
    }

    /// Returns the pending device-code sign-in, if one was started.
    pub fn sign_in(&self) -> Option<&DeviceCodeHandle> {
        self.sign_in.as_deref()
    }

    /// Takes the pending device-code sign-in out of the error.
    pub fn take_sign_in(&mut self) -> Option<DeviceCodeHandle> {
        self.sign_in.take().map(|handle| *handle)
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " ({})", status)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(ref request_id) = self.request_id {
            write!(f, " (request-id {})", request_id)?;
        }
        Ok(())
    }
}

/// A specialized Result type for Graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    const RETRYABLE: &[u16] = &[429, 503, 504];

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorKind::from_status(401, RETRYABLE), ErrorKind::AuthError);
        assert_eq!(
            ErrorKind::from_status(403, RETRYABLE),
            ErrorKind::PermissionDenied
        );
        assert_eq!(ErrorKind::from_status(404, RETRYABLE), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(429, RETRYABLE), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(503, RETRYABLE), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(504, RETRYABLE), ErrorKind::Transient);
        assert_eq!(
            ErrorKind::from_status(400, RETRYABLE),
            ErrorKind::RemoteRejected
        );
        assert_eq!(
            ErrorKind::from_status(410, RETRYABLE),
            ErrorKind::RemoteRejected
        );
        assert_eq!(
            ErrorKind::from_status(500, RETRYABLE),
            ErrorKind::RemoteRejected
        );
        assert_eq!(
            ErrorKind::from_status(502, RETRYABLE),
            ErrorKind::RemoteRejected
        );
    }

    #[test]
    fn retryable_set_is_configurable() {
        assert_eq!(ErrorKind::from_status(502, &[502]), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(429, &[]), ErrorKind::RemoteRejected);
    }

    #[test]
    fn classification() {
        assert_eq!(
            ErrorKind::AuthTimeout.classification(),
            Classification::AuthRequired
        );
        assert_eq!(
            ErrorKind::AuthDenied.classification(),
            Classification::AuthRequired
        );
        assert_eq!(
            ErrorKind::AuthError.classification(),
            Classification::AuthError
        );
        assert_eq!(
            ErrorKind::Transient.classification(),
            Classification::Transient
        );
        assert_eq!(
            ErrorKind::CorruptStore.classification(),
            Classification::Permanent
        );
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::AuthError.is_retryable());
    }

    #[test]
    fn unauthorized_status_carries_reason() {
        let err = GraphError::from_status(401, RETRYABLE, "token rejected");
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(err.auth_reason(), Some(AuthErrorReason::TokenRejected));
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn display_includes_remote_details() {
        let err = GraphError::from_status(404, RETRYABLE, "The specified object was not found.")
            .with_code("ErrorItemNotFound")
            .with_request_id("abc-123");
        insta::assert_snapshot!(
            err.to_string(),
            @"not_found (404) [ErrorItemNotFound]: The specified object was not found. (request-id abc-123)"
        );
    }

    #[test]
    fn display_without_status() {
        let err = GraphError::transient("request timed out");
        insta::assert_snapshot!(err.to_string(), @"transient: request timed out");
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = GraphError::storage("failed to write credentials").with_source(io_err);
        assert!(err.source().is_some());
    }
}
