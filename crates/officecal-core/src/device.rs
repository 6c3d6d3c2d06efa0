//! Device-code sign-in handle.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A started device-authorization grant.
///
/// The user-facing half (`user_code`, `verification_uri`, `message`) is meant
/// to be shown; `device_code` is the polling secret and is redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceCodeHandle {
    /// Short code the user types on the verification page.
    pub user_code: String,
    /// Page where the user completes sign-in.
    pub verification_uri: String,
    /// Ready-to-display instruction from the authorization server.
    pub message: String,
    /// Opaque code used to poll the token endpoint.
    pub device_code: String,
    /// Minimum wait between polls.
    pub interval: Duration,
    /// When the user code stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl DeviceCodeHandle {
    /// Returns true if the code can no longer be redeemed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns the time left before the code expires (zero if already expired).
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for DeviceCodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeHandle")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("device_code", &"<redacted>")
            .field("interval", &self.interval)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
