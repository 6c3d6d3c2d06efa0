//! Persistent credential storage.
//!
//! A single JSON record on disk holds the access token, the refresh token and
//! enough metadata to decide whether the record still belongs to the current
//! configuration. Each write goes to its own sibling temp file which is then
//! renamed over the target, so a crash never leaves a half-written record behind.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use officecal_core::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use tempfile::{NamedTempFile, PersistError};
use tracing::{debug, info};

/// A cached credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer token for API requests.
    pub access_token: String,

    /// Token used to obtain a new access token without user interaction.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,

    /// Signed-in account (user principal name or email), if known.
    #[serde(default)]
    pub account: Option<String>,

    /// Authority the tokens were issued by.
    pub authority: String,

    /// Delegated permissions the tokens were requested for.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CredentialRecord {
    /// Returns true if the access token is usable for at least `headroom`.
    pub fn is_valid(&self, headroom: Duration) -> bool {
        let headroom = chrono::Duration::from_std(headroom).unwrap_or(chrono::Duration::zero());
        Utc::now() + headroom < self.expires_at
    }

    /// Returns true if the record was issued for `authority` and covers `scopes`.
    pub fn matches(&self, authority: &str, scopes: &[String]) -> bool {
        self.authority.eq_ignore_ascii_case(authority)
            && scopes.iter().all(|scope| self.scopes.contains(scope))
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("account", &self.account)
            .field("authority", &self.authority)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store at the given path. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the record path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record.
    ///
    /// Returns `Ok(None)` if nothing is stored, and a `CorruptStore` error if
    /// the file exists but cannot be decoded.
    pub fn load(&self) -> GraphResult<Option<CredentialRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no credential record");
                return Ok(None);
            }
            Err(e) => {
                return Err(
                    GraphError::storage(format!("failed to read {}: {}", self.path.display(), e))
                        .with_source(e),
                );
            }
        };

        let record: CredentialRecord = serde_json::from_str(&content).map_err(|e| {
            GraphError::corrupt_store(format!(
                "credential record {} is unreadable: {}",
                self.path.display(),
                e
            ))
            .with_source(e)
        })?;

        debug!(path = ?self.path, account = ?record.account, "loaded credential record");
        Ok(Some(record))
    }

    /// Writes the record atomically, readable by the owner only.
    ///
    /// Every call writes its own temp file next to the target and renames it
    /// into place, so concurrent saves never interleave and readers see
    /// either the old record or the new one.
    pub fn save(&self, record: &CredentialRecord) -> GraphResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| {
            GraphError::storage(format!(
                "failed to create credential directory {}: {}",
                dir.display(),
                e
            ))
            .with_source(e)
        })?;

        let content = serde_json::to_vec_pretty(record).map_err(|e| {
            GraphError::storage(format!("failed to serialize credential record: {}", e))
                .with_source(e)
        })?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
            GraphError::storage(format!(
                "failed to create temp file in {}: {}",
                dir.display(),
                e
            ))
            .with_source(e)
        })?;

        if let Err(e) = write_private(&mut temp, &content) {
            let err = GraphError::storage(format!(
                "failed to write {}: {}",
                temp.path().display(),
                e
            ))
            .with_source(e);
            discard(temp);
            return Err(err);
        }

        if let Err(PersistError { error, file }) = temp.persist(&self.path) {
            discard(file);
            return Err(GraphError::storage(format!(
                "failed to replace {}: {}",
                self.path.display(),
                error
            ))
            .with_source(error));
        }

        debug!(path = ?self.path, "saved credential record");
        Ok(())
    }

    /// Deletes the record. Returns whether anything was removed.
    pub fn clear(&self) -> GraphResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = ?self.path, "cleared credential record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GraphError::storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))
            .with_source(e)),
        }
    }
}

fn write_private(temp: &mut NamedTempFile, content: &[u8]) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    temp.write_all(content)?;
    temp.as_file().sync_all()
}

/// Removes an unused temp file, logging if that fails.
fn discard(temp: NamedTempFile) {
    let path = temp.path().to_path_buf();
    if let Err(e) = temp.close() {
        debug!(path = ?path, error = %e, "failed to remove temp credential file");
    }
}
