//! Bearer credentials for the storage APIs
//!
//! Acquiring and refreshing OAuth tokens happens outside this crate. The
//! pipeline only asks a [`CredentialProvider`] for a token at the moment it
//! needs one, so a provider that refreshes on expiry is invisible to the
//! fetcher and uploader.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Environment variable holding the Drive access token
pub const DRIVE_TOKEN_ENV_VAR: &str = "GOOGLE_DRIVE_ACCESS_TOKEN";

/// Environment variable holding the Cloud Storage access token
pub const STORAGE_TOKEN_ENV_VAR: &str = "GOOGLE_STORAGE_ACCESS_TOKEN";

/// Which API a credential is requested for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialScope {
    /// Drive file creation (resumable uploads)
    Drive,
    /// Cloud Storage object reads
    Storage,
}

impl std::fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialScope::Drive => write!(f, "drive"),
            CredentialScope::Storage => write!(f, "storage"),
        }
    }
}

/// Source of bearer tokens
///
/// Implementations must be safe to share between concurrent pipeline runs.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid bearer token for `scope`
    async fn bearer_token(&self, scope: CredentialScope) -> Result<String>;
}

/// Fixed tokens, typically read from the environment
#[derive(Clone, Default)]
pub struct StaticCredentials {
    drive: Option<String>,
    storage: Option<String>,
}

impl StaticCredentials {
    /// Create a provider from explicit tokens
    pub fn new(drive: Option<String>, storage: Option<String>) -> Self {
        Self {
            drive: drive.filter(|t| !t.trim().is_empty()),
            storage: storage.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Read tokens from [`DRIVE_TOKEN_ENV_VAR`] and [`STORAGE_TOKEN_ENV_VAR`]
    ///
    /// Missing variables are not an error here; the failure surfaces when the
    /// pipeline actually needs that token.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(DRIVE_TOKEN_ENV_VAR).ok(),
            std::env::var(STORAGE_TOKEN_ENV_VAR).ok(),
        )
    }
}

// Tokens never appear in debug output
impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("drive", &self.drive.as_ref().map(|_| "<redacted>"))
            .field("storage", &self.storage.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self, scope: CredentialScope) -> Result<String> {
        let (token, var) = match scope {
            CredentialScope::Drive => (&self.drive, DRIVE_TOKEN_ENV_VAR),
            CredentialScope::Storage => (&self.storage, STORAGE_TOKEN_ENV_VAR),
        };
        token
            .clone()
            .ok_or_else(|| Error::Credential(format!("no {scope} token available (set {var})")))
    }
}
