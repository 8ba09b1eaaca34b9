//! Secret-store seam: a non-revealing existence probe plus a reveal
//! operation, keyed by (host key, user, kind).
//!
//! Callers depend on the trait, not the concrete backend, so the decision
//! engine and the app can be tested against an in-memory fake.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret store backend: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    Passphrase,
    Otp,
}

/// Identifies a secret without holding its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub host_key: String,
    pub user: String,
    pub kind: SecretKind,
}

impl CredentialRef {
    pub fn password(host_key: &str, user: &str) -> Self {
        Self {
            host_key: host_key.to_string(),
            user: user.to_string(),
            kind: SecretKind::Password,
        }
    }

    /// Stable account name used by keyring-style backends.
    pub fn account(&self) -> String {
        match self.kind {
            SecretKind::Password => format!("{}@{}", self.user, self.host_key),
            SecretKind::Passphrase => format!("{}@{}#passphrase", self.user, self.host_key),
            SecretKind::Otp => format!("{}@{}#otp", self.user, self.host_key),
        }
    }
}

pub trait SecretStore: Send + Sync {
    /// Existence check that never hands the value to the caller.
    fn probe(&self, cred: &CredentialRef) -> Result<bool, SecretError>;

    /// Plaintext secret bytes, or `None` when absent. The caller must not
    /// keep the value past a single use.
    fn reveal(&self, cred: &CredentialRef) -> Result<Option<Vec<u8>>, SecretError>;
}

/// OS-backed store (macOS Keychain, freedesktop secret service, Windows
/// Credential Manager) through the keyring crate.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, cred: &CredentialRef) -> Result<keyring::Entry, SecretError> {
        keyring::Entry::new(&self.service, &cred.account())
            .map_err(|e| SecretError::Backend(e.to_string()))
    }
}

impl SecretStore for KeyringStore {
    fn probe(&self, cred: &CredentialRef) -> Result<bool, SecretError> {
        // keyring has no lookup that skips the value; fetch and discard
        // without exposing it.
        match self.entry(cred)?.get_secret() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(SecretError::Backend(e.to_string())),
        }
    }

    fn reveal(&self, cred: &CredentialRef) -> Result<Option<Vec<u8>>, SecretError> {
        match self.entry(cred)?.get_secret() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecretError::Backend(e.to_string())),
        }
    }
}
