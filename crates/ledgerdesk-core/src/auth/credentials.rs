//! "Remember me" for the login prompt, backed by the OS keychain.

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "ledgerdesk";

/// Passwords saved per email address
pub struct CredentialStore;

impl CredentialStore {
    fn entry(email: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, email.trim()).context("Failed to open keychain entry")
    }

    pub fn remember(email: &str, password: &str) -> Result<()> {
        Self::entry(email)?
            .set_password(password)
            .context("Failed to save password to keychain")
    }

    /// Saved password for this email, if any
    pub fn recall(email: &str) -> Result<Option<String>> {
        match Self::entry(email)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read password from keychain"),
        }
    }

    /// Drop the saved password. Forgetting an unknown email is fine.
    pub fn forget(email: &str) -> Result<()> {
        match Self::entry(email)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }
}
