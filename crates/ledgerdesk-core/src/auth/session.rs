use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::i18n::Language;
use crate::models::UserIdentity;
use crate::storage::SessionStorage;

/// Storage key for the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key for the serialized signed-in identity
pub const USER_KEY: &str = "user";

/// Storage key for the UI locale preference
pub const LANGUAGE_KEY: &str = "language";

/// Session state kept in shared storage.
/// Clone is cheap - the storage handle is shared.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Get the bearer token, if one is stored
    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Get the signed-in identity. Unparseable records count as absent.
    pub fn user(&self) -> Option<UserIdentity> {
        let raw = self.storage.get(USER_KEY)?;
        let identity = UserIdentity::from_stored(&raw);
        if identity.is_none() {
            warn!("Stored user record is not a JSON object");
        }
        identity
    }

    /// A session needs both a token and an identity
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some() && self.user().is_some()
    }

    /// Record a fresh login. The token is written first.
    pub fn establish(&self, token: &str, user: &UserIdentity) -> Result<()> {
        let record = serde_json::to_string(user).context("Failed to serialize user record")?;
        self.storage
            .set(TOKEN_KEY, token)
            .context("Failed to store token")?;
        self.storage
            .set(USER_KEY, &record)
            .context("Failed to store user record")?;
        debug!(email = %user.email, "Session established");
        Ok(())
    }

    /// Remove token then identity.
    ///
    /// Both removals are always attempted so a failure on the first
    /// never leaves the identity behind.
    pub fn terminate(&self) -> Result<()> {
        let token_result = self.storage.remove(TOKEN_KEY);
        let user_result = self.storage.remove(USER_KEY);
        token_result.context("Failed to remove token")?;
        user_result.context("Failed to remove user record")?;
        debug!("Session storage cleared");
        Ok(())
    }

    pub fn language(&self) -> Language {
        self.storage
            .get(LANGUAGE_KEY)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        self.storage
            .set(LANGUAGE_KEY, language.code())
            .context("Failed to store language")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStorage::new().tab()))
    }

    fn identity() -> UserIdentity {
        UserIdentity {
            user_id: Some("u-1".into()),
            email: "staff@example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_establish_and_terminate() {
        let session = store();
        assert!(!session.is_authenticated());

        session.establish("abc.def.ghi", &identity()).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("abc.def.ghi"));
        assert_eq!(session.user().unwrap().email, "staff@example.com");

        session.terminate().unwrap();
        assert!(session.token().is_none());
        assert!(session.user().is_none());

        // Second terminate is a no-op
        session.terminate().unwrap();
    }

    #[test]
    fn test_token_without_user_is_not_authenticated() {
        let session = store();
        session.storage().set(TOKEN_KEY, "abc").unwrap();
        assert!(!session.is_authenticated());

        session.storage().set(USER_KEY, "garbage").unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_terminate_keeps_language() {
        let session = store();
        session.set_language(Language::En).unwrap();
        session.establish("t", &identity()).unwrap();
        session.terminate().unwrap();
        assert_eq!(session.language(), Language::En);
    }

    #[test]
    fn test_unknown_language_falls_back_to_default() {
        let session = store();
        session.storage().set(LANGUAGE_KEY, "fr").unwrap();
        assert_eq!(session.language(), Language::Tr);
    }
}
