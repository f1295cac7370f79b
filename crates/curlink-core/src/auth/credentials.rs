use keyring::Entry;

use super::session::{Session, SessionStore, StoreError};

const SERVICE_NAME: &str = "curlink";

/// Keychain account under which the serialized session is kept
const SESSION_KEY: &str = "session";

/// Session persisted in the OS keychain.
pub struct KeyringSessionStore {
    service: String,
}

impl KeyringSessionStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, SESSION_KEY)?)
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for KeyringSessionStore {
    fn load(&self) -> Result<Option<Session>, StoreError> {
        match self.entry()?.get_password() {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        let contents = serde_json::to_string(session)?;
        self.entry()?.set_password(&contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
