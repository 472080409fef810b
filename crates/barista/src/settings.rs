//! Cached access to the `settings` table.
//!
//! Values are cached (including "not set") for a configurable TTL and
//! invalidated explicitly on every write through [`SettingsStore::set`].
//! Rows flagged `is_encrypted` are decrypted on load, so the cache only
//! ever holds plaintext.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::db::{settings_repo, Database, DatabaseError};
use crate::secrets::{SecretError, TokenEncryptor};

/// Display name used in acknowledgments.
pub const SITE_NAME: &str = "site_name";
/// `"true"` turns on per-step pass diagnostics.
pub const ENABLE_DEBUG_LOGGING: &str = "enable_debug_logging";
/// Poll interval override in minutes.
pub const EMAIL_CHECK_INTERVAL: &str = "email_check_interval";

const CACHE_CAPACITY: u64 = 1_024;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Setting '{key}' could not be decrypted: {source}")]
    Decrypt {
        key: String,
        #[source]
        source: SecretError,
    },

    #[error("Setting '{key}' could not be encrypted: {source}")]
    Encrypt {
        key: String,
        #[source]
        source: SecretError,
    },

    #[error("Setting '{0}' is encrypted but no settings key is configured")]
    NoEncryptionKey(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Shared settings reader/writer. Cloning is cheap.
#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
    cache: Cache<String, Option<String>>,
    encryptor: Option<Arc<TokenEncryptor>>,
}

impl SettingsStore {
    pub fn new(db: Database, ttl: Duration, encryptor: Option<TokenEncryptor>) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self {
            db,
            cache,
            encryptor: encryptor.map(Arc::new),
        }
    }

    /// Returns the value for `key`, served from cache when fresh.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }
        self.get_fresh(key)
    }

    /// Returns the value or `default` when unset or empty.
    pub fn get_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get(key)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// Reads `key` from the database, bypassing and then refreshing the cache.
    pub fn get_fresh(&self, key: &str) -> Result<Option<String>> {
        let value = match settings_repo::get(&self.db, key)? {
            None => None,
            Some(row) if row.is_encrypted => {
                let encryptor = self
                    .encryptor
                    .as_ref()
                    .ok_or_else(|| SettingsError::NoEncryptionKey(key.to_string()))?;
                let plaintext =
                    encryptor
                        .decrypt(&row.value)
                        .map_err(|source| SettingsError::Decrypt {
                            key: key.to_string(),
                            source,
                        })?;
                Some(plaintext)
            }
            Some(row) => Some(row.value),
        };

        self.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Reads a boolean flag. Only the literal `"true"` (any case) is true.
    pub fn flag(&self, key: &str) -> Result<bool> {
        Ok(self
            .get(key)?
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")))
    }

    /// Writes a setting and drops its cached value.
    pub fn set(&self, key: &str, value: &str, encrypt: bool) -> Result<()> {
        if encrypt {
            let encryptor = self
                .encryptor
                .as_ref()
                .ok_or_else(|| SettingsError::NoEncryptionKey(key.to_string()))?;
            let ciphertext = encryptor
                .encrypt(value)
                .map_err(|source| SettingsError::Encrypt {
                    key: key.to_string(),
                    source,
                })?;
            settings_repo::upsert(&self.db, key, &ciphertext, true)?;
        } else {
            settings_repo::upsert(&self.db, key, value, false)?;
        }

        self.invalidate(key);
        log::debug!("Setting '{}' updated", key);
        Ok(())
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn store(encrypted: bool) -> SettingsStore {
        let db = Database::open_in_memory().unwrap();
        let encryptor = encrypted.then(|| TokenEncryptor::from_hex_key(TEST_KEY).unwrap());
        SettingsStore::new(db, Duration::from_secs(300), encryptor)
    }

    #[test]
    fn test_get_or_default() {
        let store = store(false);
        assert_eq!(store.get_or(SITE_NAME, "BaristaCMS").unwrap(), "BaristaCMS");

        store.set(SITE_NAME, "Corner Cafe", false).unwrap();
        assert_eq!(store.get_or(SITE_NAME, "BaristaCMS").unwrap(), "Corner Cafe");
    }

    #[test]
    fn test_cache_served_until_invalidated() {
        let store = store(false);
        store.set(SITE_NAME, "First", false).unwrap();
        assert_eq!(store.get(SITE_NAME).unwrap().as_deref(), Some("First"));

        // Write behind the cache's back.
        settings_repo::upsert(&store.db, SITE_NAME, "Second", false).unwrap();
        assert_eq!(store.get(SITE_NAME).unwrap().as_deref(), Some("First"));
        assert_eq!(store.get_fresh(SITE_NAME).unwrap().as_deref(), Some("Second"));

        settings_repo::upsert(&store.db, SITE_NAME, "Third", false).unwrap();
        store.invalidate(SITE_NAME);
        assert_eq!(store.get(SITE_NAME).unwrap().as_deref(), Some("Third"));
    }

    #[test]
    fn test_missing_value_is_cached_as_none() {
        let store = store(false);
        assert!(store.get(ENABLE_DEBUG_LOGGING).unwrap().is_none());

        settings_repo::upsert(&store.db, ENABLE_DEBUG_LOGGING, "true", false).unwrap();
        assert!(!store.flag(ENABLE_DEBUG_LOGGING).unwrap());

        store.invalidate_all();
        assert!(store.flag(ENABLE_DEBUG_LOGGING).unwrap());
    }

    #[test]
    fn test_encrypted_values_round_trip() {
        let store = store(true);
        store.set("smtp_password", "hunter2", true).unwrap();

        let row = settings_repo::get(&store.db, "smtp_password").unwrap().unwrap();
        assert!(row.is_encrypted);
        assert_ne!(row.value, "hunter2");
        assert_eq!(store.get("smtp_password").unwrap().as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_encrypted_value_without_key_is_error() {
        let store = store(false);
        settings_repo::upsert(&store.db, "smtp_password", "deadbeef", true).unwrap();

        assert!(matches!(
            store.get("smtp_password"),
            Err(SettingsError::NoEncryptionKey(_))
        ));
        assert!(matches!(
            store.set("smtp_password", "x", true),
            Err(SettingsError::NoEncryptionKey(_))
        ));
    }
}
