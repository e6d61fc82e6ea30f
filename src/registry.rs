//! Static registry of API keys accepted by the gateway.
//!
//! Keys are loaded once from configuration and never change while the
//! process runs. Lookups fail closed: a blank or unknown key is simply
//! absent.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{AppError, AppResult};

/// A registered API key and the caller it identifies.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyEntry {
    /// The opaque key value presented by the caller.
    pub key: String,
    /// Human-readable name of the calling system.
    pub display_name: String,
}

// Keep the key itself out of logs and panic messages.
impl fmt::Debug for ApiKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyEntry")
            .field("key", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Read-only mapping from key value to [`ApiKeyEntry`].
#[derive(Clone, Default)]
pub struct KeyRegistry {
    entries: HashMap<String, ApiKeyEntry>,
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("keys", &self.entries.len())
            .finish()
    }
}

impl KeyRegistry {
    /// Build a registry from `(key, display_name)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a key or name is blank, or if the
    /// same key appears twice.
    pub fn from_pairs<I, K, N>(pairs: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, N)>,
        K: Into<String>,
        N: Into<String>,
    {
        let mut entries = HashMap::new();

        for (key, name) in pairs {
            let key = key.into();
            let display_name = name.into();

            if key.trim().is_empty() {
                return Err(AppError::ConfigError(
                    "API key values must not be blank".to_string(),
                ));
            }
            if display_name.trim().is_empty() {
                return Err(AppError::ConfigError(
                    "API key display names must not be blank".to_string(),
                ));
            }
            if entries.contains_key(&key) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate API key for '{display_name}'"
                )));
            }

            entries.insert(key.clone(), ApiKeyEntry { key, display_name });
        }

        debug!(count = entries.len(), "API key registry loaded");
        Ok(Self { entries })
    }

    /// Look up a key. Blank and unknown keys both return `None`.
    pub fn lookup(&self, key: &str) -> Option<&ApiKeyEntry> {
        if key.trim().is_empty() {
            return None;
        }
        self.entries.get(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are registered (every protected request will be denied).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
