//! Store key derivation.

use serde::Serialize;

/// Separator between namespace and record identifier.
pub const KEY_SEPARATOR: char = ':';

/// Key under which one record is written: `<namespace>:<identifier>`.
///
/// Derivation is a pure function of its inputs, so the same identifier always
/// maps to the same key within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StoreKey(String);

impl StoreKey {
    /// Derive the key for `identifier` in `namespace`.
    pub fn derive(namespace: &str, identifier: &str) -> Self {
        Self(format!("{}{}{}", namespace, KEY_SEPARATOR, identifier))
    }

    /// Wrap an already-formed key.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The key as sent to the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part (everything before the first separator).
    pub fn namespace(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(ns, _)| ns)
            .unwrap_or("")
    }

    /// Identifier part (everything after the first separator).
    pub fn identifier(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(_, id)| id)
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
