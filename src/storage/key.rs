//! Store keys and prefixes.

use derive_more::Display;
use thiserror::Error;

/// A validated key of a blob in a [`ByteStore`](super::ByteStore).
///
/// Keys are relative paths with `/`-separated non-empty components and no leading or trailing
/// `/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key error.
#[derive(Clone, Debug, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl StoreKeyError {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is empty, or has a leading/trailing `/` or an
    /// empty component.
    pub fn new(key: &str) -> Result<Self, StoreKeyError> {
        if key.is_empty() || key.split('/').any(str::is_empty) {
            return Err(StoreKeyError(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// The key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name of the blob (the last key component).
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The prefix of the directory containing the blob.
    #[must_use]
    pub fn parent(&self) -> StorePrefix {
        match self.0.rfind('/') {
            Some(pos) => StorePrefix(self.0[..=pos].to_string()),
            None => StorePrefix::root(),
        }
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

/// A validated prefix of keys in a [`ByteStore`](super::ByteStore).
///
/// Prefixes are either the empty root prefix or end with `/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix error.
#[derive(Clone, Debug, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// The root prefix (the whole store).
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is non-empty and does not end with `/`, or
    /// has an empty component.
    pub fn new(prefix: &str) -> Result<Self, StorePrefixError> {
        if prefix.is_empty() {
            return Ok(Self::root());
        }
        let Some(stripped) = prefix.strip_suffix('/') else {
            return Err(StorePrefixError(prefix.to_string()));
        };
        if stripped.split('/').any(str::is_empty) {
            return Err(StorePrefixError(prefix.to_string()));
        }
        Ok(Self(prefix.to_string()))
    }

    /// The prefix as a string (empty for the root prefix).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key `name` directly under this prefix.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if the combination is not a valid key.
    pub fn key(&self, name: &str) -> Result<StoreKey, StoreKeyError> {
        StoreKey::new(&format!("{}{name}", self.0))
    }

    /// The name of the directory (the last prefix component), or `""` for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0
            .strip_suffix('/')
            .map_or("", |stripped| stripped.rsplit('/').next().unwrap_or(stripped))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key_valid() {
        let key = StoreKey::new("a/b/c").unwrap();
        assert_eq!(key.as_str(), "a/b/c");
        assert_eq!(key.name(), "c");
        assert_eq!(key.parent().as_str(), "a/b/");
        assert_eq!(StoreKey::new("a").unwrap().parent(), StorePrefix::root());
    }

    #[test]
    fn store_key_invalid() {
        assert!(StoreKey::new("").is_err());
        assert!(StoreKey::new("/a").is_err());
        assert!(StoreKey::new("a/").is_err());
        assert!(StoreKey::new("a//b").is_err());
    }

    #[test]
    fn store_prefix() {
        let prefix = StorePrefix::new("a/b/").unwrap();
        assert_eq!(prefix.name(), "b");
        assert_eq!(prefix.key("c").unwrap().as_str(), "a/b/c");
        assert_eq!(StorePrefix::root().as_str(), "");
        assert!(StorePrefix::new("a/b").is_err());
        assert!(StorePrefix::new("a//b/").is_err());
    }
}
