//! An in-memory store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::byte_range::{ByteRange, extract_byte_ranges};

use super::{ByteStore, MaybeBytes, StoreDirListing, StoreError, StoreKey, StorePrefix};

/// An in-memory store, primarily for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn get_partial(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        let blobs = self.blobs.read();
        let Some(bytes) = blobs.get(key) else {
            return Ok(None);
        };
        Ok(Some(extract_byte_ranges(bytes, byte_ranges)?))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        Ok(self.blobs.read().get(key).map(|bytes| bytes.len() as u64))
    }

    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.blobs.write().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StoreError> {
        Ok(self.blobs.write().remove(key).is_some())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StoreError> {
        let mut blobs = self.blobs.write();
        let keys: Vec<StoreKey> = blobs
            .keys()
            .filter(|key| key.as_str().starts_with(prefix.as_str()))
            .cloned()
            .collect();
        for key in &keys {
            blobs.remove(key);
        }
        Ok(!keys.is_empty())
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreDirListing, StoreError> {
        let blobs = self.blobs.read();
        let mut listing = StoreDirListing::default();
        for key in blobs.keys() {
            let Some(rest) = key.as_str().strip_prefix(prefix.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                None => listing.keys.push(key.clone()),
                Some((child, _)) => {
                    let child = StorePrefix::new(&format!("{}{child}/", prefix.as_str()))?;
                    if listing.prefixes.last() != Some(&child) {
                        listing.prefixes.push(child);
                    }
                }
            }
        }
        Ok(listing)
    }

    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write();
        let moved: Vec<(StoreKey, Vec<u8>)> = blobs
            .iter()
            .filter(|(key, _)| key.as_str().starts_with(from.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in moved {
            blobs.remove(&key);
            let renamed = format!(
                "{}{}",
                to.as_str(),
                &key.as_str()[from.as_str().len()..]
            );
            blobs.insert(StoreKey::new(&renamed)?, value);
        }
        Ok(())
    }

    fn readonly(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_set_get_list() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        store.set(&"a/b".try_into()?, &[0, 1, 2, 3])?;
        store.set(&"a/c/d".try_into()?, &[4])?;
        assert_eq!(store.get(&"a/b".try_into()?)?.unwrap(), &[0, 1, 2, 3]);
        assert_eq!(store.size_key(&"a/b".try_into()?)?, Some(4));
        assert_eq!(
            store
                .get_partial(&"a/b".try_into()?, &[ByteRange::FromEnd(1, Some(2))])?
                .unwrap(),
            vec![vec![1, 2]]
        );
        let listing = store.list_dir(&"a/".try_into()?)?;
        assert_eq!(listing.keys, vec!["a/b".try_into()?]);
        assert_eq!(listing.prefixes, vec!["a/c/".try_into()?]);
        assert!(store.erase_prefix(&"a/".try_into()?)?);
        assert_eq!(store.get(&"a/b".try_into()?)?, None);
        Ok(())
    }
}
