//! A store wrapper counting operations.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::byte_range::ByteRange;

use super::{ByteStore, MaybeBytes, StoreDirListing, StoreError, StoreKey, StorePrefix};

/// A wrapper around a [`ByteStore`] that counts the operations passing through it.
///
/// Used to verify that consolidated metadata bypasses per-node metadata reads and that
/// prefetched reads issue no further store requests.
#[derive(Debug)]
pub struct CountingStore<TStore: ?Sized> {
    reads: AtomicU64,
    writes: AtomicU64,
    lists: AtomicU64,
    store: Arc<TStore>,
}

impl<TStore: ?Sized> CountingStore<TStore> {
    /// Create a new counting wrapper around `store`.
    #[must_use]
    pub fn new(store: Arc<TStore>) -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            lists: AtomicU64::new(0),
            store,
        }
    }

    /// The number of `get`/`get_partial`/`size_key` operations issued.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// The number of `set`/`erase` operations issued.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// The number of `list_dir` operations issued.
    #[must_use]
    pub fn lists(&self) -> u64 {
        self.lists.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.lists.store(0, Ordering::Relaxed);
    }
}

impl<TStore: ?Sized + ByteStore> ByteStore for CountingStore<TStore> {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.store.get(key)
    }

    fn get_partial(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.store.get_partial(key, byte_ranges)
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.store.size_key(key)
    }

    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.store.set(key, value)
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.store.erase(key)
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.store.erase_prefix(prefix)
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreDirListing, StoreError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        self.store.list_dir(prefix)
    }

    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.store.rename_prefix(from, to)
    }

    fn readonly(&self) -> bool {
        self.store.readonly()
    }
}

#[cfg(test)]
mod tests {
    use super::{super::MemoryStore, *};

    #[test]
    fn counting_store_counts() -> Result<(), Box<dyn std::error::Error>> {
        let store = CountingStore::new(Arc::new(MemoryStore::new()));
        store.set(&"a".try_into()?, &[0])?;
        store.get(&"a".try_into()?)?;
        store.get(&"a".try_into()?)?;
        store.list_dir(&StorePrefix::root())?;
        assert_eq!(store.writes(), 1);
        assert_eq!(store.reads(), 2);
        assert_eq!(store.lists(), 1);
        store.reset();
        assert_eq!(store.reads(), 0);
        Ok(())
    }
}
