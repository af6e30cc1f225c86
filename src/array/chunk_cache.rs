//! The per-array chunk cache.
//!
//! Two tiers. The **current chunk** slot backs the hot strided-I/O path: it holds the one
//! decoded chunk the last operation touched, and it is the only place a dirty (unflushed)
//! chunk can live. The **map** holds chunks decoded ahead of time by
//! [`advise_read`](crate::array::Array::advise_read); the hot path checks the map first,
//! then the slot.
//!
//! The slot buffer is reused across chunks; its capacity is the largest chunk byte size
//! seen so far.

use std::{collections::HashMap, sync::Arc};

/// A chunk decoded by `advise_read`.
#[derive(Clone, Debug)]
pub(crate) enum CachedChunk {
    /// The decoded chunk bytes.
    Present(Arc<Vec<u8>>),
    /// The chunk blob does not exist; reads resolve to the fill value.
    Missing,
}

/// The current chunk slot.
#[derive(Debug, Default)]
pub(crate) struct CurrentChunk {
    /// The chunk indices the slot holds.
    pub indices: Vec<u64>,
    /// Whether the slot holds a chunk at all.
    pub valid: bool,
    /// Whether the chunk is absent on disk (the buffer then holds fill values).
    pub empty: bool,
    /// Whether the buffer holds unflushed writes.
    pub dirty: bool,
    /// The decoded chunk bytes, `byte_size` long when `valid`.
    pub buffer: Vec<u8>,
}

/// The per-array chunk cache. Protected by the array's cache mutex.
#[derive(Debug, Default)]
pub(crate) struct ChunkCache {
    pub current: CurrentChunk,
    map: HashMap<Vec<u64>, CachedChunk>,
}

impl ChunkCache {
    /// Look up a prefetched chunk.
    pub fn lookup_map(&self, indices: &[u64]) -> Option<CachedChunk> {
        self.map.get(indices).cloned()
    }

    /// Insert a prefetched chunk.
    pub fn insert_map(&mut self, indices: Vec<u64>, chunk: CachedChunk) {
        self.map.insert(indices, chunk);
    }

    /// The number of prefetched chunks.
    pub fn map_len(&self) -> usize {
        self.map.len()
    }

    /// Drop the prefetched chunk at `indices`, if any.
    pub fn remove_map(&mut self, indices: &[u64]) {
        self.map.remove(indices);
    }

    /// Drop all prefetched chunks.
    pub fn clear_map(&mut self) {
        self.map.clear();
        self.map.shrink_to_fit();
    }

    /// Return true if the slot holds the chunk at `indices`.
    pub fn slot_holds(&self, indices: &[u64]) -> bool {
        self.current.valid && self.current.indices == indices
    }

    /// Reset the slot for the chunk at `indices`, reusing the buffer allocation.
    ///
    /// The caller must have flushed a dirty slot first.
    pub fn reset_slot(&mut self, indices: &[u64], byte_size: usize) -> &mut CurrentChunk {
        debug_assert!(!self.current.dirty);
        self.current.indices.clear();
        self.current.indices.extend_from_slice(indices);
        self.current.buffer.resize(byte_size, 0);
        self.current.valid = false;
        self.current.empty = false;
        self.current.dirty = false;
        &mut self.current
    }

    /// Invalidate the slot and the map (e.g. after a delete).
    pub fn invalidate(&mut self) {
        self.current = CurrentChunk::default();
        self.clear_map();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_slot_reuse() {
        let mut cache = ChunkCache::default();
        assert!(!cache.slot_holds(&[0, 0]));
        {
            let slot = cache.reset_slot(&[0, 0], 16);
            slot.valid = true;
        }
        assert!(cache.slot_holds(&[0, 0]));
        assert!(!cache.slot_holds(&[0, 1]));
        assert_eq!(cache.current.buffer.len(), 16);

        // The buffer allocation survives slot reuse.
        cache.reset_slot(&[0, 1], 8);
        assert_eq!(cache.current.buffer.len(), 8);
        assert!(cache.current.buffer.capacity() >= 16);
    }

    #[test]
    fn cache_map() {
        let mut cache = ChunkCache::default();
        cache.insert_map(vec![0, 0], CachedChunk::Missing);
        cache.insert_map(vec![0, 1], CachedChunk::Present(Arc::new(vec![1, 2, 3])));
        assert_eq!(cache.map_len(), 2);
        assert!(matches!(
            cache.lookup_map(&[0, 0]),
            Some(CachedChunk::Missing)
        ));
        assert!(cache.lookup_map(&[1, 1]).is_none());
        cache.clear_map();
        assert_eq!(cache.map_len(), 0);
    }
}
