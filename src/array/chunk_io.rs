//! Chunk I/O: locating, decoding and flushing chunks.
//!
//! The unit of caching and user-visible chunking is the **inner** chunk. For unsharded
//! arrays the inner chunk is the stored blob; for sharded arrays it lives inside a shard
//! blob and is extracted by partial decoding of the shard index plus the requested payload.
//!
//! The dirty chunk in the current slot is flushed by encoding it back through the codec
//! chain. A dirty chunk entirely equal to the fill value erases its blob instead; a dirty
//! inner chunk of a shard is merged into the shard by a read-modify-write of the whole
//! shard blob.

use log::debug;

use crate::{
    array_subset::ArraySubset,
    error::ZarrError,
    storage::{StoreKey, data_key},
};

use super::{
    Array, RawChunkInfo,
    chunk_cache::ChunkCache,
    chunk_layout::ChunkLayout,
    codec::{CodecChain, StoreRangeReader},
};

impl Array {
    /// The store key of the blob holding the outer chunk at `outer_indices`.
    pub(crate) fn chunk_store_key(&self, outer_indices: &[u64]) -> StoreKey {
        data_key(self.path(), &self.chunk_key_encoding().encode(outer_indices))
    }

    /// The layout of one outer chunk.
    pub(crate) fn outer_layout(&self) -> Result<ChunkLayout, ZarrError> {
        let shape = self.chunk_shape().to_vec();
        let bytes = chunk_bytes_upper_bound(&shape, self.data_type().size());
        ChunkLayout::new(shape, self.data_type().clone(), self.effective_fill_value())
            .map_err(|_| ZarrError::OutOfMemory(bytes))
    }

    /// The layout of one inner chunk.
    pub(crate) fn inner_layout(&self) -> Result<ChunkLayout, ZarrError> {
        let shape = self.inner_chunk_shape().to_vec();
        let bytes = chunk_bytes_upper_bound(&shape, self.data_type().size());
        ChunkLayout::new(shape, self.data_type().clone(), self.effective_fill_value())
            .map_err(|_| ZarrError::OutOfMemory(bytes))
    }

    /// The outer chunk indices containing the inner chunk at `inner_indices`.
    pub(crate) fn outer_indices_of(&self, inner_indices: &[u64]) -> Vec<u64> {
        std::iter::zip(
            std::iter::zip(inner_indices, self.inner_chunk_shape()),
            self.chunk_shape(),
        )
        .map(|((&inner, &inner_size), &outer_size)| inner * inner_size / outer_size)
        .collect()
    }

    /// The subset of the outer chunk covered by the inner chunk at `inner_indices`.
    pub(crate) fn inner_subset_in_outer(&self, inner_indices: &[u64]) -> ArraySubset {
        let start = std::iter::zip(
            std::iter::zip(inner_indices, self.inner_chunk_shape()),
            std::iter::zip(self.outer_indices_of(inner_indices), self.chunk_shape()),
        )
        .map(|((&inner, &inner_size), (outer, &outer_size))| {
            inner * inner_size - outer * outer_size
        })
        .collect();
        ArraySubset::new_with_start_shape(start, self.inner_chunk_shape().to_vec())
            .expect("same rank")
    }

    /// Return true if the tile-presence cache knows the outer chunk is absent.
    fn presence_says_missing(&self, outer_indices: &[u64]) -> bool {
        self.presence
            .lock()
            .as_ref()
            .is_some_and(|presence| !presence.is_present(outer_indices))
    }

    /// Load (and decode) the inner chunk at `inner_indices` with the given codec `chain`,
    /// without touching the cache.
    ///
    /// Returns [`None`] for an absent chunk.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store or codec failure.
    pub(crate) fn load_chunk_bytes(
        &self,
        inner_indices: &[u64],
        chain: &CodecChain,
    ) -> Result<Option<Vec<u8>>, ZarrError> {
        let outer_indices = self.outer_indices_of(inner_indices);
        if self.presence_says_missing(&outer_indices) {
            return Ok(None);
        }
        let key = self.chunk_store_key(&outer_indices);

        if let Some(sharding) = chain.sharding_codec() {
            // Partial decode: the shard index plus the one requested payload.
            if self.ctx().store().size_key(&key)?.is_none() {
                return Ok(None);
            }
            let outer_layout = self.outer_layout()?;
            let reader = StoreRangeReader::new(self.ctx().store().as_ref(), key);
            // Inner indices relative to the enclosing shard.
            let chunks_per_shard: Vec<u64> =
                std::iter::zip(self.chunk_shape(), self.inner_chunk_shape())
                    .map(|(&outer, &inner)| outer / inner)
                    .collect();
            let local: Vec<u64> = std::iter::zip(inner_indices, &chunks_per_shard)
                .map(|(&inner, &count)| inner % count)
                .collect();
            let mut decoded =
                sharding.partial_decode(&reader, &outer_layout, &[local])?;
            return Ok(decoded.remove(0));
        }

        let Some(encoded) = self.ctx().store().get(&key)? else {
            return Ok(None);
        };
        let layout = self.inner_layout()?;
        Ok(Some(chain.decode(encoded, &layout)?))
    }

    /// Load the inner chunk at `inner_indices` into the current slot, flushing a dirty
    /// occupant first.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store or codec failure.
    pub(crate) fn load_into_slot(
        &self,
        cache: &mut ChunkCache,
        inner_indices: &[u64],
    ) -> Result<(), ZarrError> {
        self.flush_dirty(cache)?;
        let layout = self.inner_layout()?;
        let loaded = self.load_chunk_bytes(inner_indices, self.codecs())?;
        let slot = cache.reset_slot(inner_indices, layout.byte_size());
        match loaded {
            Some(bytes) => {
                slot.buffer.copy_from_slice(&bytes);
                slot.empty = false;
            }
            None => {
                slot.buffer.copy_from_slice(&layout.fill_bytes());
                slot.empty = true;
            }
        }
        slot.valid = true;
        slot.dirty = false;
        Ok(())
    }

    /// Prepare the current slot for writing the inner chunk at `inner_indices`.
    ///
    /// A window covering the whole chunk initializes the slot to fill without loading;
    /// otherwise the existing chunk is loaded first (missing chunks initialize to fill).
    pub(crate) fn prepare_slot_for_write(
        &self,
        cache: &mut ChunkCache,
        inner_indices: &[u64],
        covers_chunk: bool,
    ) -> Result<(), ZarrError> {
        // A prefetched copy of this chunk is stale as soon as it is written.
        cache.remove_map(inner_indices);
        if cache.slot_holds(inner_indices) {
            return Ok(());
        }
        if covers_chunk {
            self.flush_dirty(cache)?;
            let layout = self.inner_layout()?;
            let slot = cache.reset_slot(inner_indices, layout.byte_size());
            slot.buffer.copy_from_slice(&layout.fill_bytes());
            slot.empty = true;
            slot.valid = true;
        } else {
            self.load_into_slot(cache, inner_indices)?;
        }
        Ok(())
    }

    /// Flush the dirty chunk in the current slot, if any.
    ///
    /// A failing flush leaves the chunk dirty so the next flush retries.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store or codec failure.
    pub(crate) fn flush_dirty(&self, cache: &mut ChunkCache) -> Result<(), ZarrError> {
        if !cache.current.dirty {
            return Ok(());
        }
        let inner_indices = cache.current.indices.clone();
        let outer_indices = self.outer_indices_of(&inner_indices);
        let key = self.chunk_store_key(&outer_indices);
        let fill = self.effective_fill_value();
        let all_fill = fill.equals_all(&cache.current.buffer);

        if let Some(sharding) = self.codecs().sharding_codec() {
            // Read-modify-write of the whole shard.
            let outer_layout = self.outer_layout()?;
            let mut outer_bytes = match self.ctx().store().get(&key)? {
                Some(encoded) => sharding.decode(&encoded, &outer_layout)?,
                None => outer_layout.fill_bytes(),
            };
            let subset = self.inner_subset_in_outer(&inner_indices);
            subset
                .inject_bytes(
                    &cache.current.buffer,
                    &mut outer_bytes,
                    outer_layout.shape(),
                    outer_layout.element_size(),
                )
                .map_err(|err| ZarrError::invalid_argument(err.to_string()))?;
            if fill.equals_all(&outer_bytes) {
                self.ctx().store().erase(&key)?;
                self.update_presence(&outer_indices, false);
            } else {
                let shard = sharding.encode(&outer_bytes, &outer_layout)?;
                self.ctx().store().set(&key, &shard)?;
                self.update_presence(&outer_indices, true);
            }
        } else if all_fill {
            // A chunk equal to the fill value is represented by absence.
            debug!("chunk {inner_indices:?} of {} is all fill, erasing", self.path());
            self.ctx().store().erase(&key)?;
            self.update_presence(&outer_indices, false);
        } else {
            let layout = self.inner_layout()?;
            let encoded = self
                .codecs()
                .encode(cache.current.buffer.clone(), &layout)?;
            self.ctx().store().set(&key, &encoded)?;
            self.update_presence(&outer_indices, true);
        }

        cache.current.dirty = false;
        cache.current.empty = all_fill;
        Ok(())
    }

    fn update_presence(&self, outer_indices: &[u64], present: bool) {
        if let Some(presence) = self.presence.lock().as_mut() {
            presence.set_present(outer_indices, present);
        }
    }

    /// Raw storage information of the chunk at `chunk_indices` (inner chunk coordinates).
    ///
    /// For sharded arrays the offset and length come from the shard index and the key
    /// names the shard blob.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store failure or out-of-grid indices.
    pub fn raw_chunk_info(&self, chunk_indices: &[u64]) -> Result<RawChunkInfo, ZarrError> {
        self.check_not_deleted()?;
        let outer_indices = self.outer_indices_of(chunk_indices);
        let key = self.chunk_store_key(&outer_indices);
        let size = self.ctx().store().size_key(&key)?;

        if let Some(sharding) = self.codecs().sharding_codec() {
            let Some(_) = size else {
                return Ok(RawChunkInfo {
                    key,
                    offset: 0,
                    length: 0,
                    exists: false,
                });
            };
            let reader = StoreRangeReader::new(self.ctx().store().as_ref(), key.clone());
            let index = sharding.read_index(&reader, self.chunk_shape())?;
            let chunks_per_shard: Vec<u64> =
                std::iter::zip(self.chunk_shape(), self.inner_chunk_shape())
                    .map(|(&outer, &inner)| outer / inner)
                    .collect();
            let local: Vec<u64> = std::iter::zip(chunk_indices, &chunks_per_shard)
                .map(|(&inner, &count)| inner % count)
                .collect();
            let entry = sharding.index_entry(&index, self.chunk_shape(), &local)?;
            Ok(match entry {
                Some((offset, length)) => RawChunkInfo {
                    key,
                    offset,
                    length,
                    exists: true,
                },
                None => RawChunkInfo {
                    key,
                    offset: 0,
                    length: 0,
                    exists: false,
                },
            })
        } else {
            Ok(RawChunkInfo {
                key,
                offset: 0,
                length: size.unwrap_or(0),
                exists: size.is_some(),
            })
        }
    }
}

/// Upper bound of a chunk byte size, for error reporting.
fn chunk_bytes_upper_bound(shape: &[u64], element_size: usize) -> u64 {
    shape
        .iter()
        .fold(element_size as u64, |acc, &size| acc.saturating_mul(size))
}
