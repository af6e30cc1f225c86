//! The tile-presence cache.
//!
//! An optional sidecar recording, one byte per outer chunk, whether the chunk blob exists.
//! It is populated by scanning the chunk directory once and replaces per-chunk existence
//! probes on stores where those are expensive. The sidecar persists as a tiny uncompressed
//! Zarr V2 array under the hidden `.mdzarr/` prefix, with the scan outcome recorded in a
//! `filling_status` attribute.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    array_subset::ravel_indices,
    error::ZarrError,
    metadata::{Attributes, ChunkKeySeparator, FillValueMetadata, v2::ArrayMetadataV2},
    storage::{ByteStore, StoreDirListing, StoreKey, StorePrefix, node_prefix},
};

use super::{Array, chunk_key::ChunkKeyEncoding};

/// The outcome of a tile-presence scan.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum FillingStatus {
    /// No chunk exists on disk.
    NoTilePresent,
    /// Every chunk exists on disk.
    AllTilesPresent,
    /// Some chunks are missing.
    SomeTilesMissing,
}

/// The in-memory tile-presence map: one byte per outer chunk.
#[derive(Debug)]
pub(crate) struct TilePresence {
    grid_shape: Vec<u64>,
    bytes: Vec<u8>,
}

impl TilePresence {
    fn new(grid_shape: Vec<u64>) -> Result<Self, ZarrError> {
        let num_chunks: u64 = grid_shape.iter().product();
        let num_chunks =
            usize::try_from(num_chunks).map_err(|_| ZarrError::OutOfMemory(num_chunks))?;
        Ok(Self {
            grid_shape,
            bytes: vec![0; num_chunks],
        })
    }

    pub fn is_present(&self, outer_indices: &[u64]) -> bool {
        let index = usize::try_from(ravel_indices(outer_indices, &self.grid_shape)).unwrap();
        self.bytes.get(index).is_some_and(|&b| b != 0)
    }

    pub fn set_present(&mut self, outer_indices: &[u64], present: bool) {
        let index = usize::try_from(ravel_indices(outer_indices, &self.grid_shape)).unwrap();
        if let Some(byte) = self.bytes.get_mut(index) {
            *byte = u8::from(present);
        }
    }

    pub fn status(&self) -> FillingStatus {
        let present = self.bytes.iter().filter(|&&b| b != 0).count();
        if present == 0 {
            FillingStatus::NoTilePresent
        } else if present == self.bytes.len() {
            FillingStatus::AllTilesPresent
        } else {
            FillingStatus::SomeTilesMissing
        }
    }
}

impl ChunkKeyEncoding {
    /// Parse an array-relative chunk key back into chunk grid coordinates.
    ///
    /// Returns [`None`] if `key` is not a chunk key of this encoding with `rank`
    /// coordinates.
    pub(crate) fn parse(&self, key: &str, rank: usize) -> Option<Vec<u64>> {
        let separator = self.separator().as_char();
        let coordinates = match self {
            Self::Default(_) => key.strip_prefix('c')?.strip_prefix(separator)?,
            Self::V2(_) => key,
        };
        let parsed: Option<Vec<u64>> = coordinates
            .split(separator)
            .map(|part| part.parse().ok())
            .collect();
        parsed.filter(|parsed| parsed.len() == rank)
    }
}

impl Array {
    fn presence_prefix(&self) -> StorePrefix {
        StorePrefix::new(&format!(
            ".mdzarr/{}tile_presence/",
            node_prefix(self.path()).as_str()
        ))
        .expect("node prefixes are valid")
    }

    /// Build (or load) the tile-presence cache and return the filling status.
    ///
    /// The scan walks the chunk directory once; afterwards chunk-existence queries are
    /// answered from memory. The cache persists next to the store under `.mdzarr/` and is
    /// reloaded on subsequent opens.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store failure.
    pub fn cache_tile_presence(&self) -> Result<FillingStatus, ZarrError> {
        self.check_not_deleted()?;
        let mut guard = self.presence.lock();
        if let Some(presence) = guard.as_ref() {
            return Ok(presence.status());
        }

        let grid_shape = self.grid().grid_shape(&self.shape())
            .map_err(|err| ZarrError::format(err.to_string()))?;
        let store = self.ctx().store();
        let prefix = self.presence_prefix();

        // A persisted sidecar from an earlier scan takes precedence.
        if let Some(presence) = self.load_persisted_presence(store.as_ref(), &prefix, &grid_shape)?
        {
            let status = presence.status();
            *guard = Some(presence);
            return Ok(status);
        }

        debug!("scanning chunk directory of {} for tile presence", self.path());
        let mut presence = TilePresence::new(grid_shape)?;
        let rank = self.dimensionality();
        let array_prefix = node_prefix(self.path());
        for key in list_keys_recursive(store.as_ref(), &array_prefix)? {
            let relative = &key.as_str()[array_prefix.as_str().len()..];
            if relative.starts_with(".z") || relative == "zarr.json" {
                continue;
            }
            if let Some(outer_indices) = self.chunk_key_encoding().parse(relative, rank) {
                presence.set_present(&outer_indices, true);
            }
        }

        self.persist_presence(store.as_ref(), &prefix, &presence)?;
        let status = presence.status();
        *guard = Some(presence);
        Ok(status)
    }

    fn load_persisted_presence(
        &self,
        store: &dyn ByteStore,
        prefix: &StorePrefix,
        grid_shape: &[u64],
    ) -> Result<Option<TilePresence>, ZarrError> {
        let attrs_key = prefix.key(".zattrs").expect("valid key");
        let Some(attrs_bytes) = store.get(&attrs_key)? else {
            return Ok(None);
        };
        let attributes: Attributes = serde_json::from_slice(&attrs_bytes)?;
        if !attributes.contains_key("filling_status") {
            return Ok(None);
        }
        let data_key = prefix
            .key(&ChunkKeyEncoding::V2(ChunkKeySeparator::Dot).encode(&vec![0; grid_shape.len()]))
            .expect("valid key");
        let Some(bytes) = store.get(&data_key)? else {
            return Ok(None);
        };
        let num_chunks: u64 = grid_shape.iter().product();
        if bytes.len() as u64 != num_chunks {
            // Stale sidecar (e.g. after a resize); rescan.
            return Ok(None);
        }
        Ok(Some(TilePresence {
            grid_shape: grid_shape.to_vec(),
            bytes,
        }))
    }

    fn persist_presence(
        &self,
        store: &dyn ByteStore,
        prefix: &StorePrefix,
        presence: &TilePresence,
    ) -> Result<(), ZarrError> {
        if store.readonly() {
            return Ok(());
        }
        let document = ArrayMetadataV2 {
            zarr_format: monostate::MustBe!(2u64),
            shape: presence.grid_shape.clone(),
            chunks: presence.grid_shape.clone(),
            dtype: crate::metadata::v2::DataTypeMetadataV2::Simple("|u1".to_string()),
            compressor: None,
            fill_value: FillValueMetadata::Number(0.into()),
            order: crate::metadata::v2::MemoryOrderV2::C,
            filters: None,
            dimension_separator: ChunkKeySeparator::Dot,
            attributes: Attributes::default(),
        };
        store.set(
            &prefix.key(".zarray").expect("valid key"),
            &serde_json::to_vec_pretty(&document)?,
        )?;
        let mut attributes = Attributes::new();
        attributes.insert(
            "filling_status".to_string(),
            serde_json::to_value(presence.status())?,
        );
        store.set(
            &prefix.key(".zattrs").expect("valid key"),
            &serde_json::to_vec_pretty(&attributes)?,
        )?;
        let data_key = prefix
            .key(
                &ChunkKeyEncoding::V2(ChunkKeySeparator::Dot)
                    .encode(&vec![0; presence.grid_shape.len()]),
            )
            .expect("valid key");
        store.set(&data_key, &presence.bytes)?;
        Ok(())
    }
}

/// List every blob key under `prefix`, recursing into child directories.
pub(crate) fn list_keys_recursive(
    store: &dyn ByteStore,
    prefix: &StorePrefix,
) -> Result<Vec<StoreKey>, ZarrError> {
    let mut keys = Vec::new();
    let mut pending = vec![prefix.clone()];
    while let Some(prefix) = pending.pop() {
        let StoreDirListing {
            keys: found,
            prefixes,
        } = store.list_dir(&prefix)?;
        keys.extend(found);
        pending.extend(
            prefixes
                .into_iter()
                .filter(|child| !child.name().starts_with(".mdzarr")),
        );
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_parse_roundtrip() {
        let encoding = ChunkKeyEncoding::V2(ChunkKeySeparator::Dot);
        assert_eq!(encoding.parse("0.1", 2), Some(vec![0, 1]));
        assert_eq!(encoding.parse("0.1", 3), None);
        assert_eq!(encoding.parse(".zarray", 2), None);

        let encoding = ChunkKeyEncoding::Default(ChunkKeySeparator::Slash);
        assert_eq!(encoding.parse("c/4/5", 2), Some(vec![4, 5]));
        assert_eq!(encoding.parse("4/5", 2), None);
    }

    #[test]
    fn presence_status() {
        let mut presence = TilePresence::new(vec![2, 2]).unwrap();
        assert_eq!(presence.status(), FillingStatus::NoTilePresent);
        presence.set_present(&[0, 1], true);
        assert!(presence.is_present(&[0, 1]));
        assert!(!presence.is_present(&[1, 1]));
        assert_eq!(presence.status(), FillingStatus::SomeTilesMissing);
        for indices in [[0, 0], [1, 0], [1, 1]] {
            presence.set_present(&indices, true);
        }
        assert_eq!(presence.status(), FillingStatus::AllTilesPresent);
    }
}
