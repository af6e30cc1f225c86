//! The shared store context.
//!
//! A [`StoreContext`] is created when a store is opened and shared by every group, array and
//! dimension of the hierarchy. It owns the state that the original design kept process
//! global: the codec registry, the prefetch thread pool, the coordinate-regularity cache,
//! the consolidated-metadata snapshot, and the in-progress-load set used for cycle
//! detection.

use std::{
    collections::HashSet,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    array::codec::CodecRegistry,
    config::{DEFAULT_MAX_TILE_SIZE, EnvGates, StoreOpenOptions},
    error::ZarrError,
    metadata::consolidated::ConsolidatedMetadata,
    storage::{ByteStore, StoreError, StoreKey},
};

/// The capacity of the coordinate-regularity cache.
const REGULARITY_CACHE_CAPACITY: usize = 128;

/// The memoized regularity of a 1-D coordinate array.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoordinateRegularity {
    /// Whether the coordinates are regularly spaced.
    pub regular: bool,
    /// The first coordinate value.
    pub start: f64,
    /// The spacing between consecutive values (meaningful when `regular`).
    pub step: f64,
}

/// Shared per-store state.
pub struct StoreContext {
    store: Arc<dyn ByteStore>,
    options: StoreOpenOptions,
    env: EnvGates,
    registry: CodecRegistry,
    consolidated: Mutex<Option<ConsolidatedMetadata>>,
    consolidated_dirty: AtomicBool,
    regularity: Mutex<LruCache<String, CoordinateRegularity>>,
    loading: Mutex<HashSet<String>>,
    pool: Mutex<Option<Arc<rayon::ThreadPool>>>,
}

impl core::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreContext")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("consolidated_dirty", &self.consolidated_dirty)
            .finish_non_exhaustive()
    }
}

impl StoreContext {
    /// Create a new context over `store` with `options` and `env` gates.
    #[must_use]
    pub fn new(store: Arc<dyn ByteStore>, options: StoreOpenOptions, env: EnvGates) -> Self {
        Self {
            store,
            options,
            env,
            registry: CodecRegistry::with_defaults(),
            consolidated: Mutex::new(None),
            consolidated_dirty: AtomicBool::new(false),
            regularity: Mutex::new(LruCache::new(
                NonZeroUsize::new(REGULARITY_CACHE_CAPACITY).unwrap(),
            )),
            loading: Mutex::new(HashSet::new()),
            pool: Mutex::new(None),
        }
    }

    /// The byte store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    /// The open options.
    #[must_use]
    pub fn options(&self) -> &StoreOpenOptions {
        &self.options
    }

    /// The environment gates.
    #[must_use]
    pub fn env(&self) -> &EnvGates {
        &self.env
    }

    /// The codec registry.
    #[must_use]
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Whether the hierarchy may not be written.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.options.read_only || self.store.readonly()
    }

    /// Read the metadata document at `key`, consulting the consolidated snapshot first.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    pub fn metadata_bytes(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        if self.options.use_consolidated {
            if let Some(snapshot) = self.consolidated.lock().as_ref() {
                return Ok(snapshot
                    .get(key.as_str())
                    .map(|document| serde_json::to_vec(document).expect("valid JSON document")));
            }
        }
        self.store.get(key)
    }

    /// Install the consolidated metadata snapshot.
    pub fn set_consolidated(&self, snapshot: Option<ConsolidatedMetadata>) {
        *self.consolidated.lock() = snapshot;
    }

    /// Return true if a consolidated metadata snapshot is installed.
    #[must_use]
    pub fn has_consolidated(&self) -> bool {
        self.consolidated.lock().is_some()
    }

    /// Mutate the consolidated snapshot (if any) and mark it dirty.
    pub fn update_consolidated(&self, update: impl FnOnce(&mut ConsolidatedMetadata)) {
        if let Some(snapshot) = self.consolidated.lock().as_mut() {
            update(snapshot);
            self.consolidated_dirty.store(true, Ordering::Release);
        }
    }

    /// Take the dirty consolidated snapshot for rewriting, clearing the dirty flag.
    #[must_use]
    pub fn take_dirty_consolidated(&self) -> Option<ConsolidatedMetadata> {
        if self.consolidated_dirty.swap(false, Ordering::AcqRel) {
            self.consolidated.lock().clone()
        } else {
            None
        }
    }

    /// The node paths (sorted store-relative metadata keys) of the consolidated snapshot.
    #[must_use]
    pub fn consolidated_keys(&self) -> Option<Vec<String>> {
        self.consolidated
            .lock()
            .as_ref()
            .map(|snapshot| snapshot.keys().iter().map(ToString::to_string).collect())
    }

    /// The lazily-created prefetch thread pool.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the pool cannot be built.
    pub fn thread_pool(&self) -> Result<Arc<rayon::ThreadPool>, ZarrError> {
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(pool.clone());
        }
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.effective_num_threads())
            .build()
            .map_err(|err| ZarrError::InvalidArgument(err.to_string()))?;
        let built = Arc::new(built);
        *pool = Some(built.clone());
        Ok(built)
    }

    /// Look up the memoized regularity of the 1-D coordinate array at `array_path`.
    #[must_use]
    pub fn coordinate_regularity(&self, array_path: &str) -> Option<CoordinateRegularity> {
        self.regularity.lock().get(array_path).copied()
    }

    /// Memoize the regularity of the 1-D coordinate array at `array_path`.
    pub fn set_coordinate_regularity(&self, array_path: &str, regularity: CoordinateRegularity) {
        self.regularity
            .lock()
            .put(array_path.to_string(), regularity);
    }

    /// Clear the coordinate-regularity cache.
    pub fn clear_coordinate_regularity(&self) {
        self.regularity.lock().clear();
    }

    /// Mark the node at `path` as being loaded, for cycle detection.
    ///
    /// Returns [`None`] if the node is already being loaded (a reference cycle).
    #[must_use]
    pub fn begin_load(self: &Arc<Self>, path: &str) -> Option<LoadGuard> {
        if self.loading.lock().insert(path.to_string()) {
            Some(LoadGuard {
                ctx: self.clone(),
                path: path.to_string(),
            })
        } else {
            None
        }
    }

    /// Reject decoded chunk allocations over the 1 GiB default unless the environment gate
    /// permits them.
    ///
    /// # Errors
    /// Returns [`ZarrError::OutOfMemory`] for an oversized allocation.
    pub fn check_chunk_allocation(&self, bytes: u64) -> Result<(), ZarrError> {
        if bytes > DEFAULT_MAX_TILE_SIZE && !self.env.allow_big_tile_size {
            return Err(ZarrError::OutOfMemory(bytes));
        }
        usize::try_from(bytes)
            .map(|_| ())
            .map_err(|_| ZarrError::OutOfMemory(bytes))
    }
}

/// Removes a node from the in-progress-load set on drop.
pub struct LoadGuard {
    ctx: Arc<StoreContext>,
    path: String,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.ctx.loading.lock().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStore;

    use super::*;

    fn context() -> Arc<StoreContext> {
        Arc::new(StoreContext::new(
            Arc::new(MemoryStore::new()),
            StoreOpenOptions::default(),
            EnvGates::default(),
        ))
    }

    #[test]
    fn load_cycle_detection() {
        let ctx = context();
        let guard = ctx.begin_load("/a").unwrap();
        assert!(ctx.begin_load("/a").is_none());
        drop(guard);
        assert!(ctx.begin_load("/a").is_some());
    }

    #[test]
    fn regularity_cache() {
        let ctx = context();
        assert!(ctx.coordinate_regularity("/x").is_none());
        ctx.set_coordinate_regularity(
            "/x",
            CoordinateRegularity {
                regular: true,
                start: 0.0,
                step: 0.5,
            },
        );
        assert_eq!(
            ctx.coordinate_regularity("/x").unwrap(),
            CoordinateRegularity {
                regular: true,
                start: 0.0,
                step: 0.5,
            }
        );
        ctx.clear_coordinate_regularity();
        assert!(ctx.coordinate_regularity("/x").is_none());
    }

    #[test]
    fn chunk_allocation_guard() {
        let ctx = context();
        assert!(ctx.check_chunk_allocation(1024).is_ok());
        assert!(matches!(
            ctx.check_chunk_allocation(DEFAULT_MAX_TILE_SIZE + 1),
            Err(ZarrError::OutOfMemory(_))
        ));
    }
}
