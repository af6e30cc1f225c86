//! Prefetch: `advise_read`.
//!
//! Decodes every chunk intersecting a window ahead of time on the shared thread pool and
//! populates the chunk cache map, so that subsequent strided reads over the window issue no
//! store requests. For sharded arrays, inner chunks are grouped by shard and each shard
//! needing more than one inner chunk is decoded with a single index read and a batched
//! range-list request.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use log::debug;
use parking_lot::Mutex;

use crate::{array_subset::ArraySubset, error::ZarrError};

use super::{Array, ProgressFn, chunk_cache::CachedChunk, codec::StoreRangeReader};

/// One unit of prefetch work.
enum PrefetchTask {
    /// A single inner chunk.
    Single(Vec<u64>),
    /// Several inner chunks of one shard, decoded with one index read.
    Shard {
        outer_indices: Vec<u64>,
        inner_indices: Vec<Vec<u64>>,
    },
}

impl PrefetchTask {
    fn num_chunks(&self) -> u64 {
        match self {
            Self::Single(_) => 1,
            Self::Shard { inner_indices, .. } => inner_indices.len() as u64,
        }
    }
}

impl Array {
    /// Prefetch every chunk intersecting the window into the chunk cache.
    ///
    /// The window is described by `origin` and `count` (unit step). The chunk set must fit
    /// the configured cache budget. With at least two worker threads, the chunk list is
    /// partitioned into contiguous slices, each processed by a worker holding its own clone
    /// of the codec chain; a worker failure fails the whole operation once in-flight
    /// workers return. The optional `progress` callback is invoked at chunk granularity and
    /// aborts the operation by returning false.
    ///
    /// # Errors
    /// Returns [`ZarrError::OutOfMemory`] when the window exceeds the cache budget,
    /// [`ZarrError::Interrupted`] on a callback abort, or the first worker error.
    pub fn advise_read(
        &self,
        origin: &[u64],
        count: &[u64],
        progress: Option<ProgressFn<'_>>,
    ) -> Result<(), ZarrError> {
        self.check_not_deleted()?;
        let shape = self.shape();
        if origin.len() != shape.len() || count.len() != shape.len() {
            return Err(ZarrError::invalid_argument(format!(
                "window arguments must have rank {}",
                shape.len()
            )));
        }
        let window = ArraySubset::new_with_start_shape(origin.to_vec(), count.to_vec())?;
        if !window.inside_shape(&shape) {
            return Err(ZarrError::invalid_argument(format!(
                "window {window} exceeds array shape {shape:?}"
            )));
        }
        usize::try_from(window.num_elements())
            .map_err(|_| ZarrError::OutOfMemory(window.num_elements()))?;

        let inner_shape = self.inner_chunk_shape().to_vec();
        let chunks: Vec<Vec<u64>> = window
            .iter_chunks(&inner_shape)?
            .map(|(indices, _)| indices)
            .collect();
        if chunks.is_empty() {
            return Ok(());
        }

        // The decoded chunks must fit the configured cache budget.
        let chunk_bytes = self.inner_layout()?.byte_size() as u64;
        let total_bytes = chunk_bytes.saturating_mul(chunks.len() as u64);
        if total_bytes > self.ctx().options().cache_size {
            return Err(ZarrError::OutOfMemory(total_bytes));
        }

        let tasks = self.plan_tasks(chunks);
        let total_chunks: u64 = tasks.iter().map(PrefetchTask::num_chunks).sum();
        let num_threads = self
            .ctx()
            .options()
            .effective_num_threads()
            .min(tasks.len());
        debug!(
            "advise_read on {}: {total_chunks} chunks in {} tasks on {num_threads} threads",
            self.path(),
            tasks.len()
        );

        let completed = AtomicU64::new(0);
        let cancelled = AtomicBool::new(false);
        let failure: Mutex<Option<ZarrError>> = Mutex::new(None);

        let run_task = |task: &PrefetchTask| {
            if cancelled.load(Ordering::Acquire) {
                return;
            }
            // Each invocation decodes with its own clone of the codec chain.
            let chain = self.codecs().clone();
            let result = self.run_prefetch_task(task, &chain);
            match result {
                Ok(loaded) => {
                    let mut cache = self.cache.lock();
                    for (indices, chunk) in loaded {
                        cache.insert_map(indices, chunk);
                    }
                }
                Err(err) => {
                    cancelled.store(true, Ordering::Release);
                    failure.lock().get_or_insert(err);
                    return;
                }
            }
            let done = completed.fetch_add(task.num_chunks(), Ordering::AcqRel)
                + task.num_chunks();
            if let Some(progress) = progress {
                #[allow(clippy::cast_precision_loss)]
                if !progress(done as f64 / total_chunks as f64) {
                    cancelled.store(true, Ordering::Release);
                    failure.lock().get_or_insert(ZarrError::Interrupted);
                }
            }
        };

        if num_threads < 2 {
            for task in &tasks {
                run_task(task);
            }
        } else {
            let pool = self.ctx().thread_pool()?;
            // Contiguous slices of the task list, one per worker.
            let slice_len = tasks.len().div_ceil(num_threads);
            pool.scope(|scope| {
                for slice in tasks.chunks(slice_len) {
                    scope.spawn(move |_| {
                        for task in slice {
                            run_task(task);
                        }
                    });
                }
            });
        }

        if let Some(err) = failure.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    /// Group inner chunks into prefetch tasks: shards needing several inner chunks decode
    /// in one batch.
    fn plan_tasks(&self, chunks: Vec<Vec<u64>>) -> Vec<PrefetchTask> {
        if !self.codecs().supports_partial_decode() {
            return chunks.into_iter().map(PrefetchTask::Single).collect();
        }
        let mut by_shard: BTreeMap<Vec<u64>, Vec<Vec<u64>>> = BTreeMap::new();
        for inner in chunks {
            by_shard
                .entry(self.outer_indices_of(&inner))
                .or_default()
                .push(inner);
        }
        by_shard
            .into_iter()
            .map(|(outer_indices, inner_indices)| {
                if inner_indices.len() == 1 {
                    PrefetchTask::Single(inner_indices.into_iter().next().expect("non-empty"))
                } else {
                    PrefetchTask::Shard {
                        outer_indices,
                        inner_indices,
                    }
                }
            })
            .collect()
    }

    fn run_prefetch_task(
        &self,
        task: &PrefetchTask,
        chain: &super::CodecChain,
    ) -> Result<Vec<(Vec<u64>, CachedChunk)>, ZarrError> {
        match task {
            PrefetchTask::Single(inner_indices) => {
                let chunk = match self.load_chunk_bytes(inner_indices, chain)? {
                    Some(bytes) => CachedChunk::Present(Arc::new(bytes)),
                    None => CachedChunk::Missing,
                };
                Ok(vec![(inner_indices.clone(), chunk)])
            }
            PrefetchTask::Shard {
                outer_indices,
                inner_indices,
            } => {
                let sharding = chain
                    .sharding_codec()
                    .expect("shard tasks only exist for sharded arrays");
                let key = self.chunk_store_key(outer_indices);
                if self.ctx().store().size_key(&key)?.is_none() {
                    return Ok(inner_indices
                        .iter()
                        .map(|indices| (indices.clone(), CachedChunk::Missing))
                        .collect());
                }
                let outer_layout = self.outer_layout()?;
                let chunks_per_shard: Vec<u64> =
                    std::iter::zip(self.chunk_shape(), self.inner_chunk_shape())
                        .map(|(&outer, &inner)| outer / inner)
                        .collect();
                let local: Vec<Vec<u64>> = inner_indices
                    .iter()
                    .map(|indices| {
                        std::iter::zip(indices, &chunks_per_shard)
                            .map(|(&inner, &count)| inner % count)
                            .collect()
                    })
                    .collect();
                let reader = StoreRangeReader::new(self.ctx().store().as_ref(), key);
                let index = sharding.read_index(&reader, outer_layout.shape())?;
                let decoded = sharding.partial_decode_with_index(
                    &index,
                    &reader,
                    &outer_layout,
                    &local,
                )?;
                Ok(std::iter::zip(inner_indices, decoded)
                    .map(|(indices, bytes)| {
                        let chunk = match bytes {
                            Some(bytes) => CachedChunk::Present(Arc::new(bytes)),
                            None => CachedChunk::Missing,
                        };
                        (indices.clone(), chunk)
                    })
                    .collect())
            }
        }
    }
}
