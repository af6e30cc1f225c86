//! Iterators over array subsets.

use super::{ArrayIndices, ArraySubset, IncompatibleDimensionalityError, ravel_indices};

/// An iterator over the indices of the elements of an array subset, in row-major order.
#[derive(Clone, Debug)]
pub struct IndicesIterator {
    subset: ArraySubset,
    next: Option<ArrayIndices>,
}

impl IndicesIterator {
    pub(super) fn new(subset: ArraySubset) -> Self {
        let next = (!subset.is_empty() && subset.dimensionality() > 0)
            .then(|| subset.start().to_vec());
        Self { subset, next }
    }
}

impl Iterator for IndicesIterator {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.clone()?;
        let mut next = current.clone();
        let mut done = true;
        for axis in (0..next.len()).rev() {
            next[axis] += 1;
            if next[axis] < self.subset.start()[axis] + self.subset.shape()[axis] {
                done = false;
                break;
            }
            next[axis] = self.subset.start()[axis];
        }
        self.next = (!done).then_some(next);
        Some(current)
    }
}

/// An iterator over `(linearised index, run length)` pairs of the contiguous element runs of
/// an array subset within an array.
///
/// Every run has the same length: the product of the trailing subset extents up to and
/// including the innermost axis that does not span the full array extent.
#[derive(Clone, Debug)]
pub struct ContiguousLinearisedIndicesIterator {
    subset: ArraySubset,
    array_shape: Vec<u64>,
    outer_dims: usize,
    run_length: u64,
    next: Option<ArrayIndices>,
}

impl ContiguousLinearisedIndicesIterator {
    pub(super) fn new(
        subset: ArraySubset,
        array_shape: Vec<u64>,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != array_shape.len() {
            return Err(IncompatibleDimensionalityError(
                array_shape.len(),
                subset.dimensionality(),
            ));
        }

        let mut run_length: u64 = 1;
        let mut contiguous_axes = 0;
        for (subset_size, array_size) in std::iter::zip(subset.shape(), &array_shape).rev() {
            run_length *= subset_size;
            contiguous_axes += 1;
            if subset_size != array_size {
                break;
            }
        }
        let outer_dims = subset.dimensionality() - contiguous_axes;

        let next = (!subset.is_empty()).then(|| subset.start().to_vec());
        Ok(Self {
            subset,
            array_shape,
            outer_dims,
            run_length,
            next,
        })
    }

    /// The length shared by every contiguous run.
    #[must_use]
    pub fn run_length(&self) -> u64 {
        self.run_length
    }
}

impl Iterator for ContiguousLinearisedIndicesIterator {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let linearised = ravel_indices(&current, &self.array_shape);

        // Advance the odometer over the outer (non-contiguous) axes only.
        let mut next = current;
        let mut done = true;
        for axis in (0..self.outer_dims).rev() {
            next[axis] += 1;
            if next[axis] < self.subset.start()[axis] + self.subset.shape()[axis] {
                done = false;
                break;
            }
            next[axis] = self.subset.start()[axis];
        }
        self.next = (!done).then_some(next);
        Some((linearised, self.run_length))
    }
}

/// An iterator over the chunks overlapping an array subset.
///
/// Yields `(chunk indices, chunk subset)` pairs in row-major chunk order; chunk subsets are in
/// array coordinates and are **not** clipped to the iterated subset.
#[derive(Clone, Debug)]
pub struct ChunksIterator {
    inner: IndicesIterator,
    chunk_shape: Vec<u64>,
}

impl ChunksIterator {
    pub(super) fn new(
        subset: ArraySubset,
        chunk_shape: Vec<u64>,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError(
                chunk_shape.len(),
                subset.dimensionality(),
            ));
        }
        let first_chunk: Vec<u64> = std::iter::zip(subset.start(), &chunk_shape)
            .map(|(index, chunk)| index / chunk)
            .collect();
        let last_chunk_exc: Vec<u64> = std::iter::zip(subset.end_exc(), &chunk_shape)
            .map(|(end, chunk)| end.div_ceil(*chunk))
            .collect();
        let chunks = ArraySubset::new_with_start_shape(
            first_chunk.clone(),
            std::iter::zip(&last_chunk_exc, &first_chunk)
                .map(|(last, first)| last.saturating_sub(*first))
                .collect(),
        )
        .expect("same length");
        Ok(Self {
            inner: IndicesIterator::new(chunks),
            chunk_shape,
        })
    }
}

impl Iterator for ChunksIterator {
    type Item = (ArrayIndices, ArraySubset);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk_indices = self.inner.next()?;
        let start: Vec<u64> = std::iter::zip(&chunk_indices, &self.chunk_shape)
            .map(|(chunk, size)| chunk * size)
            .collect();
        let subset = ArraySubset::new_with_start_shape(start, self.chunk_shape.clone())
            .expect("same length");
        Some((chunk_indices, subset))
    }
}

#[cfg(test)]
mod tests {
    use super::super::ArraySubset;

    #[test]
    fn indices_iterator() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 0..2]);
        let indices: Vec<_> = subset.iter_indices().collect();
        assert_eq!(
            indices,
            vec![vec![1, 0], vec![1, 1], vec![2, 0], vec![2, 1]]
        );
    }

    #[test]
    fn indices_iterator_empty() {
        let subset = ArraySubset::new_with_ranges(&[1..1, 0..2]);
        assert_eq!(subset.iter_indices().count(), 0);
    }

    #[test]
    fn contiguous_linearised_indices_partial_rows() {
        // Array 4x6, subset rows 1..3, cols 1..4: two runs of 3.
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..4]);
        let iter = subset.iter_contiguous_linearised_indices(&[4, 6]).unwrap();
        assert_eq!(iter.run_length(), 3);
        let runs: Vec<_> = iter.collect();
        assert_eq!(runs, vec![(7, 3), (13, 3)]);
    }

    #[test]
    fn contiguous_linearised_indices_full_rows() {
        // Full rows coalesce into a single run per outer index.
        let subset = ArraySubset::new_with_ranges(&[1..3, 0..6]);
        let iter = subset.iter_contiguous_linearised_indices(&[4, 6]).unwrap();
        assert_eq!(iter.run_length(), 12);
        let runs: Vec<_> = iter.collect();
        assert_eq!(runs, vec![(6, 12)]);
    }

    #[test]
    fn contiguous_linearised_indices_whole_array() {
        let subset = ArraySubset::new_with_shape(vec![4, 6]);
        let iter = subset.iter_contiguous_linearised_indices(&[4, 6]).unwrap();
        let runs: Vec<_> = iter.collect();
        assert_eq!(runs, vec![(0, 24)]);
    }

    #[test]
    fn chunks_iterator() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..4]);
        let chunks: Vec<_> = subset.iter_chunks(&[2, 3]).unwrap().collect();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].0, vec![0, 0]);
        assert_eq!(chunks[0].1, ArraySubset::new_with_ranges(&[0..2, 0..3]));
        assert_eq!(chunks[1].0, vec![0, 1]);
        assert_eq!(chunks[1].1, ArraySubset::new_with_ranges(&[0..2, 3..6]));
        assert_eq!(chunks[2].0, vec![1, 0]);
        assert_eq!(chunks[3].0, vec![1, 1]);
    }
}
