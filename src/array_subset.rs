//! Array subsets.
//!
//! An [`ArraySubset`] is an axis-aligned window of an array: a start coordinate and a shape.
//! Subsets drive chunk decomposition of strided reads and writes, prefetch planning, and
//! partial decoding of shards. Iterators are provided over element indices, contiguous
//! linearised runs, and the chunks overlapping a subset.

mod iterators;

pub use iterators::{ChunksIterator, ContiguousLinearisedIndicesIterator, IndicesIterator};

use itertools::izip;
use thiserror::Error;

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// An array subset.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ArraySubset {
    start: ArrayIndices,
    shape: ArrayShape,
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(pub usize, pub usize);

impl core::fmt::Display for ArraySubset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "start {:?} shape {:?}", self.start, self.shape)
    }
}

impl ArraySubset {
    /// Create a new array subset at the origin with `shape`.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new array subset with `start` and `shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `shape` differ.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError(start.len(), shape.len()))
        }
    }

    /// Create a new array subset from per-axis ranges.
    #[must_use]
    pub fn new_with_ranges(ranges: &[std::ops::Range<u64>]) -> Self {
        Self {
            start: ranges.iter().map(|range| range.start).collect(),
            shape: ranges
                .iter()
                .map(|range| range.end.saturating_sub(range.start))
                .collect(),
        }
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the exclusive end of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the number of elements of the array subset as a [`usize`].
    ///
    /// # Panics
    /// Panics if the number of elements exceeds [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Return true if the array subset contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&size| size == 0)
    }

    /// Return true if the array subset is within the bounds of `array_shape`.
    #[must_use]
    pub fn inside_shape(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(&self.start, &self.shape, array_shape)
                .all(|(start, size, shape)| start + size <= *shape)
    }

    /// Return this array subset clipped to the bounds of `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_shape` has a different
    /// dimensionality.
    pub fn bound(&self, array_shape: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if self.dimensionality() != array_shape.len() {
            return Err(IncompatibleDimensionalityError(
                array_shape.len(),
                self.dimensionality(),
            ));
        }
        let start: ArrayIndices = std::iter::zip(&self.start, array_shape)
            .map(|(&start, &bound)| start.min(bound))
            .collect();
        let shape = izip!(&start, &self.start, &self.shape, array_shape)
            .map(|(&clipped, &start, &size, &bound)| (start + size).min(bound) - clipped)
            .collect();
        Ok(Self { start, shape })
    }

    /// Return the intersection of this array subset with `other`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `other` has a different dimensionality.
    pub fn overlap(&self, other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if self.dimensionality() != other.dimensionality() {
            return Err(IncompatibleDimensionalityError(
                other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let start: ArrayIndices = std::iter::zip(&self.start, &other.start)
            .map(|(&a, &b)| a.max(b))
            .collect();
        let shape = izip!(&start, self.end_exc(), other.end_exc())
            .map(|(&start, end_a, end_b)| end_a.min(end_b).saturating_sub(start))
            .collect();
        Ok(Self { start, shape })
    }

    /// Return this array subset relative to `origin` (the subset start minus `origin`).
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `origin` has a different dimensionality.
    pub fn relative_to(&self, origin: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if self.dimensionality() != origin.len() {
            return Err(IncompatibleDimensionalityError(
                origin.len(),
                self.dimensionality(),
            ));
        }
        Ok(Self {
            start: std::iter::zip(&self.start, origin)
                .map(|(&start, &origin)| start.saturating_sub(origin))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    /// Extract the bytes of this subset from the row-major `bytes` of an array with
    /// `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_shape` has a different
    /// dimensionality.
    ///
    /// # Panics
    /// Panics if the subset is out of the bounds of `array_shape` or `bytes` is undersized.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<u8>, IncompatibleDimensionalityError> {
        let mut out = Vec::with_capacity(self.num_elements_usize() * element_size);
        for (index, run) in self.iter_contiguous_linearised_indices(array_shape)? {
            let offset = usize::try_from(index).unwrap() * element_size;
            let length = usize::try_from(run).unwrap() * element_size;
            out.extend_from_slice(&bytes[offset..offset + length]);
        }
        Ok(out)
    }

    /// Write `subset_bytes` (the row-major bytes of this subset) into the row-major `bytes`
    /// of an array with `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_shape` has a different
    /// dimensionality.
    ///
    /// # Panics
    /// Panics if the subset is out of the bounds of `array_shape` or a buffer is undersized.
    pub fn inject_bytes(
        &self,
        subset_bytes: &[u8],
        bytes: &mut [u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<(), IncompatibleDimensionalityError> {
        let mut src = 0;
        for (index, run) in self.iter_contiguous_linearised_indices(array_shape)? {
            let offset = usize::try_from(index).unwrap() * element_size;
            let length = usize::try_from(run).unwrap() * element_size;
            bytes[offset..offset + length].copy_from_slice(&subset_bytes[src..src + length]);
            src += length;
        }
        Ok(())
    }

    /// Returns an iterator over the indices of elements within the subset.
    #[must_use]
    pub fn iter_indices(&self) -> IndicesIterator {
        IndicesIterator::new(self.clone())
    }

    /// Returns an iterator over `(linearised index, run length)` pairs of contiguous element
    /// runs of the subset within an array of `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `array_shape` has a different
    /// dimensionality.
    pub fn iter_contiguous_linearised_indices(
        &self,
        array_shape: &[u64],
    ) -> Result<ContiguousLinearisedIndicesIterator, IncompatibleDimensionalityError> {
        ContiguousLinearisedIndicesIterator::new(self.clone(), array_shape.to_vec())
    }

    /// Returns an iterator over chunks with `chunk_shape` overlapping the subset.
    ///
    /// Yields `(chunk indices, chunk subset)` pairs; chunk subsets are in array coordinates
    /// and may extend beyond the subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` has a different
    /// dimensionality.
    pub fn iter_chunks(
        &self,
        chunk_shape: &[u64],
    ) -> Result<ChunksIterator, IncompatibleDimensionalityError> {
        ChunksIterator::new(self.clone(), chunk_shape.to_vec())
    }
}

/// Ravel ND `indices` into a linearised index of an array with `shape`.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= s;
    }
    index
}

/// Unravel a linearised `index` of an array with `shape` into ND indices.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices = vec![0; shape.len()];
    for (out, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *out = index % dim;
        index /= dim;
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset_basics() {
        let subset = ArraySubset::new_with_ranges(&[1..3, 1..4]);
        assert_eq!(subset.start(), &[1, 1]);
        assert_eq!(subset.shape(), &[2, 3]);
        assert_eq!(subset.end_exc(), vec![3, 4]);
        assert_eq!(subset.num_elements(), 6);
        assert!(subset.inside_shape(&[4, 6]));
        assert!(!subset.inside_shape(&[4, 3]));
        assert!(!subset.is_empty());
    }

    #[test]
    fn array_subset_bound_and_overlap() {
        let subset = ArraySubset::new_with_ranges(&[2..6, 0..4]);
        let bounded = subset.bound(&[4, 4]).unwrap();
        assert_eq!(bounded, ArraySubset::new_with_ranges(&[2..4, 0..4]));

        let other = ArraySubset::new_with_ranges(&[0..3, 2..8]);
        let overlap = subset.overlap(&other).unwrap();
        assert_eq!(overlap, ArraySubset::new_with_ranges(&[2..3, 2..4]));

        assert!(subset.bound(&[4]).is_err());
    }

    #[test]
    fn array_subset_relative_to() {
        let subset = ArraySubset::new_with_ranges(&[4..6, 6..9]);
        let relative = subset.relative_to(&[4, 6]).unwrap();
        assert_eq!(relative, ArraySubset::new_with_ranges(&[0..2, 0..3]));
    }

    #[test]
    fn ravel_unravel() {
        let shape = [4, 6];
        assert_eq!(ravel_indices(&[0, 0], &shape), 0);
        assert_eq!(ravel_indices(&[1, 2], &shape), 8);
        assert_eq!(unravel_index(8, &shape), vec![1, 2]);
        for index in 0..24 {
            assert_eq!(ravel_indices(&unravel_index(index, &shape), &shape), index);
        }
    }
}
