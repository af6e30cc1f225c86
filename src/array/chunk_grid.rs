//! The regular chunk grid.
//!
//! Chunks have a uniform shape; chunks at the upper array bounds may extend beyond the array
//! shape and are stored at full size.

use thiserror::Error;

use crate::array_subset::{ArraySubset, IncompatibleDimensionalityError};

/// A regular chunk grid: uniform chunks of `chunk_shape`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RegularChunkGrid {
    chunk_shape: Vec<u64>,
}

/// An invalid chunk grid error.
#[derive(Clone, Debug, Error)]
pub enum ChunkGridError {
    /// A chunk shape component is zero.
    #[error("chunk shape {0:?} has a zero component")]
    ZeroChunkSize(Vec<u64>),
    /// The chunk count overflows.
    #[error("the number of chunks of an array of shape {0:?} with chunks {1:?} overflows")]
    TooManyChunks(Vec<u64>, Vec<u64>),
    /// Mismatched dimensionality.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
}

impl RegularChunkGrid {
    /// Create a regular chunk grid with `chunk_shape`.
    ///
    /// # Errors
    /// Returns [`ChunkGridError::ZeroChunkSize`] if any component of `chunk_shape` is zero.
    pub fn new(chunk_shape: Vec<u64>) -> Result<Self, ChunkGridError> {
        if chunk_shape.iter().any(|&size| size == 0) {
            return Err(ChunkGridError::ZeroChunkSize(chunk_shape));
        }
        Ok(Self { chunk_shape })
    }

    /// The chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// The dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.chunk_shape.len()
    }

    /// The number of chunks along each axis of an array with `array_shape`.
    ///
    /// # Errors
    /// Returns a [`ChunkGridError`] on mismatched dimensionality.
    pub fn grid_shape(&self, array_shape: &[u64]) -> Result<Vec<u64>, ChunkGridError> {
        if array_shape.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError(
                array_shape.len(),
                self.dimensionality(),
            )
            .into());
        }
        Ok(std::iter::zip(array_shape, &self.chunk_shape)
            .map(|(&array, &chunk)| array.div_ceil(chunk))
            .collect())
    }

    /// The total number of chunks of an array with `array_shape`.
    ///
    /// # Errors
    /// Returns [`ChunkGridError::TooManyChunks`] if the count overflows a [`u64`].
    pub fn num_chunks(&self, array_shape: &[u64]) -> Result<u64, ChunkGridError> {
        self.grid_shape(array_shape)?
            .iter()
            .try_fold(1u64, |acc, &count| acc.checked_mul(count))
            .ok_or_else(|| {
                ChunkGridError::TooManyChunks(array_shape.to_vec(), self.chunk_shape.clone())
            })
    }

    /// The origin of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns a [`ChunkGridError`] on mismatched dimensionality.
    pub fn chunk_origin(&self, chunk_indices: &[u64]) -> Result<Vec<u64>, ChunkGridError> {
        if chunk_indices.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError(
                chunk_indices.len(),
                self.dimensionality(),
            )
            .into());
        }
        Ok(std::iter::zip(chunk_indices, &self.chunk_shape)
            .map(|(&index, &size)| index * size)
            .collect())
    }

    /// The array subset of the chunk at `chunk_indices` (unclipped).
    ///
    /// # Errors
    /// Returns a [`ChunkGridError`] on mismatched dimensionality.
    pub fn chunk_subset(&self, chunk_indices: &[u64]) -> Result<ArraySubset, ChunkGridError> {
        let origin = self.chunk_origin(chunk_indices)?;
        Ok(ArraySubset::new_with_start_shape(origin, self.chunk_shape.clone())?)
    }

    /// The chunk indices containing the element at `indices`.
    ///
    /// # Errors
    /// Returns a [`ChunkGridError`] on mismatched dimensionality.
    pub fn chunk_indices(&self, indices: &[u64]) -> Result<Vec<u64>, ChunkGridError> {
        if indices.len() != self.dimensionality() {
            return Err(
                IncompatibleDimensionalityError(indices.len(), self.dimensionality()).into(),
            );
        }
        Ok(std::iter::zip(indices, &self.chunk_shape)
            .map(|(&index, &size)| index / size)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_grid_shape() {
        let grid = RegularChunkGrid::new(vec![2, 3]).unwrap();
        assert_eq!(grid.grid_shape(&[4, 6]).unwrap(), vec![2, 2]);
        assert_eq!(grid.grid_shape(&[5, 7]).unwrap(), vec![3, 3]);
        assert_eq!(grid.num_chunks(&[5, 7]).unwrap(), 9);
        assert_eq!(grid.chunk_origin(&[1, 1]).unwrap(), vec![2, 3]);
        assert_eq!(grid.chunk_indices(&[3, 5]).unwrap(), vec![1, 1]);
        assert!(grid.grid_shape(&[4]).is_err());
        assert!(RegularChunkGrid::new(vec![2, 0]).is_err());
    }
}
