//! Chunk layouts.

use thiserror::Error;

use super::{data_type::DataType, fill_value::FillValue};

/// The layout of a decoded chunk: its shape, data type and fill value.
///
/// Codecs encode and decode against a chunk layout; the byte size of a decoded chunk is
/// always [`byte_size`](ChunkLayout::byte_size).
#[derive(Clone, Debug)]
pub struct ChunkLayout {
    shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
}

/// A chunk layout whose element count or byte size overflows the platform.
#[derive(Clone, Debug, Error)]
#[error("chunk of shape {0:?} with data type {1} is too large for this platform")]
pub struct ChunkTooLargeError(Vec<u64>, String);

impl ChunkLayout {
    /// Create a new chunk layout.
    ///
    /// # Errors
    /// Returns [`ChunkTooLargeError`] if the element count or byte size overflows `usize`.
    pub fn new(
        shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
    ) -> Result<Self, ChunkTooLargeError> {
        let err = || ChunkTooLargeError(shape.clone(), data_type.to_string());
        let num_elements = shape
            .iter()
            .try_fold(1u64, |acc, &size| acc.checked_mul(size))
            .ok_or_else(err)?;
        let num_elements = usize::try_from(num_elements).map_err(|_| err())?;
        num_elements
            .checked_mul(data_type.size())
            .ok_or_else(err)?;
        Ok(Self {
            shape,
            data_type,
            fill_value,
        })
    }

    /// The chunk shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// The fill value.
    #[must_use]
    pub fn fill_value(&self) -> &FillValue {
        &self.fill_value
    }

    /// The number of elements of the chunk.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.shape
            .iter()
            .map(|&size| usize::try_from(size).unwrap())
            .product()
    }

    /// The size in bytes of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.data_type.size()
    }

    /// The size in bytes of the decoded chunk.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.num_elements() * self.element_size()
    }

    /// A buffer holding the fill value in every element of the chunk.
    #[must_use]
    pub fn fill_bytes(&self) -> Vec<u8> {
        let fill = self.fill_value.as_ne_bytes();
        if fill.iter().all(|&b| b == 0) {
            vec![0; self.byte_size()]
        } else {
            let mut bytes = Vec::with_capacity(self.byte_size());
            for _ in 0..self.num_elements() {
                bytes.extend_from_slice(fill);
            }
            bytes
        }
    }

    /// This layout with a different `shape`.
    ///
    /// # Errors
    /// Returns [`ChunkTooLargeError`] if the new shape overflows the platform.
    pub fn with_shape(&self, shape: Vec<u64>) -> Result<Self, ChunkTooLargeError> {
        Self::new(shape, self.data_type.clone(), self.fill_value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_layout_sizes() {
        let layout =
            ChunkLayout::new(vec![2, 3], DataType::Int32, FillValue::from(-1i32)).unwrap();
        assert_eq!(layout.num_elements(), 6);
        assert_eq!(layout.element_size(), 4);
        assert_eq!(layout.byte_size(), 24);
        let fill = layout.fill_bytes();
        assert_eq!(fill.len(), 24);
        assert!(layout.fill_value().equals_all(&fill));
    }

    #[test]
    fn chunk_layout_overflow() {
        assert!(ChunkLayout::new(
            vec![u64::MAX, u64::MAX],
            DataType::UInt8,
            FillValue::from(0u8)
        )
        .is_err());
    }
}
