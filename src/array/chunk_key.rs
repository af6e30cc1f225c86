//! Chunk key encodings.
//!
//! A chunk key encoding maps chunk grid coordinates to the store key suffix of the chunk
//! blob, relative to the array node.

use itertools::Itertools;

use crate::metadata::ChunkKeySeparator;

/// A chunk key encoding.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChunkKeyEncoding {
    /// The Zarr V3 `default` encoding: `c<sep>0<sep>1...`, or `c` for zero dimensions.
    Default(ChunkKeySeparator),
    /// The Zarr V2 encoding: `0<sep>1...`, or `0` for zero dimensions.
    ///
    /// Used both by Zarr V2 arrays and by Zarr V3 arrays declaring the `v2` chunk key
    /// encoding.
    V2(ChunkKeySeparator),
}

impl ChunkKeyEncoding {
    /// The separator between chunk grid coordinates.
    #[must_use]
    pub fn separator(&self) -> ChunkKeySeparator {
        match self {
            Self::Default(separator) | Self::V2(separator) => *separator,
        }
    }

    /// Encode `chunk_indices` as a store key suffix relative to the array node.
    #[must_use]
    pub fn encode(&self, chunk_indices: &[u64]) -> String {
        match self {
            Self::Default(separator) => {
                if chunk_indices.is_empty() {
                    "c".to_string()
                } else {
                    format!(
                        "c{}{}",
                        separator.as_char(),
                        chunk_indices.iter().join(&separator.as_char().to_string())
                    )
                }
            }
            Self::V2(separator) => {
                if chunk_indices.is_empty() {
                    "0".to_string()
                } else {
                    chunk_indices.iter().join(&separator.as_char().to_string())
                }
            }
        }
    }

    /// Return true if encoded keys contain `/` and chunk blobs live in nested directories.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.separator() == ChunkKeySeparator::Slash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_default() {
        let encoding = ChunkKeyEncoding::Default(ChunkKeySeparator::Slash);
        assert_eq!(encoding.encode(&[1, 23, 45]), "c/1/23/45");
        assert_eq!(encoding.encode(&[]), "c");
        assert!(encoding.is_nested());

        let encoding = ChunkKeyEncoding::Default(ChunkKeySeparator::Dot);
        assert_eq!(encoding.encode(&[1, 23]), "c.1.23");
    }

    #[test]
    fn chunk_key_v2() {
        let encoding = ChunkKeyEncoding::V2(ChunkKeySeparator::Dot);
        assert_eq!(encoding.encode(&[0, 1]), "0.1");
        assert_eq!(encoding.encode(&[]), "0");
        assert!(!encoding.is_nested());

        let encoding = ChunkKeyEncoding::V2(ChunkKeySeparator::Slash);
        assert_eq!(encoding.encode(&[0, 1]), "0/1");
    }
}
