//! The `sharding_indexed` codec.
//!
//! A shard packs many inner chunks into one stored blob: the encoded inner chunk payloads
//! concatenated with a fixed-layout index of `(offset, length)` `u64` pairs at the start or
//! end of the blob. Missing inner chunks are recorded as the sentinel pair
//! (`u64::MAX`, `u64::MAX`) and read back as the fill value.
//!
//! The index is small and at a known position, so a shard supports **partial decoding**:
//! reading the index plus only the requested inner payloads through byte-range reads.

use serde::{Deserialize, Serialize};

use crate::{
    array_subset::{ArraySubset, ravel_indices},
    byte_range::ByteRange,
    metadata::v3::MetadataV3,
};

use crate::array::{
    chunk_layout::ChunkLayout,
    data_type::DataType,
    endianness::{Endianness, NATIVE_ENDIAN},
};

use super::{Codec, CodecChain, CodecError, CodecRegistry, RangeReader, bytes};

/// The identifier of the `sharding_indexed` codec.
pub const IDENTIFIER: &str = "sharding_indexed";

/// The sentinel offset/length of a missing inner chunk.
pub const MISSING_CHUNK: u64 = u64::MAX;

/// The location of the shard index within the shard blob.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShardIndexLocation {
    /// The index precedes the inner chunk payloads.
    Start,
    /// The index follows the inner chunk payloads.
    #[default]
    End,
}

/// The configuration of the `sharding_indexed` codec.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ShardingCodecConfiguration {
    /// The inner chunk shape.
    pub chunk_shape: Vec<u64>,
    /// The codec chain of the inner chunks.
    pub codecs: Vec<MetadataV3>,
    /// The codec chain of the index. Restricted to a single `bytes` codec.
    pub index_codecs: Vec<MetadataV3>,
    /// The location of the index.
    #[serde(default)]
    pub index_location: ShardIndexLocation,
}

/// The `sharding_indexed` codec.
#[derive(Clone, Debug)]
pub struct ShardingCodec {
    inner_chunk_shape: Vec<u64>,
    inner_chain: CodecChain,
    index_endian: Endianness,
    index_location: ShardIndexLocation,
}

impl ShardingCodec {
    /// Create a new sharding codec.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `inner_chunk_shape` has a zero component.
    pub fn new(
        inner_chunk_shape: Vec<u64>,
        inner_chain: CodecChain,
        index_endian: Endianness,
        index_location: ShardIndexLocation,
    ) -> Result<Self, CodecError> {
        if inner_chunk_shape.iter().any(|&size| size == 0) {
            return Err(CodecError::InvalidConfiguration(format!(
                "inner chunk shape {inner_chunk_shape:?} has a zero component"
            )));
        }
        Ok(Self {
            inner_chunk_shape,
            inner_chain,
            index_endian,
            index_location,
        })
    }

    /// The inner chunk shape.
    #[must_use]
    pub fn inner_chunk_shape(&self) -> &[u64] {
        &self.inner_chunk_shape
    }

    /// The codec chain of the inner chunks.
    #[must_use]
    pub fn inner_chain(&self) -> &CodecChain {
        &self.inner_chain
    }

    /// The location of the index.
    #[must_use]
    pub fn index_location(&self) -> ShardIndexLocation {
        self.index_location
    }

    /// The number of inner chunks per axis of an outer chunk with `outer_shape`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if any inner chunk size does not divide the outer chunk
    /// size exactly.
    pub fn chunks_per_shard(&self, outer_shape: &[u64]) -> Result<Vec<u64>, CodecError> {
        if outer_shape.len() != self.inner_chunk_shape.len() {
            return Err(CodecError::InvalidConfiguration(format!(
                "inner chunk shape {:?} does not match outer chunk rank {}",
                self.inner_chunk_shape,
                outer_shape.len()
            )));
        }
        std::iter::zip(outer_shape, &self.inner_chunk_shape)
            .map(|(&outer, &inner)| {
                if outer % inner == 0 {
                    Ok(outer / inner)
                } else {
                    Err(CodecError::InvalidConfiguration(format!(
                        "inner chunk shape {:?} must evenly divide the outer chunk shape {outer_shape:?}",
                        self.inner_chunk_shape
                    )))
                }
            })
            .collect()
    }

    /// The layout of one inner chunk of an outer chunk with `outer_layout`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the shapes are incompatible.
    pub fn inner_layout(&self, outer_layout: &ChunkLayout) -> Result<ChunkLayout, CodecError> {
        self.chunks_per_shard(outer_layout.shape())?;
        outer_layout
            .with_shape(self.inner_chunk_shape.clone())
            .map_err(|err| CodecError::Other(err.to_string()))
    }

    fn index_byte_size(num_inner: u64) -> u64 {
        num_inner * 2 * std::mem::size_of::<u64>() as u64
    }

    fn decode_index(&self, bytes: &[u8], num_inner: u64) -> Result<Vec<u64>, CodecError> {
        let expected = usize::try_from(Self::index_byte_size(num_inner)).unwrap();
        if bytes.len() != expected {
            return Err(CodecError::InvalidEncodedInput(format!(
                "shard index has {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(std::mem::size_of::<u64>())
            .map(|entry| {
                let entry = entry.try_into().unwrap();
                match self.index_endian {
                    Endianness::Little => u64::from_le_bytes(entry),
                    Endianness::Big => u64::from_be_bytes(entry),
                }
            })
            .collect())
    }

    fn encode_index(&self, entries: &[u64]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(entries.len() * std::mem::size_of::<u64>());
        for &entry in entries {
            match self.index_endian {
                Endianness::Little => bytes.extend(entry.to_le_bytes()),
                Endianness::Big => bytes.extend(entry.to_be_bytes()),
            }
        }
        bytes
    }

    /// Encode a full outer chunk as a shard.
    ///
    /// Inner chunks entirely equal to the fill value are omitted and indexed by the
    /// sentinel pair.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `bytes` does not match `outer_layout` or an inner codec
    /// fails.
    pub fn encode(&self, bytes: &[u8], outer_layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        if bytes.len() != outer_layout.byte_size() {
            return Err(CodecError::UnexpectedDecodedSize(
                bytes.len(),
                outer_layout.byte_size(),
            ));
        }
        let chunks_per_shard = self.chunks_per_shard(outer_layout.shape())?;
        let inner_layout = self.inner_layout(outer_layout)?;
        let num_inner: u64 = chunks_per_shard.iter().product();
        let index_size = Self::index_byte_size(num_inner);
        let payload_base = match self.index_location {
            ShardIndexLocation::Start => index_size,
            ShardIndexLocation::End => 0,
        };

        let mut entries = vec![MISSING_CHUNK; usize::try_from(num_inner * 2).unwrap()];
        let mut payloads: Vec<u8> = Vec::new();
        for (rank, inner_indices) in ArraySubset::new_with_shape(chunks_per_shard.clone())
            .iter_indices()
            .enumerate()
        {
            let inner_subset = ArraySubset::new_with_start_shape(
                std::iter::zip(&inner_indices, &self.inner_chunk_shape)
                    .map(|(&index, &size)| index * size)
                    .collect(),
                self.inner_chunk_shape.clone(),
            )
            .expect("same rank");
            let inner_bytes = inner_subset
                .extract_bytes(bytes, outer_layout.shape(), outer_layout.element_size())
                .map_err(|err| CodecError::Other(err.to_string()))?;
            if outer_layout.fill_value().equals_all(&inner_bytes) {
                continue;
            }
            let encoded = self.inner_chain.encode(inner_bytes, &inner_layout)?;
            entries[rank * 2] = payload_base + payloads.len() as u64;
            entries[rank * 2 + 1] = encoded.len() as u64;
            payloads.extend(encoded);
        }

        let index = self.encode_index(&entries);
        let mut shard = Vec::with_capacity(index.len() + payloads.len());
        match self.index_location {
            ShardIndexLocation::Start => {
                shard.extend(index);
                shard.extend(payloads);
            }
            ShardIndexLocation::End => {
                shard.extend(payloads);
                shard.extend(index);
            }
        }
        Ok(shard)
    }

    /// Decode a full shard into the outer chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a malformed shard or inner codec failure.
    pub fn decode(&self, bytes: &[u8], outer_layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let chunks_per_shard = self.chunks_per_shard(outer_layout.shape())?;
        let inner_layout = self.inner_layout(outer_layout)?;
        let num_inner: u64 = chunks_per_shard.iter().product();
        let index_size = usize::try_from(Self::index_byte_size(num_inner)).unwrap();
        if bytes.len() < index_size {
            return Err(CodecError::InvalidEncodedInput(format!(
                "shard of {} bytes is smaller than its {index_size} byte index",
                bytes.len()
            )));
        }
        let index_bytes = match self.index_location {
            ShardIndexLocation::Start => &bytes[..index_size],
            ShardIndexLocation::End => &bytes[bytes.len() - index_size..],
        };
        let entries = self.decode_index(index_bytes, num_inner)?;

        let mut out = outer_layout.fill_bytes();
        for (rank, inner_indices) in ArraySubset::new_with_shape(chunks_per_shard.clone())
            .iter_indices()
            .enumerate()
        {
            let (offset, length) = (entries[rank * 2], entries[rank * 2 + 1]);
            if offset == MISSING_CHUNK && length == MISSING_CHUNK {
                continue;
            }
            let start = usize::try_from(offset).map_err(|_| invalid_entry(offset, length))?;
            let end = start
                .checked_add(usize::try_from(length).map_err(|_| invalid_entry(offset, length))?)
                .ok_or_else(|| invalid_entry(offset, length))?;
            if end > bytes.len() {
                return Err(invalid_entry(offset, length));
            }
            let decoded = self
                .inner_chain
                .decode(bytes[start..end].to_vec(), &inner_layout)?;
            let inner_subset = ArraySubset::new_with_start_shape(
                std::iter::zip(&inner_indices, &self.inner_chunk_shape)
                    .map(|(&index, &size)| index * size)
                    .collect(),
                self.inner_chunk_shape.clone(),
            )
            .expect("same rank");
            inner_subset
                .inject_bytes(
                    &decoded,
                    &mut out,
                    outer_layout.shape(),
                    outer_layout.element_size(),
                )
                .map_err(|err| CodecError::Other(err.to_string()))?;
        }
        Ok(out)
    }

    /// Read and decode the shard index through `reader`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a read failure or malformed index.
    pub fn read_index(
        &self,
        reader: &dyn RangeReader,
        outer_shape: &[u64],
    ) -> Result<Vec<u64>, CodecError> {
        let chunks_per_shard = self.chunks_per_shard(outer_shape)?;
        let num_inner: u64 = chunks_per_shard.iter().product();
        let index_size = Self::index_byte_size(num_inner);
        let index_bytes = match self.index_location {
            ShardIndexLocation::Start => reader.read_range(ByteRange::FromStart(0, Some(index_size)))?,
            ShardIndexLocation::End => reader.read_range(ByteRange::FromEnd(0, Some(index_size)))?,
        };
        self.decode_index(&index_bytes, num_inner)
    }

    /// The `(offset, length)` of the inner chunk at `inner_indices` within the shard, or
    /// [`None`] for a missing inner chunk.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `inner_indices` is out of the shard grid.
    pub fn index_entry(
        &self,
        index: &[u64],
        outer_shape: &[u64],
        inner_indices: &[u64],
    ) -> Result<Option<(u64, u64)>, CodecError> {
        let chunks_per_shard = self.chunks_per_shard(outer_shape)?;
        if std::iter::zip(inner_indices, &chunks_per_shard).any(|(&index, &count)| index >= count)
        {
            return Err(CodecError::Other(format!(
                "inner chunk {inner_indices:?} is out of the shard grid {chunks_per_shard:?}"
            )));
        }
        let rank = usize::try_from(ravel_indices(inner_indices, &chunks_per_shard)).unwrap();
        let (offset, length) = (index[rank * 2], index[rank * 2 + 1]);
        Ok((offset != MISSING_CHUNK || length != MISSING_CHUNK).then_some((offset, length)))
    }

    /// Partially decode the inner chunks at `inner_chunk_indices` through byte-range reads.
    ///
    /// Returns one entry per request: the decoded inner chunk bytes, or [`None`] for a
    /// missing inner chunk (fill value).
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a read failure, malformed shard, or inner codec failure.
    pub fn partial_decode(
        &self,
        reader: &dyn RangeReader,
        outer_layout: &ChunkLayout,
        inner_chunk_indices: &[Vec<u64>],
    ) -> Result<Vec<Option<Vec<u8>>>, CodecError> {
        let index = self.read_index(reader, outer_layout.shape())?;
        self.partial_decode_with_index(&index, reader, outer_layout, inner_chunk_indices)
    }

    /// [`partial_decode`](Self::partial_decode) with a pre-read shard `index`, allowing the
    /// index to be read once for a batch of requests.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a read failure, malformed shard, or inner codec failure.
    pub fn partial_decode_with_index(
        &self,
        index: &[u64],
        reader: &dyn RangeReader,
        outer_layout: &ChunkLayout,
        inner_chunk_indices: &[Vec<u64>],
    ) -> Result<Vec<Option<Vec<u8>>>, CodecError> {
        let inner_layout = self.inner_layout(outer_layout)?;

        // Issue one batched range read for all present inner chunks.
        let mut requests = Vec::new();
        let mut entries = Vec::with_capacity(inner_chunk_indices.len());
        for inner_indices in inner_chunk_indices {
            let entry = self.index_entry(index, outer_layout.shape(), inner_indices)?;
            if let Some((offset, length)) = entry {
                requests.push(ByteRange::FromStart(offset, Some(length)));
            }
            entries.push(entry);
        }
        let mut payloads = reader.read_ranges(&requests)?.into_iter();

        entries
            .into_iter()
            .map(|entry| {
                entry
                    .map(|_| {
                        let payload = payloads.next().expect("one payload per present entry");
                        self.inner_chain.decode(payload, &inner_layout)
                    })
                    .transpose()
            })
            .collect()
    }

    /// The Zarr V3 metadata of the codec.
    #[must_use]
    pub fn v3_metadata(&self) -> MetadataV3 {
        let index_codecs = vec![
            MetadataV3::new_with_configuration(
                bytes::IDENTIFIER,
                &bytes::BytesCodecConfiguration {
                    endian: Some(self.index_endian),
                },
            )
            .expect("the configuration is serializable"),
        ];
        MetadataV3::new_with_configuration(
            IDENTIFIER,
            &ShardingCodecConfiguration {
                chunk_shape: self.inner_chunk_shape.clone(),
                codecs: self
                    .inner_chain
                    .v3_metadata()
                    .expect("inner chains are built from V3 metadata"),
                index_codecs,
                index_location: self.index_location,
            },
        )
        .expect("the configuration is serializable")
    }
}

fn invalid_entry(offset: u64, length: u64) -> CodecError {
    CodecError::InvalidEncodedInput(format!(
        "shard index entry ({offset}, {length}) is out of bounds"
    ))
}

pub(crate) fn create_codec_v3(
    registry: &CodecRegistry,
    metadata: &MetadataV3,
    data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: ShardingCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    let inner_chain = registry.chain_from_v3(&configuration.codecs, data_type)?;

    // The index must have a fixed encoded size, which restricts its chain to `bytes`.
    let index_endian = match configuration.index_codecs.as_slice() {
        [single] if single.name == bytes::IDENTIFIER => single
            .to_configuration::<bytes::BytesCodecConfiguration>()
            .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?
            .endian
            .unwrap_or(NATIVE_ENDIAN),
        _ => {
            return Err(CodecError::Unsupported(
                "shard index codecs must be a single bytes codec".to_string(),
            ));
        }
    };

    Ok(Codec::Sharding(Box::new(ShardingCodec::new(
        configuration.chunk_shape,
        inner_chain,
        index_endian,
        configuration.index_location,
    )?)))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;
    use crate::array::codec::{BytesCodec, Codec};

    use super::*;

    fn sharding_codec(index_location: ShardIndexLocation) -> ShardingCodec {
        ShardingCodec::new(
            vec![2, 2],
            CodecChain::new(vec![Codec::Bytes(BytesCodec::little())]),
            Endianness::Little,
            index_location,
        )
        .unwrap()
    }

    fn outer_layout() -> ChunkLayout {
        ChunkLayout::new(vec![4, 4], DataType::Int32, FillValue::from(-1i32)).unwrap()
    }

    fn chunk_with_one_inner() -> Vec<u8> {
        // Fill everywhere except the inner chunk at [1, 1] (elements [2..4, 2..4]).
        let layout = outer_layout();
        let mut bytes = layout.fill_bytes();
        let inner = ArraySubset::new_with_ranges(&[2..4, 2..4]);
        let values: Vec<u8> = [10i32, 11, 12, 13]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        inner.inject_bytes(&values, &mut bytes, &[4, 4], 4).unwrap();
        bytes
    }

    #[test]
    fn sharding_roundtrip_both_index_locations() {
        for index_location in [ShardIndexLocation::Start, ShardIndexLocation::End] {
            let codec = sharding_codec(index_location);
            let layout = outer_layout();
            let bytes = chunk_with_one_inner();
            let shard = codec.encode(&bytes, &layout).unwrap();
            assert_eq!(codec.decode(&shard, &layout).unwrap(), bytes);
        }
    }

    #[test]
    fn sharding_fill_inner_chunks_are_sentinel() {
        let codec = sharding_codec(ShardIndexLocation::End);
        let layout = outer_layout();
        let shard = codec.encode(&chunk_with_one_inner(), &layout).unwrap();
        // One 16 byte payload plus the 4 entry index.
        assert_eq!(shard.len(), 16 + 4 * 16);
        let index = codec.read_index(&shard.as_slice(), layout.shape()).unwrap();
        let present: Vec<usize> = (0..4)
            .filter(|rank| index[rank * 2] != MISSING_CHUNK)
            .collect();
        assert_eq!(present, vec![3]);
        assert_eq!(index[6], 0);
        assert_eq!(index[7], 16);
    }

    #[test]
    fn sharding_partial_decode() {
        let codec = sharding_codec(ShardIndexLocation::End);
        let layout = outer_layout();
        let shard = codec.encode(&chunk_with_one_inner(), &layout).unwrap();
        let decoded = codec
            .partial_decode(
                &shard.as_slice(),
                &layout,
                &[vec![0, 0], vec![1, 1], vec![0, 1]],
            )
            .unwrap();
        assert!(decoded[0].is_none());
        assert!(decoded[2].is_none());
        let present = decoded[1].as_ref().unwrap();
        let values: Vec<i32> = present
            .chunks_exact(4)
            .map(|v| i32::from_ne_bytes(v.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![10, 11, 12, 13]);
    }

    #[test]
    fn sharding_rejects_non_dividing_inner_shape() {
        let codec = ShardingCodec::new(
            vec![3, 2],
            CodecChain::new(vec![Codec::Bytes(BytesCodec::little())]),
            Endianness::Little,
            ShardIndexLocation::End,
        )
        .unwrap();
        assert!(codec.chunks_per_shard(&[4, 4]).is_err());
    }
}
