//! Codecs.
//!
//! A [`CodecChain`] is an ordered sequence of [`Codec`]s transforming decoded native-layout
//! chunk bytes into stored bytes. The chain is applied innermost (array side) first on
//! encode and outermost (store side) first on decode, matching the order of the Zarr V3
//! `codecs` list. A Zarr V2 filter chain plus compressor maps onto the same structure, with
//! Fortran chunk order realized as a leading transpose.
//!
//! The `sharding_indexed` codec supports **partial decoding**: extracting inner chunks of a
//! shard through byte-range reads of the shard index and the requested payloads only.

pub mod bytes;
pub mod delta;
pub mod fixed_scale_offset;
pub mod gzip;
pub mod quantize;
pub mod sharding;
pub mod shuffle;
pub mod transpose;
pub mod zstd;

#[cfg(feature = "blosc")]
pub mod blosc;
#[cfg(feature = "tiff")]
pub mod tiff;

pub use bytes::BytesCodec;
pub use delta::DeltaCodec;
pub use fixed_scale_offset::FixedScaleOffsetCodec;
pub use gzip::GzipCodec;
pub use quantize::QuantizeCodec;
pub use sharding::{ShardIndexLocation, ShardingCodec};
pub use shuffle::ShuffleCodec;
pub use transpose::TransposeCodec;
pub use zstd::ZstdCodec;

#[cfg(feature = "blosc")]
pub use blosc::BloscCodec;
#[cfg(feature = "tiff")]
pub use tiff::TiffCodec;

use std::collections::HashMap;

use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    metadata::{v2::MetadataV2, v3::MetadataV3},
    storage::{ByteStore, StoreError, StoreKey},
};

use super::{chunk_layout::ChunkLayout, data_type::DataType};

/// A codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An underlying store error during partial decoding.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The decoded bytes do not have the expected size.
    #[error("unexpected decoded size {0}, expected {1}")]
    UnexpectedDecodedSize(usize, usize),
    /// The encoded bytes are malformed for the codec.
    #[error("invalid encoded input: {0}")]
    InvalidEncodedInput(String),
    /// An invalid codec configuration.
    #[error("invalid codec configuration: {0}")]
    InvalidConfiguration(String),
    /// An unknown codec name.
    #[error("unknown codec {0}")]
    UnknownCodec(String),
    /// The operation is not supported by the codec (e.g. encoding with a decode-only codec).
    #[error("unsupported codec operation: {0}")]
    Unsupported(String),
    /// Any other codec error.
    #[error("{0}")]
    Other(String),
}

/// A reader of byte ranges of an encoded chunk blob, backing partial decoding.
pub trait RangeReader {
    /// The total size of the blob in bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on an underlying failure.
    fn size(&self) -> Result<u64, CodecError>;

    /// Read a byte range of the blob.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on an underlying failure or an out-of-bounds range.
    fn read_range(&self, byte_range: ByteRange) -> Result<Vec<u8>, CodecError>;

    /// Read multiple byte ranges of the blob.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on an underlying failure or an out-of-bounds range.
    fn read_ranges(&self, byte_ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>, CodecError> {
        byte_ranges
            .iter()
            .map(|byte_range| self.read_range(*byte_range))
            .collect()
    }
}

/// A [`RangeReader`] over a blob in a [`ByteStore`].
pub struct StoreRangeReader<'a> {
    store: &'a dyn ByteStore,
    key: StoreKey,
}

impl<'a> StoreRangeReader<'a> {
    /// Create a new reader over the blob at `key`.
    #[must_use]
    pub fn new(store: &'a dyn ByteStore, key: StoreKey) -> Self {
        Self { store, key }
    }
}

impl RangeReader for StoreRangeReader<'_> {
    fn size(&self) -> Result<u64, CodecError> {
        self.store
            .size_key(&self.key)?
            .ok_or_else(|| CodecError::Other(format!("blob {} does not exist", self.key)))
    }

    fn read_range(&self, byte_range: ByteRange) -> Result<Vec<u8>, CodecError> {
        Ok(self.read_ranges(&[byte_range])?.remove(0))
    }

    fn read_ranges(&self, byte_ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>, CodecError> {
        self.store
            .get_partial(&self.key, byte_ranges)?
            .ok_or_else(|| CodecError::Other(format!("blob {} does not exist", self.key)))
    }
}

impl RangeReader for &[u8] {
    fn size(&self) -> Result<u64, CodecError> {
        Ok(self.len() as u64)
    }

    fn read_range(&self, byte_range: ByteRange) -> Result<Vec<u8>, CodecError> {
        let size = self.len() as u64;
        let start = usize::try_from(byte_range.start(size)).unwrap();
        let end = usize::try_from(byte_range.end(size)).unwrap();
        if end > self.len() || start > end {
            return Err(CodecError::InvalidEncodedInput(format!(
                "byte range {byte_range} out of bounds for {size} byte blob"
            )));
        }
        Ok(self[start..end].to_vec())
    }
}

/// A codec: one stage of a [`CodecChain`].
#[derive(Clone, Debug)]
pub enum Codec {
    /// The `bytes` codec: endianness of multi-byte elements.
    Bytes(BytesCodec),
    /// The `transpose` codec: chunk axis permutation.
    Transpose(TransposeCodec),
    /// The `gzip` (or Zarr V2 `zlib`) codec.
    Gzip(GzipCodec),
    /// The `zstd` codec.
    Zstd(ZstdCodec),
    /// The `blosc` codec.
    #[cfg(feature = "blosc")]
    Blosc(BloscCodec),
    /// The Zarr V2 `shuffle` filter.
    Shuffle(ShuffleCodec),
    /// The Zarr V2 `delta` filter.
    Delta(DeltaCodec),
    /// The Zarr V2 `quantize` filter (decode only).
    Quantize(QuantizeCodec),
    /// The Zarr V2 `fixedscaleoffset` filter (decode only).
    FixedScaleOffset(FixedScaleOffsetCodec),
    /// The Zarr V2 `imagecodecs_tiff` codec (decode only).
    #[cfg(feature = "tiff")]
    Tiff(TiffCodec),
    /// The Zarr V3 `sharding_indexed` codec.
    Sharding(Box<ShardingCodec>),
}

impl Codec {
    /// Encode one codec stage.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the codec fails or is decode-only.
    pub fn encode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Bytes(codec) => codec.encode(bytes, layout),
            Self::Transpose(codec) => codec.encode(&bytes, layout),
            Self::Gzip(codec) => codec.encode(&bytes),
            Self::Zstd(codec) => codec.encode(&bytes),
            #[cfg(feature = "blosc")]
            Self::Blosc(codec) => codec.encode(&bytes, layout),
            Self::Shuffle(codec) => codec.encode(&bytes),
            Self::Delta(codec) => codec.encode(bytes),
            Self::Quantize(codec) => codec.encode(),
            Self::FixedScaleOffset(codec) => codec.encode(),
            #[cfg(feature = "tiff")]
            Self::Tiff(codec) => codec.encode(),
            Self::Sharding(codec) => codec.encode(&bytes, layout),
        }
    }

    /// Decode one codec stage.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the codec fails.
    pub fn decode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Bytes(codec) => codec.decode(bytes, layout),
            Self::Transpose(codec) => codec.decode(&bytes, layout),
            Self::Gzip(codec) => codec.decode(&bytes),
            Self::Zstd(codec) => codec.decode(&bytes),
            #[cfg(feature = "blosc")]
            Self::Blosc(codec) => codec.decode(&bytes),
            Self::Shuffle(codec) => codec.decode(&bytes),
            Self::Delta(codec) => codec.decode(bytes),
            Self::Quantize(codec) => codec.decode(&bytes, layout),
            Self::FixedScaleOffset(codec) => codec.decode(&bytes, layout),
            #[cfg(feature = "tiff")]
            Self::Tiff(codec) => codec.decode(&bytes, layout),
            Self::Sharding(codec) => codec.decode(&bytes, layout),
        }
    }

    /// The Zarr V3 codec name, or the Zarr V2 codec id for V2-only codecs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => bytes::IDENTIFIER,
            Self::Transpose(_) => transpose::IDENTIFIER,
            Self::Gzip(_) => gzip::IDENTIFIER,
            Self::Zstd(_) => zstd::IDENTIFIER,
            #[cfg(feature = "blosc")]
            Self::Blosc(_) => blosc::IDENTIFIER,
            Self::Shuffle(_) => shuffle::IDENTIFIER,
            Self::Delta(_) => delta::IDENTIFIER,
            Self::Quantize(_) => quantize::IDENTIFIER,
            Self::FixedScaleOffset(_) => fixed_scale_offset::IDENTIFIER,
            #[cfg(feature = "tiff")]
            Self::Tiff(_) => tiff::IDENTIFIER,
            Self::Sharding(_) => sharding::IDENTIFIER,
        }
    }

    /// Return true if this codec serializes as the Zarr V2 `compressor` member (rather than
    /// a filter).
    #[must_use]
    pub fn is_v2_compressor(&self) -> bool {
        match self {
            Self::Gzip(_) | Self::Zstd(_) => true,
            #[cfg(feature = "blosc")]
            Self::Blosc(_) => true,
            #[cfg(feature = "tiff")]
            Self::Tiff(_) => true,
            _ => false,
        }
    }

    /// The Zarr V3 metadata of the codec, or [`None`] for V2-only codecs.
    #[must_use]
    pub fn v3_metadata(&self) -> Option<MetadataV3> {
        match self {
            Self::Bytes(codec) => Some(codec.v3_metadata()),
            Self::Transpose(codec) => Some(codec.v3_metadata()),
            Self::Gzip(codec) => codec.v3_metadata(),
            Self::Zstd(codec) => Some(codec.v3_metadata()),
            #[cfg(feature = "blosc")]
            Self::Blosc(codec) => Some(codec.v3_metadata()),
            Self::Sharding(codec) => Some(codec.v3_metadata()),
            _ => None,
        }
    }

    /// The Zarr V2 metadata of the codec, or [`None`] for V3-only codecs.
    #[must_use]
    pub fn v2_metadata(&self) -> Option<MetadataV2> {
        match self {
            Self::Gzip(codec) => Some(codec.v2_metadata()),
            Self::Zstd(codec) => Some(codec.v2_metadata()),
            #[cfg(feature = "blosc")]
            Self::Blosc(codec) => Some(codec.v2_metadata()),
            Self::Shuffle(codec) => Some(codec.v2_metadata()),
            Self::Delta(codec) => Some(codec.v2_metadata()),
            _ => None,
        }
    }
}

/// An ordered codec chain.
///
/// Stored in Zarr V3 `codecs` order: the first codec is closest to the decoded array bytes,
/// the last is closest to the stored bytes.
#[derive(Clone, Debug, Default)]
pub struct CodecChain {
    codecs: Vec<Codec>,
}

impl CodecChain {
    /// Create a codec chain from `codecs` in encode order.
    #[must_use]
    pub fn new(codecs: Vec<Codec>) -> Self {
        Self { codecs }
    }

    /// The codecs of the chain in encode order.
    #[must_use]
    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    /// Encode chunk bytes: apply each codec innermost-first.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if any codec fails or `bytes` does not match `layout`.
    pub fn encode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        if bytes.len() != layout.byte_size() {
            return Err(CodecError::UnexpectedDecodedSize(
                bytes.len(),
                layout.byte_size(),
            ));
        }
        let mut bytes = bytes;
        for codec in &self.codecs {
            bytes = codec.encode(bytes, layout)?;
        }
        Ok(bytes)
    }

    /// Decode chunk bytes: apply each codec outermost-first.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if any codec fails or the decoded size does not match
    /// `layout`.
    pub fn decode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let mut bytes = bytes;
        for codec in self.codecs.iter().rev() {
            bytes = codec.decode(bytes, layout)?;
        }
        if bytes.len() != layout.byte_size() {
            return Err(CodecError::UnexpectedDecodedSize(
                bytes.len(),
                layout.byte_size(),
            ));
        }
        Ok(bytes)
    }

    /// Return true if the chain can extract inner chunks without materializing the full
    /// outer chunk.
    ///
    /// Partial decoding requires the chain to consist of exactly the `sharding_indexed`
    /// codec; any outer compression would destroy the byte addressability of the index.
    #[must_use]
    pub fn supports_partial_decode(&self) -> bool {
        matches!(self.codecs.as_slice(), [Codec::Sharding(_)])
    }

    /// The sharding codec of a partially-decodable chain.
    #[must_use]
    pub fn sharding_codec(&self) -> Option<&ShardingCodec> {
        match self.codecs.as_slice() {
            [Codec::Sharding(codec)] => Some(codec),
            _ => None,
        }
    }

    /// The inner chunk shape published by the chain for an outer chunk of `outer_shape`,
    /// or [`None`] when the chain does not subdivide chunks.
    #[must_use]
    pub fn inner_chunk_shape(&self, outer_shape: &[u64]) -> Option<Vec<u64>> {
        self.sharding_codec()
            .map(|codec| codec.inner_chunk_shape().to_vec())
            .filter(|inner| inner.len() == outer_shape.len())
    }

    /// The Zarr V3 `codecs` metadata of the chain.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the chain contains a V2-only codec.
    pub fn v3_metadata(&self) -> Result<Vec<MetadataV3>, CodecError> {
        self.codecs
            .iter()
            .map(|codec| {
                codec.v3_metadata().ok_or_else(|| {
                    CodecError::Unsupported(format!(
                        "codec {} has no Zarr V3 representation",
                        codec.name()
                    ))
                })
            })
            .collect()
    }
}

/// A constructor of a codec from Zarr V3 metadata.
pub type CodecConstructorV3 =
    fn(&CodecRegistry, &MetadataV3, &DataType) -> Result<Codec, CodecError>;

/// A constructor of a codec from Zarr V2 metadata.
pub type CodecConstructorV2 =
    fn(&CodecRegistry, &MetadataV2, &DataType) -> Result<Codec, CodecError>;

/// A registry of codec constructors, keyed by Zarr V3 codec name and Zarr V2 codec id.
///
/// The registry is owned by the store context; there is no process-global codec state.
#[derive(Clone)]
pub struct CodecRegistry {
    v3: HashMap<&'static str, CodecConstructorV3>,
    v2: HashMap<&'static str, CodecConstructorV2>,
}

impl core::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut v3: Vec<&str> = self.v3.keys().copied().collect();
        let mut v2: Vec<&str> = self.v2.keys().copied().collect();
        v3.sort_unstable();
        v2.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("v3", &v3)
            .field("v2", &v2)
            .finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// Create a registry with every built-in codec registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            v3: HashMap::new(),
            v2: HashMap::new(),
        };
        registry.register_v3(bytes::IDENTIFIER, bytes::create_codec_v3);
        registry.register_v3(transpose::IDENTIFIER, transpose::create_codec_v3);
        registry.register_v3(gzip::IDENTIFIER, gzip::create_codec_v3);
        registry.register_v3(zstd::IDENTIFIER, zstd::create_codec_v3);
        registry.register_v3(sharding::IDENTIFIER, sharding::create_codec_v3);
        registry.register_v2(gzip::IDENTIFIER, gzip::create_codec_v2);
        registry.register_v2(gzip::IDENTIFIER_ZLIB, gzip::create_codec_v2_zlib);
        registry.register_v2(zstd::IDENTIFIER, zstd::create_codec_v2);
        registry.register_v2(shuffle::IDENTIFIER, shuffle::create_codec_v2);
        registry.register_v2(delta::IDENTIFIER, delta::create_codec_v2);
        registry.register_v2(quantize::IDENTIFIER, quantize::create_codec_v2);
        registry.register_v2(
            fixed_scale_offset::IDENTIFIER,
            fixed_scale_offset::create_codec_v2,
        );
        #[cfg(feature = "blosc")]
        {
            registry.register_v3(blosc::IDENTIFIER, blosc::create_codec_v3);
            registry.register_v2(blosc::IDENTIFIER, blosc::create_codec_v2);
        }
        #[cfg(feature = "tiff")]
        registry.register_v2(tiff::IDENTIFIER, tiff::create_codec_v2);
        registry
    }

    /// Register a Zarr V3 codec constructor under `name`.
    pub fn register_v3(&mut self, name: &'static str, constructor: CodecConstructorV3) {
        self.v3.insert(name, constructor);
    }

    /// Register a Zarr V2 codec constructor under `id`.
    pub fn register_v2(&mut self, id: &'static str, constructor: CodecConstructorV2) {
        self.v2.insert(id, constructor);
    }

    /// Create a codec from Zarr V3 metadata.
    ///
    /// # Errors
    /// Returns [`CodecError::UnknownCodec`] for an unregistered name, or the constructor's
    /// error.
    pub fn codec_from_v3(
        &self,
        metadata: &MetadataV3,
        data_type: &DataType,
    ) -> Result<Codec, CodecError> {
        let constructor = self
            .v3
            .get(metadata.name.as_str())
            .ok_or_else(|| CodecError::UnknownCodec(metadata.name.clone()))?;
        constructor(self, metadata, data_type)
    }

    /// Create a codec from Zarr V2 metadata.
    ///
    /// # Errors
    /// Returns [`CodecError::UnknownCodec`] for an unregistered id, or the constructor's
    /// error.
    pub fn codec_from_v2(
        &self,
        metadata: &MetadataV2,
        data_type: &DataType,
    ) -> Result<Codec, CodecError> {
        let constructor = self
            .v2
            .get(metadata.id.as_str())
            .ok_or_else(|| CodecError::UnknownCodec(metadata.id.clone()))?;
        constructor(self, metadata, data_type)
    }

    /// Create a codec chain from Zarr V3 `codecs` metadata.
    ///
    /// # Errors
    /// Returns a [`CodecError`] for an unregistered or misconfigured codec.
    pub fn chain_from_v3(
        &self,
        codecs: &[MetadataV3],
        data_type: &DataType,
    ) -> Result<CodecChain, CodecError> {
        Ok(CodecChain::new(
            codecs
                .iter()
                .map(|metadata| self.codec_from_v3(metadata, data_type))
                .collect::<Result<Vec<_>, _>>()?,
        ))
    }

    /// Create a codec chain from Zarr V2 `filters` and `compressor` metadata.
    ///
    /// Filters are array-side and come first; the compressor is store-side and comes last.
    ///
    /// # Errors
    /// Returns a [`CodecError`] for an unregistered or misconfigured codec.
    pub fn chain_from_v2(
        &self,
        filters: Option<&[MetadataV2]>,
        compressor: Option<&MetadataV2>,
        data_type: &DataType,
    ) -> Result<CodecChain, CodecError> {
        let mut codecs = Vec::new();
        if let Some(filters) = filters {
            for filter in filters {
                codecs.push(self.codec_from_v2(filter, data_type)?);
            }
        }
        if let Some(compressor) = compressor {
            codecs.push(self.codec_from_v2(compressor, data_type)?);
        }
        Ok(CodecChain::new(codecs))
    }
}
