//! The `blosc` codec.
//!
//! Uses the [blosc](https://www.blosc.org/) container format through `blosc-src`.
//! The typesize defaults to the non-complex element size of the array data type when the
//! metadata does not declare one.

use std::ffi::{c_char, c_int, c_void};

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use blosc_sys::{
    BLOSC_BITSHUFFLE, BLOSC_BLOSCLZ_COMPNAME, BLOSC_LZ4HC_COMPNAME, BLOSC_LZ4_COMPNAME,
    BLOSC_MAX_OVERHEAD, BLOSC_NOSHUFFLE, BLOSC_SHUFFLE, BLOSC_SNAPPY_COMPNAME,
    BLOSC_ZLIB_COMPNAME, BLOSC_ZSTD_COMPNAME, blosc_cbuffer_sizes, blosc_cbuffer_validate,
    blosc_compress_ctx, blosc_decompress_ctx,
};

use crate::{
    array::{chunk_layout::ChunkLayout, data_type::DataType},
    metadata::{v2::MetadataV2, v3::MetadataV3},
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `blosc` codec.
pub const IDENTIFIER: &str = "blosc";

/// The `blosc` compressor.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BloscCompressor {
    /// BloscLZ, the blosc default compressor.
    BloscLZ,
    /// LZ4.
    LZ4,
    /// LZ4HC.
    LZ4HC,
    /// Snappy.
    Snappy,
    /// Zlib.
    Zlib,
    /// Zstd.
    Zstd,
}

impl BloscCompressor {
    const fn as_cstr(self) -> *const u8 {
        match self {
            Self::BloscLZ => BLOSC_BLOSCLZ_COMPNAME.as_ptr(),
            Self::LZ4 => BLOSC_LZ4_COMPNAME.as_ptr(),
            Self::LZ4HC => BLOSC_LZ4HC_COMPNAME.as_ptr(),
            Self::Snappy => BLOSC_SNAPPY_COMPNAME.as_ptr(),
            Self::Zlib => BLOSC_ZLIB_COMPNAME.as_ptr(),
            Self::Zstd => BLOSC_ZSTD_COMPNAME.as_ptr(),
        }
    }
}

/// The `blosc` shuffle mode, named in Zarr V3 metadata.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum BloscShuffleMode {
    /// No shuffling.
    NoShuffle = BLOSC_NOSHUFFLE,
    /// Byte-wise shuffling.
    Shuffle = BLOSC_SHUFFLE,
    /// Bit-wise shuffling.
    BitShuffle = BLOSC_BITSHUFFLE,
}

/// The `blosc` shuffle mode as the integer of Zarr V2 metadata.
///
/// `-1` (automatic) maps to byte shuffling for multi-byte types.
#[derive(Serialize_repr, Deserialize_repr, Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i8)]
pub enum BloscShuffleModeV2 {
    /// Choose based on the typesize.
    Automatic = -1,
    /// No shuffling.
    NoShuffle = 0,
    /// Byte-wise shuffling.
    Shuffle = 1,
    /// Bit-wise shuffling.
    BitShuffle = 2,
}

/// The configuration of the `blosc` codec in Zarr V3 metadata.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BloscCodecConfiguration {
    /// The compressor.
    pub cname: BloscCompressor,
    /// The compression level, 0 to 9.
    pub clevel: u8,
    /// The shuffle mode.
    pub shuffle: BloscShuffleMode,
    /// The shuffle element size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typesize: Option<usize>,
    /// The block size in bytes; 0 for automatic.
    #[serde(default)]
    pub blocksize: usize,
}

/// The configuration of the `blosc` codec in Zarr V2 metadata (integer shuffle).
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct BloscCodecConfigurationV2 {
    /// The compressor.
    pub cname: BloscCompressor,
    /// The compression level, 0 to 9.
    pub clevel: u8,
    /// The shuffle mode as an integer.
    pub shuffle: BloscShuffleModeV2,
    /// The block size in bytes; 0 for automatic.
    #[serde(default)]
    pub blocksize: usize,
}

/// The `blosc` codec.
#[derive(Clone, Debug)]
pub struct BloscCodec {
    cname: BloscCompressor,
    clevel: u8,
    shuffle: BloscShuffleMode,
    typesize: Option<usize>,
    blocksize: usize,
}

impl BloscCodec {
    /// Create a new `blosc` codec.
    ///
    /// `typesize` defaults to the non-complex element size of the array data type when
    /// [`None`].
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `clevel` exceeds 9.
    pub fn new(
        cname: BloscCompressor,
        clevel: u8,
        shuffle: BloscShuffleMode,
        typesize: Option<usize>,
        blocksize: usize,
    ) -> Result<Self, CodecError> {
        if clevel > 9 {
            return Err(CodecError::InvalidConfiguration(format!(
                "blosc clevel must be between 0 and 9, got {clevel}"
            )));
        }
        Ok(Self {
            cname,
            clevel,
            shuffle,
            typesize,
            blocksize,
        })
    }

    fn effective_typesize(&self, layout: &ChunkLayout) -> usize {
        self.typesize
            .unwrap_or_else(|| layout.data_type().non_complex_size())
            .max(1)
    }

    /// Compress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a compression failure.
    pub fn encode(&self, bytes: &[u8], layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let typesize = self.effective_typesize(layout);
        let destsize = bytes.len() + BLOSC_MAX_OVERHEAD as usize;
        let mut dest: Vec<u8> = Vec::with_capacity(destsize);
        let written = unsafe {
            blosc_compress_ctx(
                c_int::from(self.clevel),
                self.shuffle as c_int,
                typesize,
                bytes.len(),
                bytes.as_ptr().cast::<c_void>(),
                dest.as_mut_ptr().cast::<c_void>(),
                destsize,
                self.cname.as_cstr().cast::<c_char>(),
                self.blocksize,
                1,
            )
        };
        if written > 0 {
            #[allow(clippy::cast_sign_loss)]
            unsafe {
                dest.set_len(written as usize);
            }
            dest.shrink_to_fit();
            Ok(dest)
        } else {
            Err(CodecError::Other(format!(
                "blosc_compress_ctx failed (clevel {}, shuffle {:?}, typesize {typesize}, nbytes {})",
                self.clevel,
                self.shuffle,
                bytes.len()
            )))
        }
    }

    /// Decompress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on malformed input.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut destsize: usize = 0;
        let valid = unsafe {
            blosc_cbuffer_validate(
                bytes.as_ptr().cast::<c_void>(),
                bytes.len(),
                std::ptr::addr_of_mut!(destsize),
            )
        } == 0;
        if !valid {
            return Err(CodecError::InvalidEncodedInput(
                "not a valid blosc buffer".to_string(),
            ));
        }

        let mut uncompressed_bytes: usize = 0;
        let mut cbytes: usize = 0;
        let mut blocksize: usize = 0;
        unsafe {
            blosc_cbuffer_sizes(
                bytes.as_ptr().cast::<c_void>(),
                std::ptr::addr_of_mut!(uncompressed_bytes),
                std::ptr::addr_of_mut!(cbytes),
                std::ptr::addr_of_mut!(blocksize),
            );
        }

        let mut dest: Vec<u8> = Vec::with_capacity(uncompressed_bytes);
        let written = unsafe {
            blosc_decompress_ctx(
                bytes.as_ptr().cast::<c_void>(),
                dest.as_mut_ptr().cast::<c_void>(),
                uncompressed_bytes,
                1,
            )
        };
        if written > 0 {
            #[allow(clippy::cast_sign_loss)]
            unsafe {
                dest.set_len(written as usize);
            }
            Ok(dest)
        } else {
            Err(CodecError::InvalidEncodedInput(
                "blosc_decompress_ctx failed".to_string(),
            ))
        }
    }

    /// The Zarr V3 metadata of the codec.
    #[must_use]
    pub fn v3_metadata(&self) -> MetadataV3 {
        MetadataV3::new_with_configuration(
            IDENTIFIER,
            &BloscCodecConfiguration {
                cname: self.cname,
                clevel: self.clevel,
                shuffle: self.shuffle,
                typesize: self.typesize,
                blocksize: self.blocksize,
            },
        )
        .expect("the configuration is serializable")
    }

    /// The Zarr V2 metadata of the codec.
    #[must_use]
    pub fn v2_metadata(&self) -> MetadataV2 {
        let shuffle = match self.shuffle {
            BloscShuffleMode::NoShuffle => BloscShuffleModeV2::NoShuffle,
            BloscShuffleMode::Shuffle => BloscShuffleModeV2::Shuffle,
            BloscShuffleMode::BitShuffle => BloscShuffleModeV2::BitShuffle,
        };
        MetadataV2::new_with_configuration(
            IDENTIFIER,
            &BloscCodecConfigurationV2 {
                cname: self.cname,
                clevel: self.clevel,
                shuffle,
                blocksize: self.blocksize,
            },
        )
        .expect("the configuration is serializable")
    }
}

pub(crate) fn create_codec_v3(
    _registry: &CodecRegistry,
    metadata: &MetadataV3,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: BloscCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Blosc(BloscCodec::new(
        configuration.cname,
        configuration.clevel,
        configuration.shuffle,
        configuration.typesize,
        configuration.blocksize,
    )?))
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: BloscCodecConfigurationV2 = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    let typesize = data_type.non_complex_size();
    let shuffle = match configuration.shuffle {
        BloscShuffleModeV2::NoShuffle => BloscShuffleMode::NoShuffle,
        BloscShuffleModeV2::Shuffle => BloscShuffleMode::Shuffle,
        BloscShuffleModeV2::BitShuffle => BloscShuffleMode::BitShuffle,
        BloscShuffleModeV2::Automatic => {
            if typesize > 1 {
                BloscShuffleMode::Shuffle
            } else {
                BloscShuffleMode::BitShuffle
            }
        }
    };
    Ok(Codec::Blosc(BloscCodec::new(
        configuration.cname,
        configuration.clevel,
        shuffle,
        Some(typesize),
        configuration.blocksize,
    )?))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;

    use super::*;

    #[test]
    fn blosc_roundtrip() {
        let codec = BloscCodec::new(
            BloscCompressor::LZ4,
            5,
            BloscShuffleMode::Shuffle,
            None,
            0,
        )
        .unwrap();
        let layout =
            ChunkLayout::new(vec![512], DataType::UInt32, FillValue::from(0u32)).unwrap();
        let elements: Vec<u32> = (0..512).collect();
        let bytes: Vec<u8> = elements.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let encoded = codec.encode(&bytes, &layout).unwrap();
        assert!(encoded.len() < bytes.len());
        assert_eq!(codec.decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn blosc_v2_configuration() {
        let metadata: MetadataV2 = serde_json::from_str(
            r#"{"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1, "blocksize": 0}"#,
        )
        .unwrap();
        let configuration: BloscCodecConfigurationV2 = metadata.to_configuration().unwrap();
        assert_eq!(configuration.cname, BloscCompressor::LZ4);
        assert_eq!(configuration.shuffle, BloscShuffleModeV2::Shuffle);
    }

    #[test]
    fn blosc_rejects_bad_clevel() {
        assert!(
            BloscCodec::new(BloscCompressor::Zstd, 10, BloscShuffleMode::NoShuffle, None, 0)
                .is_err()
        );
    }
}
