//! The Zarr V2 `shuffle` filter.
//!
//! Rearranges N elements of `elementsize` bytes so that byte j of every element is
//! contiguous, improving downstream compression of slowly-varying numeric data.

use serde::{Deserialize, Serialize};

use crate::{array::data_type::DataType, metadata::v2::MetadataV2};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `shuffle` filter.
pub const IDENTIFIER: &str = "shuffle";

/// The configuration of the `shuffle` filter.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShuffleCodecConfiguration {
    /// The element size in bytes.
    pub elementsize: usize,
}

/// The `shuffle` filter.
#[derive(Clone, Copy, Debug)]
pub struct ShuffleCodec {
    elementsize: usize,
}

impl ShuffleCodec {
    /// Create a new `shuffle` filter with `elementsize` bytes per element.
    ///
    /// # Errors
    /// Returns a [`CodecError`] unless `elementsize` is 1, 2, 4 or 8.
    pub fn new(elementsize: usize) -> Result<Self, CodecError> {
        if !matches!(elementsize, 1 | 2 | 4 | 8) {
            return Err(CodecError::InvalidConfiguration(format!(
                "shuffle elementsize must be 1, 2, 4 or 8, got {elementsize}"
            )));
        }
        Ok(Self { elementsize })
    }

    fn check_length(&self, bytes: &[u8]) -> Result<usize, CodecError> {
        if bytes.len() % self.elementsize != 0 {
            return Err(CodecError::InvalidEncodedInput(format!(
                "{} bytes is not a multiple of shuffle elementsize {}",
                bytes.len(),
                self.elementsize
            )));
        }
        Ok(bytes.len() / self.elementsize)
    }

    /// Shuffle `bytes` so that byte j of every element is contiguous.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the input is not a whole number of elements.
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let count = self.check_length(bytes)?;
        if self.elementsize == 1 {
            return Ok(bytes.to_vec());
        }
        let mut out = vec![0u8; bytes.len()];
        for i in 0..count {
            for j in 0..self.elementsize {
                out[j * count + i] = bytes[i * self.elementsize + j];
            }
        }
        Ok(out)
    }

    /// Invert the shuffle.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the input is not a whole number of elements.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let count = self.check_length(bytes)?;
        if self.elementsize == 1 {
            return Ok(bytes.to_vec());
        }
        let mut out = vec![0u8; bytes.len()];
        for i in 0..count {
            for j in 0..self.elementsize {
                out[i * self.elementsize + j] = bytes[j * count + i];
            }
        }
        Ok(out)
    }

    /// The Zarr V2 metadata of the filter.
    #[must_use]
    pub fn v2_metadata(&self) -> MetadataV2 {
        MetadataV2::new_with_configuration(
            IDENTIFIER,
            &ShuffleCodecConfiguration {
                elementsize: self.elementsize,
            },
        )
        .expect("the configuration is serializable")
    }
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    data_type: &DataType,
) -> Result<Codec, CodecError> {
    // An omitted elementsize defaults to the non-complex element size of the array.
    let elementsize = if metadata.configuration.contains_key("elementsize") {
        metadata
            .to_configuration::<ShuffleCodecConfiguration>()
            .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?
            .elementsize
    } else {
        data_type.non_complex_size()
    };
    Ok(Codec::Shuffle(ShuffleCodec::new(elementsize)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_roundtrip() {
        let codec = ShuffleCodec::new(4).unwrap();
        let bytes: Vec<u8> = (0u8..32).collect();
        let encoded = codec.encode(&bytes).unwrap();
        // Byte 0 of all 8 elements first.
        assert_eq!(&encoded[..8], &[0, 4, 8, 12, 16, 20, 24, 28]);
        assert_eq!(codec.decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn shuffle_rejects_partial_elements() {
        let codec = ShuffleCodec::new(4).unwrap();
        assert!(codec.encode(&[0u8; 6]).is_err());
        assert!(codec.decode(&[0u8; 7]).is_err());
    }

    #[test]
    fn shuffle_elementsize_validation() {
        assert!(ShuffleCodec::new(3).is_err());
        assert!(ShuffleCodec::new(8).is_ok());
    }
}
