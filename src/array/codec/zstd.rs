//! The `zstd` codec.

use serde::{Deserialize, Serialize};

use crate::{
    array::data_type::DataType,
    metadata::{v2::MetadataV2, v3::MetadataV3},
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `zstd` codec.
pub const IDENTIFIER: &str = "zstd";

/// The configuration of the `zstd` codec.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct ZstdCodecConfiguration {
    /// The compression level.
    pub level: i32,
    /// Whether to append a content checksum to the frame.
    #[serde(default)]
    pub checksum: bool,
}

/// The `zstd` codec.
#[derive(Clone, Copy, Debug)]
pub struct ZstdCodec {
    level: i32,
    checksum: bool,
}

impl ZstdCodec {
    /// Create a new `zstd` codec with compression `level`.
    #[must_use]
    pub const fn new(level: i32, checksum: bool) -> Self {
        Self { level, checksum }
    }

    /// Compress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a compression failure.
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), self.level)?;
        encoder.include_checksum(self.checksum)?;
        std::io::Write::write_all(&mut encoder, bytes)?;
        Ok(encoder.finish()?)
    }

    /// Decompress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on malformed input.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(zstd::decode_all(bytes)?)
    }

    /// The Zarr V3 metadata of the codec.
    #[must_use]
    pub fn v3_metadata(&self) -> MetadataV3 {
        MetadataV3::new_with_configuration(
            IDENTIFIER,
            &ZstdCodecConfiguration {
                level: self.level,
                checksum: self.checksum,
            },
        )
        .expect("the configuration is serializable")
    }

    /// The Zarr V2 metadata of the codec.
    #[must_use]
    pub fn v2_metadata(&self) -> MetadataV2 {
        // The V2 numcodecs zstd codec has no checksum parameter.
        let mut metadata = MetadataV2::new(IDENTIFIER);
        metadata
            .configuration
            .insert("level".to_string(), self.level.into());
        metadata
    }
}

pub(crate) fn create_codec_v3(
    _registry: &CodecRegistry,
    metadata: &MetadataV3,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: ZstdCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Zstd(ZstdCodec::new(
        configuration.level,
        configuration.checksum,
    )))
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: ZstdCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Zstd(ZstdCodec::new(configuration.level, false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_roundtrip() {
        for checksum in [false, true] {
            let codec = ZstdCodec::new(3, checksum);
            let bytes: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
            let encoded = codec.encode(&bytes).unwrap();
            assert!(encoded.len() < bytes.len());
            assert_eq!(codec.decode(&encoded).unwrap(), bytes);
        }
    }
}
