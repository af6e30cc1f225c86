//! The `gzip` codec.
//!
//! Applies gzip (RFC 1952) compression, or zlib (RFC 1950) framing for the Zarr V2 `zlib`
//! codec id.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::{
    array::data_type::DataType,
    metadata::{v2::MetadataV2, v3::MetadataV3},
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `gzip` codec.
pub const IDENTIFIER: &str = "gzip";

/// The Zarr V2 codec id of the zlib-framed variant.
pub const IDENTIFIER_ZLIB: &str = "zlib";

/// The framing of the compressed stream.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum GzipFraming {
    /// gzip framing (RFC 1952).
    Gzip,
    /// zlib framing (RFC 1950), the Zarr V2 `zlib` codec.
    Zlib,
}

/// The configuration of the `gzip` codec.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct GzipCodecConfiguration {
    /// The compression level, an integer from 0 to 9.
    pub level: GzipCompressionLevel,
}

/// A gzip compression level: an integer from 0 to 9.
#[derive(Serialize, Copy, Clone, Debug, Eq, PartialEq)]
pub struct GzipCompressionLevel(u8);

impl GzipCompressionLevel {
    /// The level as an integer.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for GzipCompressionLevel {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level <= 9 { Ok(Self(level)) } else { Err(level) }
    }
}

impl<'de> Deserialize<'de> for GzipCompressionLevel {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let level = u8::deserialize(d)?;
        Self::try_from(level)
            .map_err(|_| serde::de::Error::custom("gzip level must be between 0 and 9"))
    }
}

/// The `gzip` codec.
#[derive(Clone, Copy, Debug)]
pub struct GzipCodec {
    level: GzipCompressionLevel,
    framing: GzipFraming,
}

impl GzipCodec {
    /// Create a new `gzip` codec with compression `level`.
    ///
    /// # Errors
    /// Returns the offending level if it is not in 0..=9.
    pub fn new(level: u8) -> Result<Self, u8> {
        Ok(Self {
            level: GzipCompressionLevel::try_from(level)?,
            framing: GzipFraming::Gzip,
        })
    }

    /// Create a new zlib-framed codec (the Zarr V2 `zlib` id) with compression `level`.
    ///
    /// # Errors
    /// Returns the offending level if it is not in 0..=9.
    pub fn new_zlib(level: u8) -> Result<Self, u8> {
        Ok(Self {
            level: GzipCompressionLevel::try_from(level)?,
            framing: GzipFraming::Zlib,
        })
    }

    /// Compress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a compression failure.
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compression = flate2::Compression::new(u32::from(self.level.as_u8()));
        match self.framing {
            GzipFraming::Gzip => {
                let mut encoder = flate2::write::GzEncoder::new(Vec::new(), compression);
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            GzipFraming::Zlib => {
                let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), compression);
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
        }
    }

    /// Decompress `bytes`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on malformed input.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        match self.framing {
            GzipFraming::Gzip => {
                flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
            }
            GzipFraming::Zlib => {
                flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut out)?;
            }
        }
        Ok(out)
    }

    /// The Zarr V3 metadata of the codec, or [`None`] for the zlib-framed variant.
    #[must_use]
    pub fn v3_metadata(&self) -> Option<MetadataV3> {
        matches!(self.framing, GzipFraming::Gzip).then(|| {
            MetadataV3::new_with_configuration(
                IDENTIFIER,
                &GzipCodecConfiguration { level: self.level },
            )
            .expect("the configuration is serializable")
        })
    }

    /// The Zarr V2 metadata of the codec.
    #[must_use]
    pub fn v2_metadata(&self) -> MetadataV2 {
        let id = match self.framing {
            GzipFraming::Gzip => IDENTIFIER,
            GzipFraming::Zlib => IDENTIFIER_ZLIB,
        };
        MetadataV2::new_with_configuration(id, &GzipCodecConfiguration { level: self.level })
            .expect("the configuration is serializable")
    }
}

pub(crate) fn create_codec_v3(
    _registry: &CodecRegistry,
    metadata: &MetadataV3,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: GzipCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Gzip(GzipCodec {
        level: configuration.level,
        framing: GzipFraming::Gzip,
    }))
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: GzipCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Gzip(GzipCodec {
        level: configuration.level,
        framing: GzipFraming::Gzip,
    }))
}

pub(crate) fn create_codec_v2_zlib(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: GzipCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Gzip(GzipCodec {
        level: configuration.level,
        framing: GzipFraming::Zlib,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_configuration_level_range() {
        assert!(serde_json::from_str::<GzipCodecConfiguration>(r#"{"level": 5}"#).is_ok());
        assert!(serde_json::from_str::<GzipCodecConfiguration>(r#"{"level": 10}"#).is_err());
        assert!(serde_json::from_str::<GzipCodecConfiguration>(r#"{"level": -1}"#).is_err());
    }

    #[test]
    fn gzip_roundtrip() {
        let codec = GzipCodec::new(5).unwrap();
        let bytes: Vec<u8> = (0..255).cycle().take(2048).collect();
        let encoded = codec.encode(&bytes).unwrap();
        assert!(encoded.len() < bytes.len());
        assert_eq!(codec.decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn zlib_roundtrip() {
        let codec = GzipCodec::new_zlib(6).unwrap();
        let bytes = b"hello hello hello hello".to_vec();
        let encoded = codec.encode(&bytes).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), bytes);
        assert_eq!(codec.v2_metadata().id, "zlib");
        assert!(codec.v3_metadata().is_none());
    }
}
