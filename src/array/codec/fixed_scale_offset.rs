//! The Zarr V2 `fixedscaleoffset` filter (decode only).
//!
//! The producer stores `round((x - offset) * scale)` as an unsigned integer; decoding
//! reconstructs `x = stored / scale + offset` as a float.

use serde::{Deserialize, Serialize};

use crate::{
    array::{
        chunk_layout::ChunkLayout,
        data_type::DataType,
        endianness::{Endianness, NATIVE_ENDIAN},
    },
    metadata::v2::MetadataV2,
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `fixedscaleoffset` filter.
pub const IDENTIFIER: &str = "fixedscaleoffset";

/// The configuration of the `fixedscaleoffset` filter.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FixedScaleOffsetCodecConfiguration {
    /// The scale applied by the producer.
    pub scale: f64,
    /// The offset subtracted by the producer.
    pub offset: f64,
    /// The array dtype, a Zarr V2 float dtype string.
    pub dtype: String,
    /// The storage dtype, a Zarr V2 unsigned integer dtype string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub astype: Option<String>,
}

/// The `fixedscaleoffset` filter.
#[derive(Clone, Debug)]
pub struct FixedScaleOffsetCodec {
    scale: f64,
    offset: f64,
    dtype: DataType,
    dtype_endianness: Endianness,
    astype: DataType,
    astype_endianness: Endianness,
}

impl FixedScaleOffsetCodec {
    /// Create a new `fixedscaleoffset` filter.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `dtype` is not a float type, `astype` is not an unsigned
    /// integer type, or `scale` is zero.
    pub fn new(
        scale: f64,
        offset: f64,
        dtype: &str,
        astype: Option<&str>,
    ) -> Result<Self, CodecError> {
        if scale == 0.0 {
            return Err(CodecError::InvalidConfiguration(
                "fixedscaleoffset scale must be non-zero".to_string(),
            ));
        }
        let (dtype_parsed, dtype_endianness) = DataType::from_v2_dtype(dtype)
            .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
        if !matches!(dtype_parsed, DataType::Float32 | DataType::Float64) {
            return Err(CodecError::InvalidConfiguration(format!(
                "fixedscaleoffset requires a float32/float64 dtype, got {dtype}"
            )));
        }
        let (astype_parsed, astype_endianness) = match astype {
            Some(astype) => {
                let (parsed, endianness) = DataType::from_v2_dtype(astype)
                    .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
                if !matches!(
                    parsed,
                    DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
                ) {
                    return Err(CodecError::InvalidConfiguration(format!(
                        "fixedscaleoffset requires an unsigned integer astype, got {astype}"
                    )));
                }
                (parsed, endianness.unwrap_or(NATIVE_ENDIAN))
            }
            None => (DataType::UInt8, NATIVE_ENDIAN),
        };
        Ok(Self {
            scale,
            offset,
            dtype: dtype_parsed,
            dtype_endianness: dtype_endianness.unwrap_or(NATIVE_ENDIAN),
            astype: astype_parsed,
            astype_endianness,
        })
    }

    /// Encoding is unsupported; the transform is applied by the data producer.
    ///
    /// # Errors
    /// Always returns [`CodecError::Unsupported`].
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(
            "the fixedscaleoffset filter is decode-only".to_string(),
        ))
    }

    /// Reconstruct `stored / scale + offset` as floats.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the input is not a whole number of storage elements.
    pub fn decode(&self, bytes: &[u8], _layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let in_size = self.astype.size();
        if bytes.len() % in_size != 0 {
            return Err(CodecError::InvalidEncodedInput(format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                self.astype
            )));
        }
        let count = bytes.len() / in_size;
        let out_size = self.dtype.size();
        let mut out = vec![0u8; count * out_size];
        for (src, dst) in std::iter::zip(
            bytes.chunks_exact(in_size),
            out.chunks_exact_mut(out_size),
        ) {
            let stored = self.read_uint(src);
            #[allow(clippy::cast_precision_loss)]
            let value = stored as f64 / self.scale + self.offset;
            self.write_float(value, dst);
        }
        Ok(out)
    }

    fn read_uint(&self, bytes: &[u8]) -> u64 {
        match self.astype {
            DataType::UInt8 => u64::from(bytes[0]),
            DataType::UInt16 => {
                let bytes = bytes[..2].try_into().unwrap();
                u64::from(match self.astype_endianness {
                    Endianness::Little => u16::from_le_bytes(bytes),
                    Endianness::Big => u16::from_be_bytes(bytes),
                })
            }
            DataType::UInt32 => {
                let bytes = bytes[..4].try_into().unwrap();
                u64::from(match self.astype_endianness {
                    Endianness::Little => u32::from_le_bytes(bytes),
                    Endianness::Big => u32::from_be_bytes(bytes),
                })
            }
            _ => {
                let bytes = bytes[..8].try_into().unwrap();
                match self.astype_endianness {
                    Endianness::Little => u64::from_le_bytes(bytes),
                    Endianness::Big => u64::from_be_bytes(bytes),
                }
            }
        }
    }

    fn write_float(&self, value: f64, bytes: &mut [u8]) {
        match self.dtype {
            DataType::Float32 => {
                #[allow(clippy::cast_possible_truncation)]
                let value = value as f32;
                let encoded = match self.dtype_endianness {
                    Endianness::Little => value.to_le_bytes(),
                    Endianness::Big => value.to_be_bytes(),
                };
                bytes[..4].copy_from_slice(&encoded);
            }
            _ => {
                let encoded = match self.dtype_endianness {
                    Endianness::Little => value.to_le_bytes(),
                    Endianness::Big => value.to_be_bytes(),
                };
                bytes[..8].copy_from_slice(&encoded);
            }
        }
    }
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: FixedScaleOffsetCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::FixedScaleOffset(FixedScaleOffsetCodec::new(
        configuration.scale,
        configuration.offset,
        &configuration.dtype,
        configuration.astype.as_deref(),
    )?))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;

    use super::*;

    #[test]
    fn fixed_scale_offset_decode() {
        // Producer stored round((x - 1000) * 10) as u8.
        let codec = FixedScaleOffsetCodec::new(10.0, 1000.0, "<f8", Some("|u1")).unwrap();
        let bytes = vec![0u8, 5, 25];
        let layout =
            ChunkLayout::new(vec![3], DataType::Float64, FillValue::from(0f64)).unwrap();
        let decoded = codec.decode(&bytes, &layout).unwrap();
        assert_eq!(f64::from_le_bytes(decoded[..8].try_into().unwrap()), 1000.0);
        assert_eq!(
            f64::from_le_bytes(decoded[8..16].try_into().unwrap()),
            1000.5
        );
        assert_eq!(
            f64::from_le_bytes(decoded[16..24].try_into().unwrap()),
            1002.5
        );
    }

    #[test]
    fn fixed_scale_offset_validation() {
        assert!(FixedScaleOffsetCodec::new(0.0, 0.0, "<f8", None).is_err());
        assert!(FixedScaleOffsetCodec::new(1.0, 0.0, "<i4", None).is_err());
        assert!(FixedScaleOffsetCodec::new(1.0, 0.0, "<f4", Some("<i2")).is_err());
    }
}
