//! The Zarr V2 `quantize` filter (decode only).
//!
//! Quantization is lossy and applied by the producer; decoding is a plain widening or
//! narrowing copy from the storage float type (`astype`) to the array float type (`dtype`).

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

/// The identifier of the `quantize` filter.
pub const IDENTIFIER: &str = "quantize";

/// The configuration of the `quantize` filter.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct QuantizeCodecConfiguration {
    /// The number of retained decimal digits (used by the encoder only).
    #[serde(default)]
    pub digits: i32,
    /// The array dtype, a Zarr V2 float dtype string.
    pub dtype: String,
    /// The storage dtype, a Zarr V2 float dtype string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub astype: Option<String>,
}

/// The `quantize` filter.
#[derive(Clone, Debug)]
pub struct QuantizeCodec {
    dtype: DataType,
    dtype_endianness: Endianness,
    astype: DataType,
    astype_endianness: Endianness,
}

fn parse_float_dtype(dtype: &str) -> Result<(DataType, Endianness), CodecError> {
    let (data_type, endianness) = DataType::from_v2_dtype(dtype)
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    if !matches!(data_type, DataType::Float32 | DataType::Float64) {
        return Err(CodecError::InvalidConfiguration(format!(
            "quantize requires a float32/float64 dtype, got {dtype}"
        )));
    }
    Ok((data_type, endianness.unwrap_or(NATIVE_ENDIAN)))
}

fn read_float(bytes: &[u8], data_type: &DataType, endianness: Endianness) -> f64 {
    match data_type {
        DataType::Float32 => {
            let bytes = bytes[..4].try_into().unwrap();
            f64::from(match endianness {
                Endianness::Little => f32::from_le_bytes(bytes),
                Endianness::Big => f32::from_be_bytes(bytes),
            })
        }
        _ => {
            let bytes = bytes[..8].try_into().unwrap();
            match endianness {
                Endianness::Little => f64::from_le_bytes(bytes),
                Endianness::Big => f64::from_be_bytes(bytes),
            }
        }
    }
}

fn write_float(value: f64, bytes: &mut [u8], data_type: &DataType, endianness: Endianness) {
    match data_type {
        DataType::Float32 => {
            #[allow(clippy::cast_possible_truncation)]
            let value = value as f32;
            let encoded = match endianness {
                Endianness::Little => value.to_le_bytes(),
                Endianness::Big => value.to_be_bytes(),
            };
            bytes[..4].copy_from_slice(&encoded);
        }
        _ => {
            let encoded = match endianness {
                Endianness::Little => value.to_le_bytes(),
                Endianness::Big => value.to_be_bytes(),
            };
            bytes[..8].copy_from_slice(&encoded);
        }
    }
}

impl QuantizeCodec {
    /// Create a new `quantize` filter from `dtype` and optional `astype` dtype strings.
    ///
    /// # Errors
    /// Returns a [`CodecError`] for non-float dtypes.
    pub fn new(dtype: &str, astype: Option<&str>) -> Result<Self, CodecError> {
        let (dtype, dtype_endianness) = parse_float_dtype(dtype)?;
        let (astype, astype_endianness) = match astype {
            Some(astype) => parse_float_dtype(astype)?,
            None => (dtype.clone(), dtype_endianness),
        };
        Ok(Self {
            dtype,
            dtype_endianness,
            astype,
            astype_endianness,
        })
    }

    /// Encoding is unsupported; quantization is applied by the data producer.
    ///
    /// # Errors
    /// Always returns [`CodecError::Unsupported`].
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(
            "the quantize filter is decode-only".to_string(),
        ))
    }

    /// Copy storage-typed floats to array-typed floats.
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
            let value = read_float(src, &self.astype, self.astype_endianness);
            write_float(value, dst, &self.dtype, self.dtype_endianness);
        }
        Ok(out)
    }
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: QuantizeCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Quantize(QuantizeCodec::new(
        &configuration.dtype,
        configuration.astype.as_deref(),
    )?))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;

    use super::*;

    #[test]
    fn quantize_decode_widens() {
        let codec = QuantizeCodec::new("<f8", Some("<f4")).unwrap();
        let mut bytes = Vec::new();
        for value in [1.25f32, -2.5, 3.75] {
            bytes.extend(value.to_le_bytes());
        }
        let layout =
            ChunkLayout::new(vec![3], DataType::Float64, FillValue::from(0f64)).unwrap();
        let decoded = codec.decode(&bytes, &layout).unwrap();
        assert_eq!(decoded.len(), 24);
        assert_eq!(f64::from_le_bytes(decoded[..8].try_into().unwrap()), 1.25);
        assert_eq!(f64::from_le_bytes(decoded[8..16].try_into().unwrap()), -2.5);
    }

    #[test]
    fn quantize_encode_unsupported() {
        let codec = QuantizeCodec::new("<f8", None).unwrap();
        assert!(matches!(codec.encode(), Err(CodecError::Unsupported(_))));
    }
}
