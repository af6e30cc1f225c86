//! The Zarr V2 `delta` filter.
//!
//! Stores the difference between consecutive elements; decoding reconstructs the cumulative
//! sums. The element type is declared by the filter configuration, not the array dtype.

use serde::{Deserialize, Serialize};

use crate::{
    array::{
        data_type::DataType,
        endianness::{Endianness, NATIVE_ENDIAN},
    },
    metadata::v2::MetadataV2,
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `delta` filter.
pub const IDENTIFIER: &str = "delta";

/// The configuration of the `delta` filter.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct DeltaCodecConfiguration {
    /// The element dtype, a Zarr V2 dtype string.
    pub dtype: String,
    /// The storage dtype; must equal `dtype` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub astype: Option<String>,
}

/// The `delta` filter.
#[derive(Clone, Debug)]
pub struct DeltaCodec {
    data_type: DataType,
    endianness: Endianness,
    dtype: String,
}

trait DeltaLane: Copy {
    const SIZE: usize;
    fn read(bytes: &[u8], endianness: Endianness) -> Self;
    fn write(self, bytes: &mut [u8], endianness: Endianness);
    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
}

macro_rules! impl_delta_lane_int {
    ($($t:ty),*) => {
        $(
            impl DeltaLane for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                fn read(bytes: &[u8], endianness: Endianness) -> Self {
                    let bytes = bytes[..Self::SIZE].try_into().unwrap();
                    match endianness {
                        Endianness::Little => <$t>::from_le_bytes(bytes),
                        Endianness::Big => <$t>::from_be_bytes(bytes),
                    }
                }
                fn write(self, bytes: &mut [u8], endianness: Endianness) {
                    let encoded = match endianness {
                        Endianness::Little => self.to_le_bytes(),
                        Endianness::Big => self.to_be_bytes(),
                    };
                    bytes[..Self::SIZE].copy_from_slice(&encoded);
                }
                fn add(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }
                fn sub(self, other: Self) -> Self {
                    self.wrapping_sub(other)
                }
            }
        )*
    };
}
impl_delta_lane_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! impl_delta_lane_float {
    ($($t:ty),*) => {
        $(
            impl DeltaLane for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                fn read(bytes: &[u8], endianness: Endianness) -> Self {
                    let bytes = bytes[..Self::SIZE].try_into().unwrap();
                    match endianness {
                        Endianness::Little => <$t>::from_le_bytes(bytes),
                        Endianness::Big => <$t>::from_be_bytes(bytes),
                    }
                }
                fn write(self, bytes: &mut [u8], endianness: Endianness) {
                    let encoded = match endianness {
                        Endianness::Little => self.to_le_bytes(),
                        Endianness::Big => self.to_be_bytes(),
                    };
                    bytes[..Self::SIZE].copy_from_slice(&encoded);
                }
                fn add(self, other: Self) -> Self {
                    self + other
                }
                fn sub(self, other: Self) -> Self {
                    self - other
                }
            }
        )*
    };
}
impl_delta_lane_float!(f32, f64);

fn delta_encode<T: DeltaLane>(bytes: &[u8], endianness: Endianness) -> Vec<u8> {
    let mut out = vec![0u8; bytes.len()];
    let mut previous: Option<T> = None;
    for (src, dst) in std::iter::zip(bytes.chunks_exact(T::SIZE), out.chunks_exact_mut(T::SIZE)) {
        let value = T::read(src, endianness);
        let delta = previous.map_or(value, |previous| value.sub(previous));
        delta.write(dst, endianness);
        previous = Some(value);
    }
    out
}

fn delta_decode<T: DeltaLane>(bytes: &[u8], endianness: Endianness) -> Vec<u8> {
    let mut out = vec![0u8; bytes.len()];
    let mut accumulator: Option<T> = None;
    for (src, dst) in std::iter::zip(bytes.chunks_exact(T::SIZE), out.chunks_exact_mut(T::SIZE)) {
        let delta = T::read(src, endianness);
        let value = accumulator.map_or(delta, |accumulator| accumulator.add(delta));
        value.write(dst, endianness);
        accumulator = Some(value);
    }
    out
}

impl DeltaCodec {
    /// Create a new `delta` filter for the Zarr V2 dtype string `dtype`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] for an unknown dtype or a non-numeric, complex or
    /// half-float dtype.
    pub fn new(dtype: &str) -> Result<Self, CodecError> {
        let (data_type, endianness) = DataType::from_v2_dtype(dtype)
            .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
        if !data_type.is_numeric() || data_type.is_complex() || data_type == DataType::Float16 {
            return Err(CodecError::InvalidConfiguration(format!(
                "delta does not support dtype {dtype}"
            )));
        }
        Ok(Self {
            data_type,
            endianness: endianness.unwrap_or(NATIVE_ENDIAN),
            dtype: dtype.to_string(),
        })
    }

    fn check_length(&self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() % self.data_type.size() != 0 {
            return Err(CodecError::InvalidEncodedInput(format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                self.data_type
            )));
        }
        Ok(())
    }

    fn apply(&self, bytes: &[u8], encode: bool) -> Vec<u8> {
        let e = self.endianness;
        match self.data_type {
            DataType::Int8 => if encode { delta_encode::<i8>(bytes, e) } else { delta_decode::<i8>(bytes, e) },
            DataType::Int16 => if encode { delta_encode::<i16>(bytes, e) } else { delta_decode::<i16>(bytes, e) },
            DataType::Int32 => if encode { delta_encode::<i32>(bytes, e) } else { delta_decode::<i32>(bytes, e) },
            DataType::Int64 => if encode { delta_encode::<i64>(bytes, e) } else { delta_decode::<i64>(bytes, e) },
            DataType::Bool | DataType::UInt8 => if encode { delta_encode::<u8>(bytes, e) } else { delta_decode::<u8>(bytes, e) },
            DataType::UInt16 => if encode { delta_encode::<u16>(bytes, e) } else { delta_decode::<u16>(bytes, e) },
            DataType::UInt32 => if encode { delta_encode::<u32>(bytes, e) } else { delta_decode::<u32>(bytes, e) },
            DataType::UInt64 => if encode { delta_encode::<u64>(bytes, e) } else { delta_decode::<u64>(bytes, e) },
            DataType::Float32 => if encode { delta_encode::<f32>(bytes, e) } else { delta_decode::<f32>(bytes, e) },
            DataType::Float64 => if encode { delta_encode::<f64>(bytes, e) } else { delta_decode::<f64>(bytes, e) },
            _ => unreachable!("rejected at construction"),
        }
    }

    /// Store element differences.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the input is not a whole number of elements.
    pub fn encode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        self.check_length(&bytes)?;
        Ok(self.apply(&bytes, true))
    }

    /// Reconstruct cumulative sums.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the input is not a whole number of elements.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        self.check_length(&bytes)?;
        Ok(self.apply(&bytes, false))
    }

    /// The Zarr V2 metadata of the filter.
    #[must_use]
    pub fn v2_metadata(&self) -> MetadataV2 {
        MetadataV2::new_with_configuration(
            IDENTIFIER,
            &DeltaCodecConfiguration {
                dtype: self.dtype.clone(),
                astype: None,
            },
        )
        .expect("the configuration is serializable")
    }
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: DeltaCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    if let Some(astype) = &configuration.astype {
        if astype != &configuration.dtype {
            return Err(CodecError::Unsupported(format!(
                "delta with astype {astype} != dtype {} is not supported",
                configuration.dtype
            )));
        }
    }
    Ok(Codec::Delta(DeltaCodec::new(&configuration.dtype)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_roundtrip_i32() {
        let codec = DeltaCodec::new("<i4").unwrap();
        let values: Vec<i32> = vec![10, 13, 13, 7, -2, 100];
        let mut bytes = Vec::new();
        for value in &values {
            bytes.extend(value.to_le_bytes());
        }
        let encoded = codec.encode(bytes.clone()).unwrap();
        let first = i32::from_le_bytes(encoded[..4].try_into().unwrap());
        let second = i32::from_le_bytes(encoded[4..8].try_into().unwrap());
        assert_eq!(first, 10);
        assert_eq!(second, 3);
        assert_eq!(codec.decode(encoded).unwrap(), bytes);
    }

    #[test]
    fn delta_roundtrip_big_endian_float() {
        let codec = DeltaCodec::new(">f8").unwrap();
        let mut bytes = Vec::new();
        for value in [1.5f64, 2.25, -4.0] {
            bytes.extend(value.to_be_bytes());
        }
        let encoded = codec.encode(bytes.clone()).unwrap();
        assert_eq!(codec.decode(encoded).unwrap(), bytes);
    }

    #[test]
    fn delta_rejects_unsupported_dtypes() {
        assert!(DeltaCodec::new("<c8").is_err());
        assert!(DeltaCodec::new("|S4").is_err());
        assert!(DeltaCodec::new("<f2").is_err());
    }
}
