//! The `bytes` codec: endianness of multi-byte elements.
//!
//! Encodes a chunk in the declared byte order, swapping per element (or per component for
//! complex and compound types) when the declared order differs from the host.

use serde::{Deserialize, Serialize};

use crate::{
    array::{
        chunk_layout::ChunkLayout,
        data_type::DataType,
        endianness::{Endianness, NATIVE_ENDIAN},
    },
    metadata::v3::MetadataV3,
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `bytes` codec.
pub const IDENTIFIER: &str = "bytes";

/// The configuration of the `bytes` codec.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BytesCodecConfiguration {
    /// The declared byte order; may be omitted for single-byte data types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endian: Option<Endianness>,
}

/// The `bytes` codec.
#[derive(Clone, Copy, Debug)]
pub struct BytesCodec {
    endian: Option<Endianness>,
}

impl BytesCodec {
    /// Create a new `bytes` codec with an optional declared `endian`.
    #[must_use]
    pub const fn new(endian: Option<Endianness>) -> Self {
        Self { endian }
    }

    /// Create a new little-endian `bytes` codec.
    #[must_use]
    pub const fn little() -> Self {
        Self::new(Some(Endianness::Little))
    }

    /// The declared byte order.
    #[must_use]
    pub const fn endian(&self) -> Option<Endianness> {
        self.endian
    }

    fn swap_if_needed(&self, mut bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let Some(endian) = self.endian else {
            // An omitted endianness is only valid for single-byte types.
            return match layout.data_type().swap_size() {
                Some(1) => Ok(bytes),
                _ => Err(CodecError::InvalidConfiguration(format!(
                    "the bytes codec must declare an endianness for data type {}",
                    layout.data_type()
                ))),
            };
        };
        if !endian.is_native() {
            swap_element_bytes(&mut bytes, layout.data_type())?;
        }
        Ok(bytes)
    }

    /// Encode a chunk into the declared byte order.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if no endianness is declared for a multi-byte data type.
    pub fn encode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        self.swap_if_needed(bytes, layout)
    }

    /// Decode a chunk from the declared byte order into host order.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if no endianness is declared for a multi-byte data type.
    pub fn decode(&self, bytes: Vec<u8>, layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        self.swap_if_needed(bytes, layout)
    }

    /// The Zarr V3 metadata of the codec.
    #[must_use]
    pub fn v3_metadata(&self) -> MetadataV3 {
        MetadataV3::new_with_configuration(
            IDENTIFIER,
            &BytesCodecConfiguration { endian: self.endian },
        )
        .expect("the configuration is serializable")
    }
}

impl Default for BytesCodec {
    fn default() -> Self {
        Self::new(Some(NATIVE_ENDIAN))
    }
}

/// Reverse the bytes of every endian-sensitive unit of `bytes` for `data_type`, in place.
///
/// Compound types are swapped field by field.
///
/// # Errors
/// Returns a [`CodecError`] if the buffer is not a whole number of elements.
pub fn swap_element_bytes(bytes: &mut [u8], data_type: &DataType) -> Result<(), CodecError> {
    let element_size = data_type.size();
    if element_size == 0 || bytes.len() % element_size != 0 {
        return Err(CodecError::InvalidEncodedInput(format!(
            "{} bytes is not a whole number of {element_size} byte elements",
            bytes.len()
        )));
    }
    match data_type.swap_size() {
        Some(1) => {}
        Some(swap) => {
            for unit in bytes.chunks_exact_mut(swap) {
                unit.reverse();
            }
        }
        None => {
            let DataType::Compound(fields) = data_type else {
                unreachable!("only compound types have no swap size")
            };
            for element in bytes.chunks_exact_mut(element_size) {
                let mut offset = 0;
                for field in fields {
                    let field_size = field.data_type.size();
                    swap_element_bytes(&mut element[offset..offset + field_size], &field.data_type)?;
                    offset += field_size;
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn create_codec_v3(
    _registry: &CodecRegistry,
    metadata: &MetadataV3,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: BytesCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Bytes(BytesCodec::new(configuration.endian)))
}

#[cfg(test)]
mod tests {
    use crate::array::{data_type::CompoundField, fill_value::FillValue};

    use super::*;

    fn layout(data_type: DataType) -> ChunkLayout {
        let fill = FillValue::from(vec![0u8; data_type.size()]);
        ChunkLayout::new(vec![2], data_type, fill).unwrap()
    }

    #[test]
    fn bytes_codec_native_noop() {
        let codec = BytesCodec::new(Some(NATIVE_ENDIAN));
        let bytes = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let encoded = codec.encode(bytes.clone(), &layout(DataType::UInt32)).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn bytes_codec_swapped_roundtrip() {
        let foreign = match NATIVE_ENDIAN {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        };
        let codec = BytesCodec::new(Some(foreign));
        let layout = layout(DataType::UInt32);
        let bytes = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let encoded = codec.encode(bytes.clone(), &layout).unwrap();
        assert_eq!(encoded, vec![4, 3, 2, 1, 8, 7, 6, 5]);
        assert_eq!(codec.decode(encoded, &layout).unwrap(), bytes);
    }

    #[test]
    fn bytes_codec_endian_required_for_multibyte() {
        let codec = BytesCodec::new(None);
        assert!(codec.encode(vec![0; 8], &layout(DataType::UInt32)).is_err());
        assert!(codec.encode(vec![0, 1], &layout(DataType::UInt8)).is_ok());
    }

    #[test]
    fn swap_compound_fields() {
        let compound = DataType::Compound(vec![
            CompoundField {
                name: "a".to_string(),
                data_type: DataType::UInt16,
            },
            CompoundField {
                name: "b".to_string(),
                data_type: DataType::UInt32,
            },
        ]);
        let mut bytes = vec![0u8, 1, 2, 3, 4, 5];
        swap_element_bytes(&mut bytes, &compound).unwrap();
        assert_eq!(bytes, vec![1, 0, 5, 4, 3, 2]);
    }
}
