//! The `transpose` codec: chunk axis permutation.
//!
//! The encoded chunk has its axes permuted by the configured order; decoding applies the
//! inverse permutation. The `"F"` alias denotes the reversed axis order and is how Zarr V2
//! `order: "F"` chunks are represented; identity permutations are detected and skipped.

use serde::{Deserialize, Serialize};

use crate::{
    array::{chunk_layout::ChunkLayout, data_type::DataType},
    metadata::v3::MetadataV3,
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `transpose` codec.
pub const IDENTIFIER: &str = "transpose";

/// The configured order of the `transpose` codec.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TransposeOrder {
    /// The identity order (`"C"`), a no-op.
    C,
    /// The reversed order (`"F"`).
    F,
    /// An explicit axis permutation.
    Permutation(Vec<usize>),
}

impl Serialize for TransposeOrder {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::C => serializer.serialize_str("C"),
            Self::F => serializer.serialize_str("F"),
            Self::Permutation(permutation) => permutation.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TransposeOrder {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OrderForm {
            Alias(String),
            Permutation(Vec<usize>),
        }
        match OrderForm::deserialize(d)? {
            OrderForm::Alias(alias) => match alias.as_str() {
                "C" => Ok(Self::C),
                "F" => Ok(Self::F),
                _ => Err(serde::de::Error::custom(format!(
                    "invalid transpose order {alias}, must be C, F or a permutation"
                ))),
            },
            OrderForm::Permutation(permutation) => Ok(Self::Permutation(permutation)),
        }
    }
}

/// The configuration of the `transpose` codec.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct TransposeCodecConfiguration {
    /// The axis order of the encoded chunk.
    pub order: TransposeOrder,
}

/// The `transpose` codec.
#[derive(Clone, Debug)]
pub struct TransposeCodec {
    order: TransposeOrder,
}

impl TransposeCodec {
    /// Create a new `transpose` codec.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if an explicit order is not a permutation of `0..n`.
    pub fn new(order: TransposeOrder) -> Result<Self, CodecError> {
        if let TransposeOrder::Permutation(permutation) = &order {
            let mut seen = vec![false; permutation.len()];
            for &axis in permutation {
                if axis >= permutation.len() || seen[axis] {
                    return Err(CodecError::InvalidConfiguration(format!(
                        "transpose order {permutation:?} is not a permutation of 0..{}",
                        permutation.len()
                    )));
                }
                seen[axis] = true;
            }
        }
        Ok(Self { order })
    }

    /// Create the reversed-order (`"F"`) transpose codec.
    #[must_use]
    pub fn f_order() -> Self {
        Self {
            order: TransposeOrder::F,
        }
    }

    /// The permutation for a chunk of `dimensionality` axes, or [`None`] when this codec is
    /// a no-op.
    #[must_use]
    pub fn permutation(&self, dimensionality: usize) -> Option<Vec<usize>> {
        let permutation = match &self.order {
            TransposeOrder::C => return None,
            TransposeOrder::F => (0..dimensionality).rev().collect(),
            TransposeOrder::Permutation(permutation) => permutation.clone(),
        };
        // Identity permutations are skipped.
        permutation
            .iter()
            .enumerate()
            .any(|(axis, &to)| axis != to)
            .then_some(permutation)
    }

    /// Permute chunk axes into the encoded order.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `bytes` does not match `layout`.
    pub fn encode(&self, bytes: &[u8], layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let Some(permutation) = self.permutation(layout.shape().len()) else {
            return Ok(bytes.to_vec());
        };
        permute_chunk(bytes, layout.shape(), &permutation, layout.element_size())
    }

    /// Apply the inverse permutation back to decoded order.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `bytes` does not match `layout`.
    pub fn decode(&self, bytes: &[u8], layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let Some(permutation) = self.permutation(layout.shape().len()) else {
            return Ok(bytes.to_vec());
        };
        // The encoded chunk has permuted shape; invert the permutation.
        let encoded_shape: Vec<u64> = permutation.iter().map(|&axis| layout.shape()[axis]).collect();
        let mut inverse = vec![0; permutation.len()];
        for (axis, &to) in permutation.iter().enumerate() {
            inverse[to] = axis;
        }
        permute_chunk(bytes, &encoded_shape, &inverse, layout.element_size())
    }

    /// The Zarr V3 metadata of the codec.
    #[must_use]
    pub fn v3_metadata(&self) -> MetadataV3 {
        MetadataV3::new_with_configuration(
            IDENTIFIER,
            &TransposeCodecConfiguration {
                order: self.order.clone(),
            },
        )
        .expect("the configuration is serializable")
    }
}

/// Permute the axes of a row-major chunk.
///
/// The data is viewed as an n+1 dimensional `u8` array whose trailing axis is the element
/// bytes, so arbitrary element sizes transpose without a typed copy.
fn permute_chunk(
    bytes: &[u8],
    shape: &[u64],
    permutation: &[usize],
    element_size: usize,
) -> Result<Vec<u8>, CodecError> {
    let mut shape_bytes: Vec<usize> = shape
        .iter()
        .map(|&size| usize::try_from(size).unwrap())
        .collect();
    shape_bytes.push(element_size);
    let mut permutation_bytes: Vec<usize> = permutation.to_vec();
    permutation_bytes.push(shape.len());

    let view = ndarray::ArrayViewD::from_shape(shape_bytes, bytes).map_err(|_| {
        CodecError::UnexpectedDecodedSize(
            bytes.len(),
            shape.iter().product::<u64>() as usize * element_size,
        )
    })?;
    let transposed = view.permuted_axes(permutation_bytes);
    Ok(transposed.as_standard_layout().into_owned().into_raw_vec())
}

pub(crate) fn create_codec_v3(
    _registry: &CodecRegistry,
    metadata: &MetadataV3,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    let configuration: TransposeCodecConfiguration = metadata
        .to_configuration()
        .map_err(|err| CodecError::InvalidConfiguration(err.to_string()))?;
    Ok(Codec::Transpose(TransposeCodec::new(configuration.order)?))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;

    use super::*;

    fn layout(shape: Vec<u64>, data_type: DataType) -> ChunkLayout {
        let fill = FillValue::from(vec![0u8; data_type.size()]);
        ChunkLayout::new(shape, data_type, fill).unwrap()
    }

    #[test]
    fn transpose_f_roundtrip() {
        let codec = TransposeCodec::f_order();
        let layout = layout(vec![2, 3], DataType::UInt8);
        let bytes = vec![0u8, 1, 2, 3, 4, 5];
        let encoded = codec.encode(&bytes, &layout).unwrap();
        // Column-major order of a 2x3 chunk.
        assert_eq!(encoded, vec![0, 3, 1, 4, 2, 5]);
        assert_eq!(codec.decode(&encoded, &layout).unwrap(), bytes);
    }

    #[test]
    fn transpose_permutation_roundtrip_u16() {
        let codec = TransposeCodec::new(TransposeOrder::Permutation(vec![0, 2, 1])).unwrap();
        let layout = layout(vec![2, 2, 3], DataType::UInt16);
        let bytes: Vec<u8> = (0..24).collect();
        let encoded = codec.encode(&bytes, &layout).unwrap();
        assert_eq!(codec.decode(&encoded, &layout).unwrap(), bytes);
    }

    #[test]
    fn transpose_identity_skipped() {
        let codec = TransposeCodec::new(TransposeOrder::Permutation(vec![0, 1])).unwrap();
        assert!(codec.permutation(2).is_none());
        let codec = TransposeCodec::new(TransposeOrder::C).unwrap();
        assert!(codec.permutation(3).is_none());
        // F of a 1-D chunk is the identity.
        let codec = TransposeCodec::f_order();
        assert!(codec.permutation(1).is_none());
    }

    #[test]
    fn transpose_invalid_permutation() {
        assert!(TransposeCodec::new(TransposeOrder::Permutation(vec![0, 0])).is_err());
        assert!(TransposeCodec::new(TransposeOrder::Permutation(vec![1, 2])).is_err());
    }

    #[test]
    fn transpose_order_serde() {
        let configuration: TransposeCodecConfiguration =
            serde_json::from_str(r#"{"order": [2, 0, 1]}"#).unwrap();
        assert_eq!(
            configuration.order,
            TransposeOrder::Permutation(vec![2, 0, 1])
        );
        let configuration: TransposeCodecConfiguration =
            serde_json::from_str(r#"{"order": "F"}"#).unwrap();
        assert_eq!(configuration.order, TransposeOrder::F);
        assert!(serde_json::from_str::<TransposeCodecConfiguration>(r#"{"order": "X"}"#).is_err());
    }
}
