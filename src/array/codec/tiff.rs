//! The Zarr V2 `imagecodecs_tiff` codec (decode only).
//!
//! Decodes a chunk stored as a single-band TIFF image. Multi-band images are rejected.
//! Output bytes are little-endian ordered, matching the dtype such chunks declare.

use std::io::Cursor;

use tiff::decoder::DecodingResult;

use crate::{
    array::{chunk_layout::ChunkLayout, data_type::DataType},
    metadata::v2::MetadataV2,
};

use super::{Codec, CodecError, CodecRegistry};

/// The identifier of the `imagecodecs_tiff` codec.
pub const IDENTIFIER: &str = "imagecodecs_tiff";

/// The `imagecodecs_tiff` codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct TiffCodec;

impl TiffCodec {
    /// Create a new TIFF codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encoding is unsupported.
    ///
    /// # Errors
    /// Always returns [`CodecError::Unsupported`].
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(
            "the imagecodecs_tiff codec is decode-only".to_string(),
        ))
    }

    /// Decode a single-band TIFF image into little-endian sample bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on malformed input, a multi-band image, or a sample count
    /// mismatch with `layout`.
    pub fn decode(&self, bytes: &[u8], layout: &ChunkLayout) -> Result<Vec<u8>, CodecError> {
        let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes))
            .map_err(|err| CodecError::InvalidEncodedInput(err.to_string()))?;
        let colortype = decoder
            .colortype()
            .map_err(|err| CodecError::InvalidEncodedInput(err.to_string()))?;
        match colortype {
            tiff::ColorType::Gray(_) => {}
            other => {
                return Err(CodecError::Unsupported(format!(
                    "multi-band TIFF chunks are not supported (color type {other:?})"
                )));
            }
        }
        let image = decoder
            .read_image()
            .map_err(|err| CodecError::InvalidEncodedInput(err.to_string()))?;
        let out = match image {
            DecodingResult::U8(samples) => samples,
            DecodingResult::U16(samples) => samples_to_le_bytes(&samples, u16::to_le_bytes),
            DecodingResult::U32(samples) => samples_to_le_bytes(&samples, u32::to_le_bytes),
            DecodingResult::U64(samples) => samples_to_le_bytes(&samples, u64::to_le_bytes),
            DecodingResult::I8(samples) => samples_to_le_bytes(&samples, i8::to_le_bytes),
            DecodingResult::I16(samples) => samples_to_le_bytes(&samples, i16::to_le_bytes),
            DecodingResult::I32(samples) => samples_to_le_bytes(&samples, i32::to_le_bytes),
            DecodingResult::I64(samples) => samples_to_le_bytes(&samples, i64::to_le_bytes),
            DecodingResult::F32(samples) => samples_to_le_bytes(&samples, f32::to_le_bytes),
            DecodingResult::F64(samples) => samples_to_le_bytes(&samples, f64::to_le_bytes),
        };
        if out.len() != layout.byte_size() {
            return Err(CodecError::UnexpectedDecodedSize(
                out.len(),
                layout.byte_size(),
            ));
        }
        Ok(out)
    }
}

fn samples_to_le_bytes<T: Copy, const N: usize>(
    samples: &[T],
    to_le_bytes: fn(T) -> [u8; N],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * N);
    for &sample in samples {
        out.extend(to_le_bytes(sample));
    }
    out
}

pub(crate) fn create_codec_v2(
    _registry: &CodecRegistry,
    _metadata: &MetadataV2,
    _data_type: &DataType,
) -> Result<Codec, CodecError> {
    Ok(Codec::Tiff(TiffCodec::new()))
}

#[cfg(test)]
mod tests {
    use crate::array::fill_value::FillValue;

    use super::*;

    fn encode_gray_tiff(width: u32, height: u32, samples: &[u8]) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(&mut bytes).unwrap();
            encoder
                .write_image::<tiff::encoder::colortype::Gray8>(width, height, samples)
                .unwrap();
        }
        bytes.into_inner()
    }

    #[test]
    fn tiff_decode_single_band() {
        let samples: Vec<u8> = (0..24).collect();
        let encoded = encode_gray_tiff(6, 4, &samples);
        let layout =
            ChunkLayout::new(vec![4, 6], DataType::UInt8, FillValue::from(0u8)).unwrap();
        let codec = TiffCodec::new();
        assert_eq!(codec.decode(&encoded, &layout).unwrap(), samples);
    }

    #[test]
    fn tiff_encode_unsupported() {
        assert!(matches!(
            TiffCodec::new().encode(),
            Err(CodecError::Unsupported(_))
        ));
    }

    #[test]
    fn tiff_decode_size_mismatch() {
        let samples: Vec<u8> = (0..24).collect();
        let encoded = encode_gray_tiff(6, 4, &samples);
        let layout =
            ChunkLayout::new(vec![5, 6], DataType::UInt8, FillValue::from(0u8)).unwrap();
        assert!(TiffCodec::new().decode(&encoded, &layout).is_err());
    }
}
