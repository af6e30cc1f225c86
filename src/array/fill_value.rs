//! Fill values.
//!
//! A [`FillValue`] holds the native-layout bytes of one array element, used for any chunk
//! not present in the store.

use thiserror::Error;

use crate::metadata::FillValueMetadata;

use super::data_type::DataType;

/// The fill value of an array, as the native-layout bytes of one element.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FillValue(Vec<u8>);

/// An incompatible fill value error.
#[derive(Clone, Debug, Error)]
#[error("fill value {0} is incompatible with data type {1}")]
pub struct IncompatibleFillValueError(String, String);

impl core::fmt::Display for FillValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Vec<u8>> for FillValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for FillValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<bool> for FillValue {
    fn from(value: bool) -> Self {
        Self(vec![u8::from(value)])
    }
}

macro_rules! impl_fill_value_from_ne_bytes {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FillValue {
                fn from(value: $t) -> Self {
                    Self(value.to_ne_bytes().to_vec())
                }
            }
        )*
    };
}
impl_fill_value_from_ne_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl From<half::f16> for FillValue {
    fn from(value: half::f16) -> Self {
        Self(value.to_ne_bytes().to_vec())
    }
}

impl From<num_complex::Complex32> for FillValue {
    fn from(value: num_complex::Complex32) -> Self {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend(value.re.to_ne_bytes());
        bytes.extend(value.im.to_ne_bytes());
        Self(bytes)
    }
}

impl From<num_complex::Complex64> for FillValue {
    fn from(value: num_complex::Complex64) -> Self {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend(value.re.to_ne_bytes());
        bytes.extend(value.im.to_ne_bytes());
        Self(bytes)
    }
}

impl FillValue {
    /// The fill value bytes in native layout.
    #[must_use]
    pub fn as_ne_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The size of the fill value in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Return true if every element of `bytes` equals the fill value.
    ///
    /// The comparison is bitwise, so a NaN fill value matches only the identical NaN bit
    /// pattern (complex components included).
    #[must_use]
    pub fn equals_all(&self, bytes: &[u8]) -> bool {
        if self.0.is_empty() || bytes.len() % self.0.len() != 0 {
            return false;
        }
        if self.0.iter().all(|&b| b == 0) {
            // Zero fill short-circuits to a bytewise scan.
            return bytes.iter().all(|&b| b == 0);
        }
        bytes
            .chunks_exact(self.0.len())
            .all(|element| element == self.0.as_slice())
    }

    /// The all-zero fill value for `data_type`, used when no fill value is declared.
    #[must_use]
    pub fn zero(data_type: &DataType) -> Self {
        Self(vec![0; data_type.size()])
    }

    /// Parse fill value metadata for `data_type`.
    ///
    /// Returns [`None`] for a `null` fill value.
    ///
    /// # Errors
    /// Returns [`IncompatibleFillValueError`] if the metadata cannot represent an element of
    /// `data_type`.
    pub fn from_metadata(
        data_type: &DataType,
        metadata: &FillValueMetadata,
    ) -> Result<Option<Self>, IncompatibleFillValueError> {
        let err = || IncompatibleFillValueError(format!("{metadata:?}"), data_type.to_string());
        if matches!(metadata, FillValueMetadata::Null) {
            return Ok(None);
        }
        if let FillValueMetadata::Hex(hex) = metadata {
            // A hex string is the big-endian bit pattern of one element.
            let mut bytes = decode_hex(hex).ok_or_else(err)?;
            if bytes.len() != data_type.size() {
                return Err(err());
            }
            if cfg!(target_endian = "little") {
                if let Some(swap) = data_type.swap_size() {
                    for element in bytes.chunks_exact_mut(swap) {
                        element.reverse();
                    }
                }
            }
            return Ok(Some(Self(bytes)));
        }
        let fill = match data_type {
            DataType::Bool => match metadata {
                FillValueMetadata::Bool(b) => Self::from(*b),
                FillValueMetadata::Number(number) => {
                    Self::from(number.as_u64().ok_or_else(err)? != 0)
                }
                _ => return Err(err()),
            },
            DataType::Int8 => Self::from(i8::try_from(int_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::Int16 => Self::from(i16::try_from(int_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::Int32 => Self::from(i32::try_from(int_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::Int64 => Self::from(int_of(metadata).ok_or_else(err)?),
            DataType::UInt8 => Self::from(u8::try_from(uint_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::UInt16 => Self::from(u16::try_from(uint_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::UInt32 => Self::from(u32::try_from(uint_of(metadata).ok_or_else(err)?).map_err(|_| err())?),
            DataType::UInt64 => Self::from(uint_of(metadata).ok_or_else(err)?),
            DataType::Float16 => {
                Self::from(half::f16::from_f64(float_of(metadata).ok_or_else(err)?))
            }
            DataType::Float32 => {
                #[allow(clippy::cast_possible_truncation)]
                Self::from(float_of(metadata).ok_or_else(err)? as f32)
            }
            DataType::Float64 => Self::from(float_of(metadata).ok_or_else(err)?),
            DataType::Complex64 | DataType::Complex128 => {
                let (re, im) = match metadata {
                    FillValueMetadata::Complex(re, im) => (
                        float_of(re).ok_or_else(err)?,
                        float_of(im).ok_or_else(err)?,
                    ),
                    other => (float_of(other).ok_or_else(err)?, 0.0),
                };
                if matches!(data_type, DataType::Complex64) {
                    #[allow(clippy::cast_possible_truncation)]
                    Self::from(num_complex::Complex32::new(re as f32, im as f32))
                } else {
                    Self::from(num_complex::Complex64::new(re, im))
                }
            }
            DataType::Ascii(n) => {
                let FillValueMetadata::String(string) = metadata else {
                    return Err(err());
                };
                if !string.is_ascii() || string.len() > *n {
                    return Err(err());
                }
                let mut bytes = string.as_bytes().to_vec();
                bytes.resize(*n, 0);
                Self(bytes)
            }
            DataType::Unicode(n) => {
                let FillValueMetadata::String(string) = metadata else {
                    return Err(err());
                };
                let units: Vec<char> = string.chars().collect();
                if units.len() > *n {
                    return Err(err());
                }
                let mut bytes = Vec::with_capacity(4 * n);
                for unit in &units {
                    bytes.extend((*unit as u32).to_ne_bytes());
                }
                bytes.resize(4 * n, 0);
                Self(bytes)
            }
            DataType::Compound(_) => return Err(err()),
        };
        Ok(Some(fill))
    }

    /// Serialize the fill value as metadata for `data_type`.
    ///
    /// Non-finite floats serialize as the `"NaN"`/`"Infinity"`/`"-Infinity"` keywords;
    /// complex values as two-element arrays.
    ///
    /// # Errors
    /// Returns [`IncompatibleFillValueError`] if the fill value size does not match
    /// `data_type`.
    pub fn to_metadata(
        &self,
        data_type: &DataType,
    ) -> Result<FillValueMetadata, IncompatibleFillValueError> {
        let err = || IncompatibleFillValueError(self.to_string(), data_type.to_string());
        if self.0.len() != data_type.size() {
            return Err(err());
        }
        Ok(match data_type {
            DataType::Bool => FillValueMetadata::Bool(self.0[0] != 0),
            DataType::Int8 => int_metadata(i64::from(self.0[0] as i8)),
            DataType::Int16 => {
                int_metadata(i64::from(i16::from_ne_bytes(self.0[..2].try_into().unwrap())))
            }
            DataType::Int32 => {
                int_metadata(i64::from(i32::from_ne_bytes(self.0[..4].try_into().unwrap())))
            }
            DataType::Int64 => int_metadata(i64::from_ne_bytes(self.0[..8].try_into().unwrap())),
            DataType::UInt8 => uint_metadata(u64::from(self.0[0])),
            DataType::UInt16 => {
                uint_metadata(u64::from(u16::from_ne_bytes(self.0[..2].try_into().unwrap())))
            }
            DataType::UInt32 => {
                uint_metadata(u64::from(u32::from_ne_bytes(self.0[..4].try_into().unwrap())))
            }
            DataType::UInt64 => uint_metadata(u64::from_ne_bytes(self.0[..8].try_into().unwrap())),
            DataType::Float16 => {
                float_metadata(half::f16::from_ne_bytes(self.0[..2].try_into().unwrap()).to_f64())
            }
            DataType::Float32 => {
                float_metadata(f64::from(f32::from_ne_bytes(self.0[..4].try_into().unwrap())))
            }
            DataType::Float64 => float_metadata(f64::from_ne_bytes(self.0[..8].try_into().unwrap())),
            DataType::Complex64 => {
                let re = f32::from_ne_bytes(self.0[..4].try_into().unwrap());
                let im = f32::from_ne_bytes(self.0[4..8].try_into().unwrap());
                FillValueMetadata::Complex(
                    Box::new(float_metadata(f64::from(re))),
                    Box::new(float_metadata(f64::from(im))),
                )
            }
            DataType::Complex128 => {
                let re = f64::from_ne_bytes(self.0[..8].try_into().unwrap());
                let im = f64::from_ne_bytes(self.0[8..16].try_into().unwrap());
                FillValueMetadata::Complex(
                    Box::new(float_metadata(re)),
                    Box::new(float_metadata(im)),
                )
            }
            DataType::Ascii(_) => {
                let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
                FillValueMetadata::String(
                    String::from_utf8(self.0[..end].to_vec()).map_err(|_| err())?,
                )
            }
            DataType::Unicode(_) => {
                let mut string = String::new();
                for unit in self.0.chunks_exact(4) {
                    let unit = u32::from_ne_bytes(unit.try_into().unwrap());
                    if unit == 0 {
                        break;
                    }
                    string.push(char::from_u32(unit).ok_or_else(err)?);
                }
                FillValueMetadata::String(string)
            }
            DataType::Compound(_) => return Err(err()),
        })
    }
}

fn int_of(metadata: &FillValueMetadata) -> Option<i64> {
    match metadata {
        FillValueMetadata::Number(number) => number.as_i64(),
        _ => None,
    }
}

fn uint_of(metadata: &FillValueMetadata) -> Option<u64> {
    match metadata {
        FillValueMetadata::Number(number) => number.as_u64(),
        _ => None,
    }
}

fn float_of(metadata: &FillValueMetadata) -> Option<f64> {
    match metadata {
        FillValueMetadata::Number(number) => number.as_f64(),
        FillValueMetadata::NaN => Some(f64::NAN),
        FillValueMetadata::Infinity => Some(f64::INFINITY),
        FillValueMetadata::NegInfinity => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn int_metadata(value: i64) -> FillValueMetadata {
    FillValueMetadata::Number(serde_json::Number::from(value))
}

fn uint_metadata(value: u64) -> FillValueMetadata {
    FillValueMetadata::Number(serde_json::Number::from(value))
}

fn float_metadata(value: f64) -> FillValueMetadata {
    if value.is_nan() {
        FillValueMetadata::NaN
    } else if value == f64::INFINITY {
        FillValueMetadata::Infinity
    } else if value == f64::NEG_INFINITY {
        FillValueMetadata::NegInfinity
    } else {
        serde_json::Number::from_f64(value).map_or(FillValueMetadata::NaN, FillValueMetadata::Number)
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let digits = hex.strip_prefix("0x")?;
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_value_equals_all() {
        let fill = FillValue::from(-1i32);
        let mut chunk = Vec::new();
        for _ in 0..4 {
            chunk.extend((-1i32).to_ne_bytes());
        }
        assert!(fill.equals_all(&chunk));
        chunk[5] = 0;
        assert!(!fill.equals_all(&chunk));

        let zero = FillValue::zero(&DataType::Float64);
        assert!(zero.equals_all(&vec![0u8; 64]));
    }

    #[test]
    fn fill_value_nan_bitwise() {
        let fill = FillValue::from(f32::NAN);
        let mut chunk = Vec::new();
        chunk.extend(f32::NAN.to_ne_bytes());
        chunk.extend(f32::NAN.to_ne_bytes());
        assert!(fill.equals_all(&chunk));
    }

    #[test]
    fn fill_value_from_metadata_numeric() {
        let fill = FillValue::from_metadata(
            &DataType::Int32,
            &FillValueMetadata::Number(serde_json::Number::from(-1)),
        )
        .unwrap()
        .unwrap();
        assert_eq!(fill, FillValue::from(-1i32));

        let fill = FillValue::from_metadata(&DataType::Float32, &FillValueMetadata::NaN)
            .unwrap()
            .unwrap();
        assert!(f32::from_ne_bytes(fill.as_ne_bytes().try_into().unwrap()).is_nan());

        assert!(
            FillValue::from_metadata(&DataType::UInt8, &FillValueMetadata::Number(256.into()))
                .is_err()
        );
        assert!(
            FillValue::from_metadata(&DataType::Int32, &FillValueMetadata::Null)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn fill_value_hex_bit_pattern() {
        let fill =
            FillValue::from_metadata(&DataType::Float32, &FillValueMetadata::Hex("0x7fc00000".to_string()))
                .unwrap()
                .unwrap();
        assert!(f32::from_ne_bytes(fill.as_ne_bytes().try_into().unwrap()).is_nan());
    }

    #[test]
    fn fill_value_complex_nan_component() {
        let metadata = FillValueMetadata::Complex(
            Box::new(FillValueMetadata::NaN),
            Box::new(FillValueMetadata::Number(serde_json::Number::from(1))),
        );
        let fill = FillValue::from_metadata(&DataType::Complex128, &metadata)
            .unwrap()
            .unwrap();
        let re = f64::from_ne_bytes(fill.as_ne_bytes()[..8].try_into().unwrap());
        let im = f64::from_ne_bytes(fill.as_ne_bytes()[8..].try_into().unwrap());
        assert!(re.is_nan());
        assert_eq!(im, 1.0);
        // Round trips deterministically.
        let roundtrip = fill.to_metadata(&DataType::Complex128).unwrap();
        assert_eq!(
            roundtrip,
            FillValueMetadata::Complex(
                Box::new(FillValueMetadata::NaN),
                Box::new(FillValueMetadata::Number(
                    serde_json::Number::from_f64(1.0).unwrap()
                )),
            )
        );
    }

    #[test]
    fn fill_value_strings() {
        let fill = FillValue::from_metadata(
            &DataType::Ascii(4),
            &FillValueMetadata::String("ab".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(fill.as_ne_bytes(), b"ab\0\0");
        assert_eq!(
            fill.to_metadata(&DataType::Ascii(4)).unwrap(),
            FillValueMetadata::String("ab".to_string())
        );
    }
}
