//! Zarr metadata documents.
//!
//! Serde representations of the on-disk JSON documents of both storage specification
//! versions: Zarr V2 (`.zarray`, `.zgroup`, `.zattrs`, `.zmetadata`) and Zarr V3
//! (`zarr.json`, internal `consolidated_metadata`), plus the shared building blocks
//! (chunk key separators, codec metadata, fill value forms).

pub mod consolidated;
pub mod v2;
pub mod v3;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// User-defined attributes of a group or array.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// The separator placed between chunk grid coordinates in a chunk key.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum ChunkKeySeparator {
    /// The `.` separator.
    #[default]
    Dot,
    /// The `/` separator.
    Slash,
}

impl ChunkKeySeparator {
    /// The separator character.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Dot => '.',
            Self::Slash => '/',
        }
    }
}

impl core::fmt::Display for ChunkKeySeparator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl Serialize for ChunkKeySeparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Dot => serializer.serialize_str("."),
            Self::Slash => serializer.serialize_str("/"),
        }
    }
}

impl<'de> Deserialize<'de> for ChunkKeySeparator {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let separator = String::deserialize(d)?;
        match separator.as_str() {
            "." => Ok(Self::Dot),
            "/" => Ok(Self::Slash),
            _ => Err(serde::de::Error::custom(format!(
                "invalid chunk key separator {separator}, must be . or /"
            ))),
        }
    }
}

/// The metadata of a fill value: the JSON forms permitted in array metadata.
///
/// Zarr V3 permits numbers, booleans, the non-finite strings `"NaN"`, `"Infinity"` and
/// `"-Infinity"`, hex strings (`"0x7fc00000"`) for raw bit patterns, and two-element arrays
/// for complex types. Zarr V2 additionally uses `null` (no fill value) and plain strings
/// for string dtypes.
#[derive(Clone, PartialEq, Debug)]
pub enum FillValueMetadata {
    /// No fill value (`null`).
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(serde_json::Number),
    /// `NaN`.
    NaN,
    /// Positive infinity.
    Infinity,
    /// Negative infinity.
    NegInfinity,
    /// A raw bit pattern as a hex string, e.g. `"0x7fc00000"`.
    Hex(String),
    /// A two-element `[re, im]` array for complex types.
    Complex(Box<FillValueMetadata>, Box<FillValueMetadata>),
    /// A plain string, used by string dtypes.
    String(String),
}

impl FillValueMetadata {
    fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(number) => Some(Self::Number(number.clone())),
            serde_json::Value::String(string) => Some(match string.as_str() {
                "NaN" => Self::NaN,
                "Infinity" => Self::Infinity,
                "-Infinity" => Self::NegInfinity,
                hex if hex.starts_with("0x") => Self::Hex(string.clone()),
                _ => Self::String(string.clone()),
            }),
            serde_json::Value::Array(values) => {
                if let [re, im] = values.as_slice() {
                    Some(Self::Complex(
                        Box::new(Self::from_value(re)?),
                        Box::new(Self::from_value(im)?),
                    ))
                } else {
                    None
                }
            }
            serde_json::Value::Object(_) => None,
        }
    }

    fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(number) => serde_json::Value::Number(number.clone()),
            Self::NaN => serde_json::Value::String("NaN".to_string()),
            Self::Infinity => serde_json::Value::String("Infinity".to_string()),
            Self::NegInfinity => serde_json::Value::String("-Infinity".to_string()),
            Self::Hex(hex) => serde_json::Value::String(hex.clone()),
            Self::Complex(re, im) => serde_json::Value::Array(vec![re.to_value(), im.to_value()]),
            Self::String(string) => serde_json::Value::String(string.clone()),
        }
    }
}

impl Serialize for FillValueMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FillValueMetadata {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Self::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fill value {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_separator_serde() {
        assert!(serde_json::from_str::<ChunkKeySeparator>(r#""_""#).is_err());
        assert_eq!(
            serde_json::from_str::<ChunkKeySeparator>(r#"".""#).unwrap(),
            ChunkKeySeparator::Dot
        );
        assert_eq!(
            serde_json::from_str::<ChunkKeySeparator>(r#""/""#).unwrap(),
            ChunkKeySeparator::Slash
        );
        assert_eq!(
            serde_json::to_string(&ChunkKeySeparator::Slash).unwrap(),
            r#""/""#
        );
    }

    #[test]
    fn fill_value_metadata_forms() {
        assert_eq!(
            serde_json::from_str::<FillValueMetadata>("null").unwrap(),
            FillValueMetadata::Null
        );
        assert_eq!(
            serde_json::from_str::<FillValueMetadata>(r#""NaN""#).unwrap(),
            FillValueMetadata::NaN
        );
        assert_eq!(
            serde_json::from_str::<FillValueMetadata>(r#""0x7fc00000""#).unwrap(),
            FillValueMetadata::Hex("0x7fc00000".to_string())
        );
        let complex = serde_json::from_str::<FillValueMetadata>(r#"[1.5, "NaN"]"#).unwrap();
        assert_eq!(
            complex,
            FillValueMetadata::Complex(
                Box::new(FillValueMetadata::Number(
                    serde_json::Number::from_f64(1.5).unwrap()
                )),
                Box::new(FillValueMetadata::NaN),
            )
        );
        assert_eq!(serde_json::to_string(&complex).unwrap(), r#"[1.5,"NaN"]"#);
    }
}
