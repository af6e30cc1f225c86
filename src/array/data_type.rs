//! Array data types.
//!
//! A [`DataType`] describes the elements of an array: the scalar types of the Zarr V3 core
//! specification, the fixed-length ASCII (`|Sn`) and UCS-4 (`|Un`) string types of Zarr V2,
//! and Zarr V2 compound (structured) types.
//!
//! Decoded chunk buffers hold elements in host byte order at [`DataType::size`] bytes per
//! element; string elements keep their fixed on-disk width and are transcoded to UTF-8 only
//! at the typed element API boundary.

use thiserror::Error;

use super::endianness::Endianness;

/// A field of a compound data type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CompoundField {
    /// The field name.
    pub name: String,
    /// The field data type.
    pub data_type: DataType,
}

/// An array data type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DataType {
    /// A boolean (1 byte, 0 or 1).
    Bool,
    /// A signed 8-bit integer.
    Int8,
    /// A signed 16-bit integer.
    Int16,
    /// A signed 32-bit integer.
    Int32,
    /// A signed 64-bit integer.
    Int64,
    /// An unsigned 8-bit integer.
    UInt8,
    /// An unsigned 16-bit integer.
    UInt16,
    /// An unsigned 32-bit integer.
    UInt32,
    /// An unsigned 64-bit integer.
    UInt64,
    /// An IEEE 754 half precision float.
    Float16,
    /// An IEEE 754 single precision float.
    Float32,
    /// An IEEE 754 double precision float.
    Float64,
    /// A complex number of two single precision floats.
    Complex64,
    /// A complex number of two double precision floats.
    Complex128,
    /// A fixed-length ASCII string of `n` bytes (Zarr V2 `|Sn`).
    Ascii(usize),
    /// A fixed-length UCS-4 string of `n` code units (Zarr V2 `|Un`).
    Unicode(usize),
    /// A compound of named fields (Zarr V2 structured dtype).
    Compound(Vec<CompoundField>),
}

/// An unknown or unsupported data type error.
#[derive(Clone, Debug, Error)]
#[error("unsupported data type {0}")]
pub struct UnsupportedDataTypeError(String);

impl DataType {
    /// The size in bytes of one element in a decoded chunk buffer.
    ///
    /// Strings keep their fixed on-disk width (UCS-4 strings occupy four bytes per code
    /// unit); compound elements are packed fields.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
            Self::Ascii(n) => *n,
            Self::Unicode(n) => 4 * n,
            Self::Compound(fields) => fields.iter().map(|field| field.data_type.size()).sum(),
        }
    }

    /// The size in bytes of the smallest endian-sensitive unit of an element.
    ///
    /// This is the per-element size for scalars, the component size for complex types, four
    /// for UCS-4 strings, and one for ASCII strings and booleans. Compound types have no
    /// single swap size and return [`None`].
    #[must_use]
    pub fn swap_size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 | Self::Ascii(_) => Some(1),
            Self::Int16 | Self::UInt16 | Self::Float16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::Complex64 | Self::Unicode(_) => {
                Some(4)
            }
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex128 => Some(8),
            Self::Compound(_) => None,
        }
    }

    /// The element size with complex types reduced to their component size.
    ///
    /// This is the default Blosc `typesize`.
    #[must_use]
    pub fn non_complex_size(&self) -> usize {
        match self {
            Self::Complex64 => 4,
            Self::Complex128 => 8,
            other => other.size(),
        }
    }

    /// Return true for integer and floating point types (including complex).
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::Ascii(_) | Self::Unicode(_) | Self::Compound(_)
        )
    }

    /// Return true for complex types.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Return true for string types.
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::Ascii(_) | Self::Unicode(_))
    }

    /// Return true for floating point types (not complex).
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// The Zarr V3 data type name.
    ///
    /// # Errors
    /// Returns [`UnsupportedDataTypeError`] for string and compound types, which have no
    /// Zarr V3 core representation.
    pub fn v3_name(&self) -> Result<&'static str, UnsupportedDataTypeError> {
        Ok(match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::Ascii(_) | Self::Unicode(_) | Self::Compound(_) => {
                return Err(UnsupportedDataTypeError(format!("{self:?}")));
            }
        })
    }

    /// Parse a Zarr V3 data type name.
    ///
    /// # Errors
    /// Returns [`UnsupportedDataTypeError`] for an unknown name.
    pub fn from_v3_name(name: &str) -> Result<Self, UnsupportedDataTypeError> {
        Ok(match name {
            "bool" => Self::Bool,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "float16" => Self::Float16,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "complex64" => Self::Complex64,
            "complex128" => Self::Complex128,
            _ => return Err(UnsupportedDataTypeError(name.to_string())),
        })
    }

    /// Parse a simple (non-structured) Zarr V2 dtype string such as `<i4`, returning the
    /// data type and its declared endianness ([`None`] for single-byte and `|`-prefixed
    /// types).
    ///
    /// # Errors
    /// Returns [`UnsupportedDataTypeError`] for an unknown or malformed dtype string.
    pub fn from_v2_dtype(
        dtype: &str,
    ) -> Result<(Self, Option<Endianness>), UnsupportedDataTypeError> {
        let err = || UnsupportedDataTypeError(dtype.to_string());
        let mut chars = dtype.chars();
        let endianness = match chars.next().ok_or_else(err)? {
            '<' => Some(Endianness::Little),
            '>' => Some(Endianness::Big),
            '|' => None,
            _ => return Err(err()),
        };
        let kind = chars.next().ok_or_else(err)?;
        let size: usize = chars.as_str().parse().map_err(|_| err())?;
        let data_type = match (kind, size) {
            ('b', 1) => Self::Bool,
            ('i', 1) => Self::Int8,
            ('i', 2) => Self::Int16,
            ('i', 4) => Self::Int32,
            ('i', 8) => Self::Int64,
            ('u', 1) => Self::UInt8,
            ('u', 2) => Self::UInt16,
            ('u', 4) => Self::UInt32,
            ('u', 8) => Self::UInt64,
            ('f', 2) => Self::Float16,
            ('f', 4) => Self::Float32,
            ('f', 8) => Self::Float64,
            ('c', 8) => Self::Complex64,
            ('c', 16) => Self::Complex128,
            ('S', n) => Self::Ascii(n),
            ('U', n) => Self::Unicode(n),
            _ => return Err(err()),
        };
        // Single-byte and string types must not declare an endianness other than `|`,
        // except UCS-4 strings whose code units are endian-sensitive.
        Ok((data_type, endianness))
    }

    /// The Zarr V2 dtype string with the given `endianness`.
    ///
    /// # Errors
    /// Returns [`UnsupportedDataTypeError`] for compound types; serialize those through
    /// their fields instead.
    pub fn to_v2_dtype(
        &self,
        endianness: Endianness,
    ) -> Result<String, UnsupportedDataTypeError> {
        let prefix = endianness.v2_prefix();
        Ok(match self {
            Self::Bool => "|b1".to_string(),
            Self::Int8 => "|i1".to_string(),
            Self::UInt8 => "|u1".to_string(),
            Self::Int16 => format!("{prefix}i2"),
            Self::Int32 => format!("{prefix}i4"),
            Self::Int64 => format!("{prefix}i8"),
            Self::UInt16 => format!("{prefix}u2"),
            Self::UInt32 => format!("{prefix}u4"),
            Self::UInt64 => format!("{prefix}u8"),
            Self::Float16 => format!("{prefix}f2"),
            Self::Float32 => format!("{prefix}f4"),
            Self::Float64 => format!("{prefix}f8"),
            Self::Complex64 => format!("{prefix}c8"),
            Self::Complex128 => format!("{prefix}c16"),
            Self::Ascii(n) => format!("|S{n}"),
            Self::Unicode(n) => format!("{prefix}U{n}"),
            Self::Compound(_) => return Err(UnsupportedDataTypeError(format!("{self:?}"))),
        })
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Ascii(n) => write!(f, "ascii({n})"),
            Self::Unicode(n) => write!(f, "unicode({n})"),
            Self::Compound(fields) => {
                write!(f, "compound(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ")")
            }
            other => write!(f, "{}", other.v3_name().expect("scalar types have v3 names")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_sizes() {
        assert_eq!(DataType::Bool.size(), 1);
        assert_eq!(DataType::Int32.size(), 4);
        assert_eq!(DataType::Complex128.size(), 16);
        assert_eq!(DataType::Ascii(7).size(), 7);
        assert_eq!(DataType::Unicode(3).size(), 12);
        let compound = DataType::Compound(vec![
            CompoundField {
                name: "a".to_string(),
                data_type: DataType::Int16,
            },
            CompoundField {
                name: "b".to_string(),
                data_type: DataType::Float64,
            },
        ]);
        assert_eq!(compound.size(), 10);
        assert_eq!(compound.swap_size(), None);
    }

    #[test]
    fn data_type_v3_names() {
        for name in [
            "bool", "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64",
            "float16", "float32", "float64", "complex64", "complex128",
        ] {
            assert_eq!(DataType::from_v3_name(name).unwrap().v3_name().unwrap(), name);
        }
        assert!(DataType::from_v3_name("int128").is_err());
    }

    #[test]
    fn data_type_v2_dtypes() {
        assert_eq!(
            DataType::from_v2_dtype("<i4").unwrap(),
            (DataType::Int32, Some(Endianness::Little))
        );
        assert_eq!(
            DataType::from_v2_dtype(">f8").unwrap(),
            (DataType::Float64, Some(Endianness::Big))
        );
        assert_eq!(DataType::from_v2_dtype("|b1").unwrap(), (DataType::Bool, None));
        assert_eq!(
            DataType::from_v2_dtype("|S12").unwrap(),
            (DataType::Ascii(12), None)
        );
        assert_eq!(
            DataType::from_v2_dtype("<U4").unwrap(),
            (DataType::Unicode(4), Some(Endianness::Little))
        );
        assert!(DataType::from_v2_dtype("<i3").is_err());
        assert!(DataType::from_v2_dtype("i4").is_err());

        assert_eq!(
            DataType::Int32.to_v2_dtype(Endianness::Little).unwrap(),
            "<i4"
        );
        assert_eq!(DataType::Bool.to_v2_dtype(Endianness::Big).unwrap(), "|b1");
    }

    #[test]
    fn data_type_blosc_typesize() {
        assert_eq!(DataType::Complex64.non_complex_size(), 4);
        assert_eq!(DataType::Complex128.non_complex_size(), 8);
        assert_eq!(DataType::Int16.non_complex_size(), 2);
    }
}
