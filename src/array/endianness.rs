//! Byte endianness.

use serde::{Deserialize, Serialize};

/// Byte endianness of multi-byte values.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// The endianness of the host.
pub const NATIVE_ENDIAN: Endianness = if cfg!(target_endian = "big") {
    Endianness::Big
} else {
    Endianness::Little
};

impl Endianness {
    /// Return true if this is the endianness of the host.
    #[must_use]
    pub fn is_native(self) -> bool {
        self == NATIVE_ENDIAN
    }

    /// The Zarr V2 dtype prefix character (`<` or `>`).
    #[must_use]
    pub fn v2_prefix(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
        }
    }
}

impl core::fmt::Display for Endianness {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Little => write!(f, "little"),
            Self::Big => write!(f, "big"),
        }
    }
}

/// Reverse the bytes of each `element_size`-sized element of `bytes` in place.
///
/// # Panics
/// Panics if the length of `bytes` is not a multiple of `element_size`.
pub fn swap_bytes_inplace(bytes: &mut [u8], element_size: usize) {
    assert_eq!(bytes.len() % element_size, 0);
    if element_size > 1 {
        for element in bytes.chunks_exact_mut(element_size) {
            element.reverse();
        }
    }
}
