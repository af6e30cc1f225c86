//! The Zarr format versions understood by this crate.

use serde::{Deserialize, Serialize};

/// The Zarr storage specification version of a node.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum ZarrVersion {
    /// Zarr storage specification version 2 (`.zarray`/`.zgroup` markers).
    V2,
    /// Zarr storage specification version 3 (`zarr.json`).
    V3,
}

impl core::fmt::Display for ZarrVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::V2 => write!(f, "2"),
            Self::V3 => write!(f, "3"),
        }
    }
}

/// The version of the `mdzarr` crate.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_display() {
        assert_eq!(ZarrVersion::V2.to_string(), "2");
        assert_eq!(ZarrVersion::V3.to_string(), "3");
    }
}
