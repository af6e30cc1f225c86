//! A Rust library for reading and writing [Zarr](https://zarr.dev) V2 and V3 hierarchies of
//! chunked, compressed, multidimensional arrays.
//!
//! `mdzarr` models a Zarr store as a tree of groups, named dimensions and arrays:
//!  - **groups** carry attributes and child groups/arrays/dimensions,
//!  - **dimensions** are named axes which may be indexed by a same-named 1-D array,
//!  - **arrays** hold the chunk grid, data type, fill value and codec chain, and implement
//!    strided n-dimensional read/write with data type conversion.
//!
//! ## Features
//!  - Zarr V2 (`.zarray`/`.zgroup`/`.zattrs`) and Zarr V3 (`zarr.json`) metadata, including
//!    consolidated metadata (`.zmetadata` / `consolidated_metadata`).
//!  - Codecs: `bytes`, `transpose`, `gzip`, `zstd`, `blosc` (feature `blosc`), `shuffle`,
//!    `delta`, `quantize`, `fixedscaleoffset`, `imagecodecs_tiff` (feature `tiff`, decode
//!    only) and `sharding_indexed` with partial decoding of inner chunks.
//!  - A per-array chunk cache with a single write-batching slot, an optional persisted
//!    tile-presence sidecar, and thread-pooled prefetch
//!    ([`Array::advise_read`](crate::array::Array::advise_read)).
//!  - XArray (`_ARRAY_DIMENSIONS`), CF and geo-convention attribute handling on array open.
//!
//! ## Example
//! ```
//! use mdzarr::array::{ArrayCreateOptions, DataType, FillValue};
//! use mdzarr::store::Store;
//!
//! # fn main() -> Result<(), mdzarr::ZarrError> {
//! let tmp = tempfile::TempDir::new().unwrap();
//! let store = Store::create(tmp.path(), Default::default())?;
//! let root = store.root_group();
//! let array = root.create_array(
//!     "temperature",
//!     &[4, 6],
//!     ArrayCreateOptions {
//!         chunk_shape: Some(vec![2, 3]),
//!         data_type: DataType::Int32,
//!         fill_value: Some(FillValue::from(-1i32)),
//!         ..Default::default()
//!     },
//! )?;
//! array.write_elements::<i32>(&[1, 1], &[2, 3], &[10, 11, 12, 20, 21, 22])?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod array;
pub mod array_subset;
pub mod byte_range;
pub mod config;
pub mod context;
pub mod dimension;
pub mod error;
pub mod group;
pub mod metadata;
pub mod node;
pub mod storage;
pub mod store;
pub mod version;

pub use error::ZarrError;
pub use store::Store;
