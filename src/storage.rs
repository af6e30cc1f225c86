//! The byte store layer.
//!
//! A [`ByteStore`] is a flat namespace of byte blobs addressed by [`StoreKey`]. It supports
//! whole-blob and byte-range reads, writes (creating parent directories as needed), erasure,
//! and single-level directory listing. Absence of a blob is **not** an error: a missing chunk
//! blob reads as the array fill value.
//!
//! Stores provided:
//!  - [`FilesystemStore`]: a directory tree of files.
//!  - [`MemoryStore`]: an in-memory map, primarily for tests.
//!  - [`CountingStore`]: a wrapper counting store operations, used to verify that
//!    consolidated metadata and prefetch avoid redundant I/O.

mod counting;
mod filesystem;
mod key;
mod memory;

pub use counting::CountingStore;
pub use filesystem::FilesystemStore;
pub use key::{StoreKey, StoreKeyError, StorePrefix, StorePrefixError};
pub use memory::MemoryStore;

use thiserror::Error;

use crate::{
    byte_range::{ByteRange, InvalidByteRangeError},
    node::NodePath,
};

/// The bytes of a blob, or [`None`] if the blob does not exist.
pub type MaybeBytes = Option<Vec<u8>>;

/// The result of a single-level directory listing: blob keys and child directory prefixes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StoreDirListing {
    /// Keys of blobs directly under the listed prefix.
    pub keys: Vec<StoreKey>,
    /// Prefixes of child directories directly under the listed prefix.
    pub prefixes: Vec<StorePrefix>,
}

/// A byte store error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The store is read-only.
    #[error("store is read-only")]
    ReadOnly,
    /// An invalid store key.
    #[error(transparent)]
    InvalidKey(#[from] StoreKeyError),
    /// An invalid store prefix.
    #[error(transparent)]
    InvalidPrefix(#[from] StorePrefixError),
    /// A byte range is invalid for the blob it addresses.
    #[error(transparent)]
    InvalidByteRange(#[from] InvalidByteRangeError),
    /// Any other store error.
    #[error("{0}")]
    Other(String),
}

/// A store of byte blobs addressed by [`StoreKey`].
pub trait ByteStore: Send + Sync + core::fmt::Debug {
    /// Retrieve the blob at `key`, or [`None`] if it does not exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure. A missing blob is not an
    /// error.
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError>;

    /// Retrieve `byte_ranges` of the blob at `key`, or [`None`] if it does not exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure or if a range is out of
    /// bounds.
    fn get_partial(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StoreError>;

    /// Return the size in bytes of the blob at `key`, or [`None`] if it does not exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError>;

    /// Store `value` at `key`, creating any parent directories.
    ///
    /// # Errors
    /// Returns [`StoreError::ReadOnly`] on a read-only store, otherwise a [`StoreError`] on
    /// an underlying store failure.
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError>;

    /// Erase the blob at `key`. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    fn erase(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Erase all blobs under `prefix`. Returns false if nothing existed under it.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StoreError>;

    /// List the blobs and child directories directly under `prefix`.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreDirListing, StoreError>;

    /// Move every blob under `from` to the same relative key under `to`.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying store failure.
    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StoreError>;

    /// Return true if the store rejects writes.
    fn readonly(&self) -> bool;
}

/// Return the Zarr V3 metadata key (`zarr.json`) of the node at `path`.
#[must_use]
pub fn meta_key_v3(path: &NodePath) -> StoreKey {
    key_under_node(path, "zarr.json")
}

/// Return the Zarr V2 array metadata key (`.zarray`) of the node at `path`.
#[must_use]
pub fn meta_key_v2_array(path: &NodePath) -> StoreKey {
    key_under_node(path, ".zarray")
}

/// Return the Zarr V2 group metadata key (`.zgroup`) of the node at `path`.
#[must_use]
pub fn meta_key_v2_group(path: &NodePath) -> StoreKey {
    key_under_node(path, ".zgroup")
}

/// Return the Zarr V2 attributes key (`.zattrs`) of the node at `path`.
#[must_use]
pub fn meta_key_v2_attributes(path: &NodePath) -> StoreKey {
    key_under_node(path, ".zattrs")
}

/// Return the Zarr V2 consolidated metadata key (`.zmetadata`) of the node at `path`.
#[must_use]
pub fn meta_key_v2_consolidated(path: &NodePath) -> StoreKey {
    key_under_node(path, ".zmetadata")
}

/// Return the key of the chunk blob with key-encoded suffix `chunk_key` of the array at
/// `path`.
#[must_use]
pub fn data_key(path: &NodePath, chunk_key: &str) -> StoreKey {
    key_under_node(path, chunk_key)
}

/// Return the store prefix of the node at `path`.
#[must_use]
pub fn node_prefix(path: &NodePath) -> StorePrefix {
    let relative = path.as_relative();
    if relative.is_empty() {
        StorePrefix::root()
    } else {
        StorePrefix::new(&format!("{relative}/")).expect("node paths are valid prefixes")
    }
}

fn key_under_node(path: &NodePath, name: &str) -> StoreKey {
    let relative = path.as_relative();
    let key = if relative.is_empty() {
        name.to_string()
    } else {
        format!("{relative}/{name}")
    };
    StoreKey::new(&key).expect("node paths and metadata names are valid keys")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_keys() {
        let root = NodePath::root();
        assert_eq!(meta_key_v3(&root).as_str(), "zarr.json");
        assert_eq!(meta_key_v2_group(&root).as_str(), ".zgroup");
        let path = NodePath::new("/group/array").unwrap();
        assert_eq!(meta_key_v3(&path).as_str(), "group/array/zarr.json");
        assert_eq!(meta_key_v2_array(&path).as_str(), "group/array/.zarray");
        assert_eq!(
            meta_key_v2_attributes(&path).as_str(),
            "group/array/.zattrs"
        );
        assert_eq!(data_key(&path, "0.1").as_str(), "group/array/0.1");
        assert_eq!(node_prefix(&path).as_str(), "group/array/");
        assert_eq!(node_prefix(&root).as_str(), "");
    }
}
