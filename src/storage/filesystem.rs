//! A filesystem store.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

use crate::byte_range::ByteRange;

use super::{
    ByteStore, MaybeBytes, StoreDirListing, StoreError, StoreKey, StoreKeyError, StorePrefix,
};

/// A store backed by a directory of files.
///
/// Blob keys map to file paths under a base directory; writes create parent directories on
/// demand. Byte-range reads seek within the file rather than reading the whole blob, which is
/// what shard partial decoding relies on.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The base path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}

impl FilesystemStore {
    /// Create a new filesystem store at `base_path`.
    ///
    /// The directory is created if it does not exist.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path` is invalid or cannot be
    /// created.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        let readonly = if base_path.exists() {
            std::fs::metadata(&base_path)?.permissions().readonly()
        } else {
            std::fs::create_dir_all(&base_path)?;
            false
        };
        Ok(Self {
            base_path,
            readonly,
            files: Mutex::default(),
        })
    }

    /// The base directory of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps a [`StoreKey`] to a filesystem path.
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(key.as_str());
        path
    }

    fn prefix_to_fspath(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_path.clone();
        if !prefix.as_str().is_empty() {
            path.push(prefix.as_str());
        }
        path
    }

    fn fspath_to_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let relative = pathdiff::diff_paths(path, &self.base_path)
            .ok_or_else(|| StoreKeyError::new(path.to_string_lossy()))?;
        StoreKey::new(&relative.to_string_lossy().replace('\\', "/"))
    }

    fn file_lock(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        self.files
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone()
    }
}

impl ByteStore for FilesystemStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        Ok(self
            .get_partial(key, &[ByteRange::FromStart(0, None)])?
            .map(|mut v| v.remove(0)))
    }

    fn get_partial(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        let lock = self.file_lock(key);
        let _guard = lock.read();

        let mut file = match File::open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::with_capacity(byte_ranges.len());
        for byte_range in byte_ranges {
            match byte_range {
                ByteRange::FromStart(offset, _) => {
                    file.seek(SeekFrom::Start(*offset))?;
                }
                ByteRange::FromEnd(_, None) => {
                    file.seek(SeekFrom::Start(0))?;
                }
                ByteRange::FromEnd(offset, Some(length)) => {
                    file.seek(SeekFrom::End(
                        -(i64::try_from(*offset + *length).map_err(|_| {
                            StoreError::Other(format!("byte range {byte_range} overflows"))
                        })?),
                    ))?;
                }
            }
            let bytes = match byte_range {
                ByteRange::FromStart(_, None) | ByteRange::FromEnd(_, None) => {
                    let mut buffer = Vec::new();
                    file.read_to_end(&mut buffer)?;
                    buffer
                }
                ByteRange::FromStart(_, Some(length)) | ByteRange::FromEnd(_, Some(length)) => {
                    let mut buffer = vec![0; usize::try_from(*length).unwrap()];
                    file.read_exact(&mut buffer)?;
                    buffer
                }
            };
            out.push(bytes);
        }
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        match std::fs::metadata(self.key_to_fspath(key)) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(_) => Ok(None),
        }
    }

    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let lock = self.file_lock(key);
        let _guard = lock.write();

        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(key_path)?;
        file.write_all(value)?;
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<bool, StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let lock = self.file_lock(key);
        let _guard = lock.write();
        Ok(std::fs::remove_file(self.key_to_fspath(key)).is_ok())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<bool, StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let _guard = self.files.lock();
        match std::fs::remove_dir_all(self.prefix_to_fspath(prefix)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreDirListing, StoreError> {
        let mut listing = StoreDirListing::default();
        let dir = match std::fs::read_dir(self.prefix_to_fspath(prefix)) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(err) => return Err(err.into()),
        };
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if entry.path().is_dir() {
                listing
                    .prefixes
                    .push(StorePrefix::new(&format!("{}{name}/", prefix.as_str()))?);
            } else {
                listing.keys.push(prefix.key(name)?);
            }
        }
        listing.keys.sort();
        listing.prefixes.sort();
        Ok(listing)
    }

    fn rename_prefix(&self, from: &StorePrefix, to: &StorePrefix) -> Result<(), StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let _guard = self.files.lock();
        let to_path = self.prefix_to_fspath(to);
        if let Some(parent) = to_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::rename(self.prefix_to_fspath(from), to_path)?;
        Ok(())
    }

    fn readonly(&self) -> bool {
        self.readonly
    }
}

impl FilesystemStore {
    /// Walk all blob keys under the store, depth-first.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on an underlying filesystem failure.
    pub fn list_all(&self) -> Result<Vec<StoreKey>, StoreError> {
        Ok(WalkDir::new(&self.base_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| self.fspath_to_key(entry.path()).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_set_get() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        let key = "a/b".try_into()?;
        assert_eq!(store.get(&key)?, None);
        store.set(&key, &[0, 1, 2])?;
        assert_eq!(store.get(&key)?.unwrap(), &[0, 1, 2]);
        assert_eq!(store.size_key(&key)?, Some(3));
        assert_eq!(
            store
                .get_partial(&key, &[ByteRange::FromStart(1, Some(2))])?
                .unwrap(),
            vec![vec![1, 2]]
        );
        assert_eq!(
            store
                .get_partial(&key, &[ByteRange::FromEnd(0, Some(1))])?
                .unwrap(),
            vec![vec![2]]
        );
        assert!(store.erase(&key)?);
        assert!(!store.erase(&key)?);
        assert_eq!(store.get(&key)?, None);
        Ok(())
    }

    #[test]
    fn filesystem_list_dir() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        store.set(&"a/b".try_into()?, &[])?;
        store.set(&"a/c".try_into()?, &[])?;
        store.set(&"a/d/e".try_into()?, &[])?;
        let listing = store.list_dir(&"a/".try_into()?)?;
        assert_eq!(listing.keys, vec!["a/b".try_into()?, "a/c".try_into()?]);
        assert_eq!(listing.prefixes, vec!["a/d/".try_into()?]);
        let listing = store.list_dir(&StorePrefix::root())?;
        assert_eq!(listing.prefixes, vec!["a/".try_into()?]);
        Ok(())
    }

    #[test]
    fn filesystem_rename_prefix() -> Result<(), Box<dyn std::error::Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        store.set(&"a/b/c".try_into()?, &[1])?;
        store.rename_prefix(&"a/b/".try_into()?, &"a/z/".try_into()?)?;
        assert_eq!(store.get(&"a/b/c".try_into()?)?, None);
        assert_eq!(store.get(&"a/z/c".try_into()?)?.unwrap(), &[1]);
        Ok(())
    }
}
