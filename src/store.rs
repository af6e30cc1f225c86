//! Opening and creating stores.
//!
//! A [`Store`] is one opened Zarr hierarchy: the shared [`StoreContext`], the root group,
//! and the lifecycle operations, most importantly [`close`](Store::close), which flushes
//! every dirty chunk and modified metadata document and rewrites consolidated metadata if
//! the tree changed.

use std::{path::Path, sync::Arc};

use log::debug;

use crate::{
    config::{EnvGates, StoreOpenOptions},
    context::StoreContext,
    error::ZarrError,
    group::Group,
    metadata::consolidated::{
        ConsolidatedMetadata, ConsolidatedMetadataV2, ConsolidatedMetadataV3,
    },
    metadata::v3::GroupMetadataV3,
    node::NodePath,
    storage::{
        ByteStore, FilesystemStore, meta_key_v2_consolidated, meta_key_v3,
    },
    version::ZarrVersion,
};

/// An opened Zarr hierarchy.
#[derive(Debug)]
pub struct Store {
    ctx: Arc<StoreContext>,
    root: Group,
}

impl Store {
    /// Open an existing hierarchy in a directory.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the directory cannot be opened or the root metadata is
    /// invalid.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOpenOptions) -> Result<Self, ZarrError> {
        let store = FilesystemStore::new(path)
            .map_err(|err| ZarrError::Store(crate::storage::StoreError::Other(err.to_string())))?;
        Self::open_with_store(Arc::new(store), options)
    }

    /// Open an existing hierarchy over any byte store.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the root metadata is invalid.
    pub fn open_with_store(
        store: Arc<dyn ByteStore>,
        options: StoreOpenOptions,
    ) -> Result<Self, ZarrError> {
        let ctx = Arc::new(StoreContext::new(store, options, EnvGates::from_env()));
        Self::load_consolidated(&ctx)?;
        let root = Group::open_root(&ctx)?;
        Ok(Self { ctx, root })
    }

    /// Create a new hierarchy in a directory, writing the root group metadata in the
    /// format selected by [`StoreOpenOptions::create_version`].
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the directory or metadata cannot be written.
    pub fn create<P: AsRef<Path>>(path: P, options: StoreOpenOptions) -> Result<Self, ZarrError> {
        let store = FilesystemStore::new(path)
            .map_err(|err| ZarrError::Store(crate::storage::StoreError::Other(err.to_string())))?;
        Self::create_with_store(Arc::new(store), options)
    }

    /// Create a new hierarchy over any byte store.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the root metadata cannot be written.
    pub fn create_with_store(
        store: Arc<dyn ByteStore>,
        options: StoreOpenOptions,
    ) -> Result<Self, ZarrError> {
        let version = options.create_version;
        let ctx = Arc::new(StoreContext::new(store, options, EnvGates::from_env()));
        let root = Group::new(
            ctx.clone(),
            NodePath::root(),
            version,
            std::sync::Weak::new(),
            crate::metadata::Attributes::default(),
        );
        root.bootstrap_root()?;
        Ok(Self { ctx, root })
    }

    /// The shared store context.
    #[must_use]
    pub fn context(&self) -> &Arc<StoreContext> {
        &self.ctx
    }

    /// The root group.
    #[must_use]
    pub fn root_group(&self) -> Group {
        self.root.clone()
    }

    /// Flush the hierarchy: dirty chunks, modified metadata, and (if the tree changed)
    /// the consolidated metadata document.
    ///
    /// # Errors
    /// Returns the first error encountered; the remaining flush work is still attempted.
    pub fn flush(&self) -> Result<(), ZarrError> {
        self.root.flush()?;
        self.write_dirty_consolidated()
    }

    /// Flush and close the store.
    ///
    /// # Errors
    /// Returns the first error encountered while flushing.
    pub fn close(self) -> Result<(), ZarrError> {
        self.flush()
    }

    /// Load consolidated metadata, if present, into the context.
    fn load_consolidated(ctx: &Arc<StoreContext>) -> Result<(), ZarrError> {
        if !ctx.options().use_consolidated {
            return Ok(());
        }
        let root = NodePath::root();
        // Zarr V2 `.zmetadata`.
        if let Some(bytes) = ctx.store().get(&meta_key_v2_consolidated(&root))? {
            let document: ConsolidatedMetadataV2 = serde_json::from_slice(&bytes)?;
            debug!("using consolidated metadata from .zmetadata");
            ctx.set_consolidated(Some(ConsolidatedMetadata::from_v2(document)));
            return Ok(());
        }
        // Zarr V3 internal consolidated metadata.
        if let Some(bytes) = ctx.store().get(&meta_key_v3(&root))? {
            let metadata: Result<GroupMetadataV3, _> = serde_json::from_slice(&bytes);
            if let Ok(metadata) = metadata {
                if let Some(consolidated) = &metadata.consolidated_metadata {
                    debug!("using consolidated metadata from the root zarr.json");
                    let mut snapshot = ConsolidatedMetadata::from_v3(consolidated);
                    // The root document itself is part of the snapshot.
                    if let Ok(value) = serde_json::to_value(&metadata) {
                        snapshot.insert("zarr.json".to_string(), value);
                    }
                    ctx.set_consolidated(Some(snapshot));
                }
            }
        }
        Ok(())
    }

    /// Rewrite the consolidated metadata document if the snapshot is dirty.
    fn write_dirty_consolidated(&self) -> Result<(), ZarrError> {
        let Some(snapshot) = self.ctx.take_dirty_consolidated() else {
            return Ok(());
        };
        if self.ctx.read_only() {
            return Ok(());
        }
        let root = NodePath::root();
        match self.root.zarr_version() {
            ZarrVersion::V2 => {
                let document = snapshot.to_v2();
                self.ctx.store().set(
                    &meta_key_v2_consolidated(&root),
                    &serde_json::to_vec_pretty(&document)?,
                )?;
            }
            ZarrVersion::V3 => {
                // Embed in the root group document.
                let key = meta_key_v3(&root);
                let mut root_document: GroupMetadataV3 = match self.ctx.store().get(&key)? {
                    Some(bytes) => serde_json::from_slice(&bytes)?,
                    None => GroupMetadataV3::default(),
                };
                let mut metadata = serde_json::Map::new();
                for consolidated_key in snapshot.keys() {
                    if consolidated_key == "zarr.json" {
                        continue;
                    }
                    if let (Some(node_path), Some(document)) = (
                        consolidated_key.strip_suffix("/zarr.json"),
                        snapshot.get(consolidated_key),
                    ) {
                        metadata.insert(node_path.to_string(), document.clone());
                    }
                }
                root_document.consolidated_metadata = Some(ConsolidatedMetadataV3 {
                    metadata,
                    kind: "inline".to_string(),
                    must_understand: false,
                });
                self.ctx
                    .store()
                    .set(&key, &serde_json::to_vec_pretty(&root_document)?)?;
            }
        }
        Ok(())
    }

    /// Build (or rebuild) consolidated metadata for the whole hierarchy and persist it.
    ///
    /// Walks every metadata document under the store, assembles the snapshot, installs it
    /// in the context and writes it in the format of the root group.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store failure.
    pub fn consolidate_metadata(&self) -> Result<(), ZarrError> {
        self.root.flush()?;
        let mut snapshot = ConsolidatedMetadata::default();
        let keys = crate::array::list_keys_recursive(
            self.ctx.store().as_ref(),
            &crate::storage::StorePrefix::root(),
        )?;
        for key in keys {
            let name = key.name();
            let is_metadata = matches!(name, ".zarray" | ".zgroup" | ".zattrs" | "zarr.json");
            if !is_metadata || key.as_str().starts_with(".mdzarr/") {
                continue;
            }
            if let Some(bytes) = self.ctx.store().get(&key)? {
                let document: serde_json::Value = serde_json::from_slice(&bytes)?;
                snapshot.insert(key.as_str().to_string(), document);
            }
        }
        self.ctx.set_consolidated(Some(snapshot));
        self.ctx.update_consolidated(|_| {}); // mark dirty
        self.write_dirty_consolidated()
    }
}
