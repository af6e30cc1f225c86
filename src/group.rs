//! Zarr groups.
//!
//! A [`Group`] is a named node of the hierarchy carrying attributes and three registries:
//! child groups, child arrays, and the dimensions local to the group. Children are opened
//! lazily: Zarr V2 children are detected through their `.zgroup`/`.zarray` markers, Zarr V3
//! children through `zarr.json` (any directory without one is an implicit group).
//!
//! Names are unique across the arrays and groups of a group, and must be valid node names
//! (non-empty, no `/`, `\` or `:`, no `.z` prefix).

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use log::{debug, warn};
use parking_lot::RwLock;

use crate::{
    array::{Array, ArrayCreateOptions, conventions},
    config::LISTING_SUPPRESSION_THRESHOLD,
    context::StoreContext,
    dimension::{Dimension, DimensionDirection, DimensionType, SharedDimension},
    error::ZarrError,
    metadata::{
        Attributes,
        v2::{ArrayMetadataV2, GroupMetadataV2},
        v3::{ArrayMetadataV3, GroupMetadataV3, NodeTypeV3, peek_node_type},
    },
    node::{NodePath, is_valid_node_name},
    storage::{
        StoreKey, meta_key_v2_array, meta_key_v2_attributes, meta_key_v2_group, meta_key_v3,
        node_prefix,
    },
    version::ZarrVersion,
};

/// A group in a Zarr hierarchy. Cheap to clone; clones share the same node.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

pub(crate) struct GroupInner {
    ctx: Arc<StoreContext>,
    path: NodePath,
    version: ZarrVersion,
    parent: Weak<GroupInner>,
    state: RwLock<GroupState>,
}

#[derive(Default)]
struct GroupState {
    attributes: Attributes,
    groups: BTreeMap<String, Group>,
    arrays: BTreeMap<String, Arc<Array>>,
    dimensions: BTreeMap<String, SharedDimension>,
    explored: bool,
    child_group_names: Vec<String>,
    child_array_names: Vec<String>,
    deleted: bool,
    modified: bool,
}

impl core::fmt::Debug for Group {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Group")
            .field("path", &self.inner.path)
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}

impl Group {
    pub(crate) fn new(
        ctx: Arc<StoreContext>,
        path: NodePath,
        version: ZarrVersion,
        parent: Weak<GroupInner>,
        attributes: Attributes,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                ctx,
                path,
                version,
                parent,
                state: RwLock::new(GroupState {
                    attributes,
                    ..GroupState::default()
                }),
            }),
        }
    }

    /// Open the root group of a hierarchy, detecting its format.
    pub(crate) fn open_root(ctx: &Arc<StoreContext>) -> Result<Self, ZarrError> {
        let path = NodePath::root();
        // Zarr V3 root.
        if let Some(bytes) = ctx.metadata_bytes(&meta_key_v3(&path))? {
            let document: serde_json::Value = serde_json::from_slice(&bytes)?;
            if peek_node_type(&document) == Some(NodeTypeV3::Group) {
                let metadata: GroupMetadataV3 = serde_json::from_value(document)?;
                return Ok(Self::new(
                    ctx.clone(),
                    path,
                    ZarrVersion::V3,
                    Weak::new(),
                    metadata.attributes,
                ));
            }
            return Err(ZarrError::format(
                "the root zarr.json is not a group".to_string(),
            ));
        }
        // Zarr V2 root.
        if let Some(bytes) = ctx.metadata_bytes(&meta_key_v2_group(&path))? {
            let _metadata: GroupMetadataV2 = serde_json::from_slice(&bytes)?;
            let attributes = read_v2_attributes(ctx, &path)?;
            return Ok(Self::new(
                ctx.clone(),
                path,
                ZarrVersion::V2,
                Weak::new(),
                attributes,
            ));
        }
        // A directory with Zarr V2 attributes only, or an implicit V3 group.
        if ctx
            .metadata_bytes(&meta_key_v2_attributes(&path))?
            .is_some()
        {
            let attributes = read_v2_attributes(ctx, &path)?;
            return Ok(Self::new(
                ctx.clone(),
                path,
                ZarrVersion::V2,
                Weak::new(),
                attributes,
            ));
        }
        Ok(Self::new(
            ctx.clone(),
            path,
            ZarrVersion::V3,
            Weak::new(),
            Attributes::default(),
        ))
    }

    /// The node path of the group.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.inner.path
    }

    /// The name of the group (`""` for the root).
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.path.name()
    }

    /// The storage format of the group.
    #[must_use]
    pub fn zarr_version(&self) -> ZarrVersion {
        self.inner.version
    }

    /// The parent group, if any and still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Group> {
        self.inner.parent.upgrade().map(|inner| Group { inner })
    }

    /// The user attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.inner.state.read().attributes.clone()
    }

    /// Set a user attribute.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted group.
    pub fn set_attribute(&self, name: &str, value: serde_json::Value) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.inner.state.write();
        state.attributes.insert(name.to_string(), value);
        state.modified = true;
        Ok(())
    }

    /// Delete a user attribute. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted group.
    pub fn delete_attribute(&self, name: &str) -> Result<bool, ZarrError> {
        self.check_writable()?;
        let mut state = self.inner.state.write();
        let removed = state.attributes.remove(name).is_some();
        state.modified |= removed;
        Ok(removed)
    }

    fn check_not_deleted(&self) -> Result<(), ZarrError> {
        if self.inner.state.read().deleted {
            return Err(ZarrError::NotFound(self.inner.path.to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), ZarrError> {
        self.check_not_deleted()?;
        if self.inner.ctx.read_only() {
            return Err(ZarrError::Unsupported(format!(
                "group {} is read-only",
                self.inner.path
            )));
        }
        Ok(())
    }

    /// The names of the child groups.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store failure.
    pub fn group_names(&self) -> Result<Vec<String>, ZarrError> {
        self.check_not_deleted()?;
        self.ensure_explored()?;
        Ok(self.inner.state.read().child_group_names.clone())
    }

    /// The names of the child arrays.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a store failure.
    pub fn array_names(&self) -> Result<Vec<String>, ZarrError> {
        self.check_not_deleted()?;
        self.ensure_explored()?;
        Ok(self.inner.state.read().child_array_names.clone())
    }

    /// The dimensions local to this group.
    #[must_use]
    pub fn dimensions(&self) -> Vec<SharedDimension> {
        self.inner.state.read().dimensions.values().cloned().collect()
    }

    /// The dimension named `name`, if registered.
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<SharedDimension> {
        self.inner.state.read().dimensions.get(name).cloned()
    }

    /// Enumerate children once, caching the result.
    fn ensure_explored(&self) -> Result<(), ZarrError> {
        {
            let state = self.inner.state.read();
            if state.explored {
                return Ok(());
            }
        }
        let mut group_names = Vec::new();
        let mut array_names = Vec::new();

        if let Some(keys) = self.inner.ctx.consolidated_keys() {
            // Derive children from the consolidated snapshot without listing.
            let prefix = node_prefix(&self.inner.path);
            for key in keys {
                let Some(relative) = key.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                let Some((child, marker)) = relative.split_once('/') else {
                    continue;
                };
                if marker.contains('/') || !is_valid_node_name(child) {
                    continue;
                }
                match marker {
                    ".zarray" => array_names.push(child.to_string()),
                    ".zgroup" => group_names.push(child.to_string()),
                    "zarr.json" => {
                        // Distinguish by node_type.
                        if let Some(document) = self
                            .inner
                            .ctx
                            .metadata_bytes(&StoreKey::new(&key).expect("consolidated keys are valid"))?
                        {
                            let document: serde_json::Value = serde_json::from_slice(&document)?;
                            match peek_node_type(&document) {
                                Some(NodeTypeV3::Array) => array_names.push(child.to_string()),
                                Some(NodeTypeV3::Group) => group_names.push(child.to_string()),
                                None => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
        } else {
            let listing = self.inner.ctx.store().list_dir(&node_prefix(&self.inner.path))?;
            let entries = listing.keys.len() + listing.prefixes.len();
            if entries as u64 > LISTING_SUPPRESSION_THRESHOLD {
                // Likely a chunk directory; avoid probing thousands of children.
                debug!(
                    "suppressing eager child listing of {} ({entries} entries)",
                    self.inner.path
                );
            } else {
                for child_prefix in &listing.prefixes {
                    let child = child_prefix.name();
                    if !is_valid_node_name(child) {
                        continue;
                    }
                    let child_path = self.inner.path.child(child)?;
                    match self.probe_child_kind(&child_path)? {
                        Some(NodeTypeV3::Array) => array_names.push(child.to_string()),
                        Some(NodeTypeV3::Group) => group_names.push(child.to_string()),
                        None => {}
                    }
                }
            }
        }

        group_names.sort();
        group_names.dedup();
        array_names.sort();
        array_names.dedup();
        let mut state = self.inner.state.write();
        state.child_group_names = group_names;
        state.child_array_names = array_names;
        state.explored = true;
        Ok(())
    }

    /// Determine whether the node at `path` is an array, a group, or neither.
    fn probe_child_kind(&self, path: &NodePath) -> Result<Option<NodeTypeV3>, ZarrError> {
        let ctx = &self.inner.ctx;
        match self.inner.version {
            ZarrVersion::V2 => {
                if ctx.metadata_bytes(&meta_key_v2_array(path))?.is_some() {
                    Ok(Some(NodeTypeV3::Array))
                } else if ctx.metadata_bytes(&meta_key_v2_group(path))?.is_some() {
                    Ok(Some(NodeTypeV3::Group))
                } else {
                    Ok(None)
                }
            }
            ZarrVersion::V3 => {
                if let Some(bytes) = ctx.metadata_bytes(&meta_key_v3(path))? {
                    let document: serde_json::Value = serde_json::from_slice(&bytes)?;
                    Ok(peek_node_type(&document))
                } else {
                    // Implicit group.
                    Ok(Some(NodeTypeV3::Group))
                }
            }
        }
    }

    /// Open the child group `name`.
    ///
    /// # Errors
    /// Returns [`ZarrError::NotFound`] if no such group exists, or a [`ZarrError`] on a
    /// store failure.
    pub fn open_group(&self, name: &str) -> Result<Group, ZarrError> {
        self.check_not_deleted()?;
        if let Some(group) = self.inner.state.read().groups.get(name) {
            return Ok(group.clone());
        }
        if !is_valid_node_name(name) {
            return Err(ZarrError::invalid_argument(format!(
                "{name} is not a valid group name"
            )));
        }
        let path = self.inner.path.child(name)?;
        let _guard = self
            .inner
            .ctx
            .begin_load(path.as_str())
            .ok_or_else(|| ZarrError::format(format!("reference cycle loading {path}")))?;

        let ctx = &self.inner.ctx;
        let group = match self.inner.version {
            ZarrVersion::V2 => {
                let Some(bytes) = ctx.metadata_bytes(&meta_key_v2_group(&path))? else {
                    return Err(ZarrError::NotFound(path.to_string()));
                };
                let _metadata: GroupMetadataV2 = serde_json::from_slice(&bytes)?;
                let attributes = read_v2_attributes(ctx, &path)?;
                Self::new(
                    ctx.clone(),
                    path,
                    ZarrVersion::V2,
                    Arc::downgrade(&self.inner),
                    attributes,
                )
            }
            ZarrVersion::V3 => {
                let attributes = match ctx.metadata_bytes(&meta_key_v3(&path))? {
                    Some(bytes) => {
                        let document: serde_json::Value = serde_json::from_slice(&bytes)?;
                        if peek_node_type(&document) != Some(NodeTypeV3::Group) {
                            return Err(ZarrError::NotFound(path.to_string()));
                        }
                        let metadata: GroupMetadataV3 = serde_json::from_value(document)?;
                        metadata.attributes
                    }
                    // Implicit group.
                    None => Attributes::default(),
                };
                Self::new(
                    ctx.clone(),
                    path,
                    ZarrVersion::V3,
                    Arc::downgrade(&self.inner),
                    attributes,
                )
            }
        };
        self.inner
            .state
            .write()
            .groups
            .insert(name.to_string(), group.clone());
        Ok(group)
    }

    /// Open the child array `name`.
    ///
    /// # Errors
    /// Returns [`ZarrError::NotFound`] if no such array exists, [`ZarrError::Format`] for
    /// unparseable or unsupported metadata, or a [`ZarrError`] on a store failure.
    pub fn open_array(&self, name: &str) -> Result<Arc<Array>, ZarrError> {
        self.check_not_deleted()?;
        if let Some(array) = self.inner.state.read().arrays.get(name) {
            return Ok(array.clone());
        }
        if !is_valid_node_name(name) {
            return Err(ZarrError::invalid_argument(format!(
                "{name} is not a valid array name"
            )));
        }
        let path = self.inner.path.child(name)?;
        let _guard = self
            .inner
            .ctx
            .begin_load(path.as_str())
            .ok_or_else(|| ZarrError::format(format!("reference cycle loading {path}")))?;

        let ctx = &self.inner.ctx;
        let array = match self.inner.version {
            ZarrVersion::V2 => {
                let Some(bytes) = ctx.metadata_bytes(&meta_key_v2_array(&path))? else {
                    return Err(ZarrError::NotFound(path.to_string()));
                };
                let mut metadata: ArrayMetadataV2 = serde_json::from_slice(&bytes)?;
                metadata.attributes = read_v2_attributes(ctx, &path)?;
                let dimension_names = conventions::take_array_dimensions(&mut metadata.attributes);
                let dims =
                    self.resolve_dimensions(dimension_names.as_deref(), &metadata.shape)?;
                Array::from_v2_metadata(
                    ctx.clone(),
                    path,
                    &metadata,
                    dims,
                    dimension_names.is_some(),
                )?
            }
            ZarrVersion::V3 => {
                let Some(bytes) = ctx.metadata_bytes(&meta_key_v3(&path))? else {
                    return Err(ZarrError::NotFound(path.to_string()));
                };
                let document: serde_json::Value = serde_json::from_slice(&bytes)?;
                if peek_node_type(&document) != Some(NodeTypeV3::Array) {
                    return Err(ZarrError::NotFound(path.to_string()));
                }
                let metadata: ArrayMetadataV3 = serde_json::from_value(document)?;
                let dimension_names: Option<Vec<String>> =
                    metadata.dimension_names.as_ref().map(|names| {
                        names
                            .iter()
                            .enumerate()
                            .map(|(axis, name)| {
                                name.clone().unwrap_or_else(|| format!("dim{axis}"))
                            })
                            .collect()
                    });
                let dims =
                    self.resolve_dimensions(dimension_names.as_deref(), &metadata.shape)?;
                Array::from_v3_metadata(ctx.clone(), path, &metadata, dims)?
            }
        };

        array.apply_conventions();
        self.attach_indexing_variable(&array);
        if ctx.options().cache_tile_presence {
            if let Err(err) = array.cache_tile_presence() {
                warn!("tile presence caching failed for {}: {err}", array.path());
            }
        }
        self.inner
            .state
            .write()
            .arrays
            .insert(name.to_string(), array.clone());
        Ok(array)
    }

    /// Resolve (find or create) the dimensions of an array being opened.
    ///
    /// Named dimensions are shared through the group registry and become XArray-bound;
    /// unnamed axes get array-private `dim0..dimN-1` dimensions.
    fn resolve_dimensions(
        &self,
        names: Option<&[String]>,
        shape: &[u64],
    ) -> Result<Vec<SharedDimension>, ZarrError> {
        let mut dims = Vec::with_capacity(shape.len());
        match names {
            Some(names) => {
                if names.len() != shape.len() {
                    return Err(ZarrError::format(format!(
                        "{} dimension names for an array of rank {}",
                        names.len(),
                        shape.len()
                    )));
                }
                let mut state = self.inner.state.write();
                for (name, &size) in std::iter::zip(names, shape) {
                    let existing = state
                        .dimensions
                        .get(name)
                        .filter(|dim| dim.read().size() == size)
                        .cloned();
                    let dim = match existing {
                        Some(dim) => dim,
                        None => {
                            let dim = Dimension::new_shared(name.clone(), size, None, None);
                            // Register only when the name is free; a same-name dimension of
                            // a different size stays private to the array.
                            if !state.dimensions.contains_key(name) {
                                state.dimensions.insert(name.clone(), dim.clone());
                            }
                            dim
                        }
                    };
                    dim.write().bind_xarray();
                    dims.push(dim);
                }
            }
            None => {
                for (axis, &size) in shape.iter().enumerate() {
                    dims.push(Dimension::new_shared(
                        format!("dim{axis}"),
                        size,
                        None,
                        None,
                    ));
                }
            }
        }
        Ok(dims)
    }

    /// Attach `array` as the indexing variable of a same-named rank-1 dimension.
    fn attach_indexing_variable(&self, array: &Arc<Array>) {
        if array.dimensionality() != 1 {
            return;
        }
        let state = self.inner.state.read();
        if let Some(dim) = state.dimensions.get(array.name()) {
            let size_matches = dim.read().size() == array.shape()[0];
            if size_matches {
                if let Err(err) = dim.write().set_indexing_variable(array) {
                    warn!("{err}");
                }
            }
        }
    }

    fn check_name_free(&self, name: &str) -> Result<(), ZarrError> {
        if !is_valid_node_name(name) {
            return Err(ZarrError::invalid_argument(format!(
                "{name} is not a valid node name"
            )));
        }
        self.ensure_explored()?;
        let state = self.inner.state.read();
        if state.groups.contains_key(name)
            || state.arrays.contains_key(name)
            || state.child_group_names.iter().any(|existing| existing == name)
            || state.child_array_names.iter().any(|existing| existing == name)
        {
            return Err(ZarrError::invalid_argument(format!(
                "a group or array named {name} already exists in {}",
                self.inner.path
            )));
        }
        Ok(())
    }

    /// Create the child group `name`.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for an invalid or colliding name, a read-only store, or a
    /// store failure.
    pub fn create_group(&self, name: &str) -> Result<Group, ZarrError> {
        self.check_writable()?;
        self.check_name_free(name)?;
        let path = self.inner.path.child(name)?;
        let ctx = &self.inner.ctx;

        match self.inner.version {
            ZarrVersion::V2 => {
                let document = GroupMetadataV2::default();
                let key = meta_key_v2_group(&path);
                ctx.store().set(&key, &serde_json::to_vec_pretty(&document)?)?;
                ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                });
            }
            ZarrVersion::V3 => {
                let document = GroupMetadataV3::default();
                let key = meta_key_v3(&path);
                ctx.store().set(&key, &serde_json::to_vec_pretty(&document)?)?;
                ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                });
            }
        }

        let group = Self::new(
            ctx.clone(),
            path,
            self.inner.version,
            Arc::downgrade(&self.inner),
            Attributes::default(),
        );
        let mut state = self.inner.state.write();
        state.groups.insert(name.to_string(), group.clone());
        state.child_group_names.push(name.to_string());
        state.child_group_names.sort();
        Ok(group)
    }

    /// Create the child array `name` with `shape`.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for an invalid or colliding name, invalid options, a
    /// read-only store, or a store failure.
    pub fn create_array(
        &self,
        name: &str,
        shape: &[u64],
        options: ArrayCreateOptions,
    ) -> Result<Arc<Array>, ZarrError> {
        self.check_writable()?;
        self.check_name_free(name)?;
        if let Some(names) = &options.dimension_names {
            if names.len() != shape.len() {
                return Err(ZarrError::invalid_argument(format!(
                    "{} dimension names for an array of rank {}",
                    names.len(),
                    shape.len()
                )));
            }
        }
        let path = self.inner.path.child(name)?;
        let dims = self.resolve_dimensions(options.dimension_names.as_deref(), shape)?;
        // The registered dimension may be larger than the requested shape if another array
        // grew it; creation requires exact sizes.
        for (dim, &size) in std::iter::zip(&dims, shape) {
            if dim.read().size() != size {
                return Err(ZarrError::invalid_argument(format!(
                    "dimension {} has size {}, expected {size}",
                    dim.read().name(),
                    dim.read().size()
                )));
            }
        }

        let array = Array::create(
            self.inner.ctx.clone(),
            path,
            self.inner.version,
            &options,
            dims,
        )?;
        array.store_metadata()?;
        array.apply_conventions();
        self.attach_indexing_variable(&array);

        let mut state = self.inner.state.write();
        state.arrays.insert(name.to_string(), array.clone());
        state.child_array_names.push(name.to_string());
        state.child_array_names.sort();
        Ok(array)
    }

    /// Create the dimension `name` of `size`, local to this group.
    ///
    /// If a same-named rank-1 array of matching size is already registered, it is attached
    /// as the indexing variable.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for an invalid or colliding name.
    pub fn create_dimension(
        &self,
        name: &str,
        dim_type: Option<DimensionType>,
        direction: Option<DimensionDirection>,
        size: u64,
    ) -> Result<SharedDimension, ZarrError> {
        self.check_not_deleted()?;
        if !is_valid_node_name(name) {
            return Err(ZarrError::invalid_argument(format!(
                "{name} is not a valid dimension name"
            )));
        }
        let mut state = self.inner.state.write();
        if state.dimensions.contains_key(name) {
            return Err(ZarrError::invalid_argument(format!(
                "a dimension named {name} already exists in {}",
                self.inner.path
            )));
        }
        let dim = Dimension::new_shared(name.to_string(), size, dim_type, direction);
        if let Some(array) = state.arrays.get(name) {
            if array.dimensionality() == 1 && array.shape()[0] == size {
                if let Err(err) = dim.write().set_indexing_variable(array) {
                    warn!("{err}");
                }
            }
        }
        state.dimensions.insert(name.to_string(), dim.clone());
        Ok(dim)
    }

    /// Delete the child array `name`: erase it from the store and invalidate open handles.
    ///
    /// # Errors
    /// Returns [`ZarrError::NotFound`] if no such array exists, or a [`ZarrError`] on a
    /// store failure.
    pub fn delete_array(&self, name: &str) -> Result<(), ZarrError> {
        self.check_writable()?;
        self.ensure_explored()?;
        let path = self.inner.path.child(name)?;
        let mut state = self.inner.state.write();
        let known = state.arrays.contains_key(name)
            || state.child_array_names.iter().any(|existing| existing == name);
        if !known {
            return Err(ZarrError::NotFound(path.to_string()));
        }
        if let Some(array) = state.arrays.remove(name) {
            array.mark_deleted();
        }
        state.child_array_names.retain(|existing| existing != name);
        drop(state);

        let prefix = node_prefix(&path);
        self.inner.ctx.store().erase_prefix(&prefix)?;
        self.inner.ctx.update_consolidated(|snapshot| {
            snapshot.remove_prefix(prefix.as_str());
        });
        Ok(())
    }

    /// Delete the child group `name` and its subtree, invalidating open handles.
    ///
    /// # Errors
    /// Returns [`ZarrError::NotFound`] if no such group exists, or a [`ZarrError`] on a
    /// store failure.
    pub fn delete_group(&self, name: &str) -> Result<(), ZarrError> {
        self.check_writable()?;
        self.ensure_explored()?;
        let path = self.inner.path.child(name)?;
        let mut state = self.inner.state.write();
        let known = state.groups.contains_key(name)
            || state.child_group_names.iter().any(|existing| existing == name);
        if !known {
            return Err(ZarrError::NotFound(path.to_string()));
        }
        if let Some(group) = state.groups.remove(name) {
            group.mark_deleted_recursive();
        }
        state.child_group_names.retain(|existing| existing != name);
        drop(state);

        let prefix = node_prefix(&path);
        self.inner.ctx.store().erase_prefix(&prefix)?;
        self.inner.ctx.update_consolidated(|snapshot| {
            snapshot.remove_prefix(prefix.as_str());
        });
        Ok(())
    }

    fn mark_deleted_recursive(&self) {
        let mut state = self.inner.state.write();
        state.deleted = true;
        for array in state.arrays.values() {
            array.mark_deleted();
        }
        for group in state.groups.values() {
            group.mark_deleted_recursive();
        }
        state.arrays.clear();
        state.groups.clear();
    }

    /// Rename the child array `old_name` to `new_name`.
    ///
    /// The on-disk directory moves, the name table updates, and consolidated-metadata
    /// entries are rewritten under the new path. Open handles to the old name are
    /// invalidated; reopen under the new name.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for a missing source, a colliding destination, or a store
    /// failure.
    pub fn rename_array(&self, old_name: &str, new_name: &str) -> Result<(), ZarrError> {
        self.check_writable()?;
        self.ensure_explored()?;
        self.check_name_free(new_name)?;
        let old_path = self.inner.path.child(old_name)?;
        let new_path = self.inner.path.child(new_name)?;

        let mut state = self.inner.state.write();
        let known = state.arrays.contains_key(old_name)
            || state
                .child_array_names
                .iter()
                .any(|existing| existing == old_name);
        if !known {
            return Err(ZarrError::NotFound(old_path.to_string()));
        }
        if let Some(array) = state.arrays.remove(old_name) {
            array.flush()?;
            array.mark_deleted();
        }
        state.child_array_names.retain(|existing| existing != old_name);
        state.child_array_names.push(new_name.to_string());
        state.child_array_names.sort();
        drop(state);

        let old_prefix = node_prefix(&old_path);
        let new_prefix = node_prefix(&new_path);
        self.inner.ctx.store().rename_prefix(&old_prefix, &new_prefix)?;
        self.inner.ctx.update_consolidated(|snapshot| {
            snapshot.rename_prefix(old_prefix.as_str(), new_prefix.as_str());
        });
        Ok(())
    }

    /// Rename the dimension `old_name` to `new_name`.
    ///
    /// Only XArray-bound dimensions may be renamed; the new name carries through every
    /// array that lists the dimension when its metadata is next written.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for a missing or non-renameable dimension or a colliding
    /// name.
    pub fn rename_dimension(&self, old_name: &str, new_name: &str) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.inner.state.write();
        if state.dimensions.contains_key(new_name) {
            return Err(ZarrError::invalid_argument(format!(
                "a dimension named {new_name} already exists in {}",
                self.inner.path
            )));
        }
        let Some(dim) = state.dimensions.remove(old_name) else {
            return Err(ZarrError::NotFound(format!(
                "dimension {old_name} in {}",
                self.inner.path
            )));
        };
        let rename_result = dim.write().rename(new_name);
        if let Err(err) = rename_result {
            state.dimensions.insert(old_name.to_string(), dim);
            return Err(err);
        }
        state.dimensions.insert(new_name.to_string(), dim.clone());
        // Arrays listing the dimension must rewrite their metadata.
        for array in state.arrays.values() {
            if array
                .dimensions()
                .iter()
                .any(|array_dim| Arc::ptr_eq(array_dim, &dim))
            {
                array.state.write().modified = true;
            }
        }
        Ok(())
    }

    /// Flush this group and its open children: dirty chunks, modified array metadata, and
    /// modified group attributes.
    ///
    /// # Errors
    /// Returns the first error; remaining children are still attempted.
    pub fn flush(&self) -> Result<(), ZarrError> {
        if self.inner.state.read().deleted {
            return Ok(());
        }
        let (arrays, groups, modified) = {
            let state = self.inner.state.read();
            (
                state.arrays.values().cloned().collect::<Vec<_>>(),
                state.groups.values().cloned().collect::<Vec<_>>(),
                state.modified,
            )
        };
        let mut first_error = None;
        if modified && !self.inner.ctx.read_only() {
            if let Err(err) = self.store_metadata() {
                first_error.get_or_insert(err);
            } else {
                self.inner.state.write().modified = false;
            }
        }
        for array in arrays {
            if let Err(err) = array.flush() {
                first_error.get_or_insert(err);
            }
        }
        for group in groups {
            if let Err(err) = group.flush() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Write the group metadata documents.
    fn store_metadata(&self) -> Result<(), ZarrError> {
        let ctx = &self.inner.ctx;
        let attributes = self.inner.state.read().attributes.clone();
        match self.inner.version {
            ZarrVersion::V2 => {
                let key = meta_key_v2_group(&self.inner.path);
                let document = GroupMetadataV2::default();
                ctx.store().set(&key, &serde_json::to_vec_pretty(&document)?)?;
                let attrs_key = meta_key_v2_attributes(&self.inner.path);
                if attributes.is_empty() {
                    ctx.store().erase(&attrs_key)?;
                } else {
                    ctx.store()
                        .set(&attrs_key, &serde_json::to_vec_pretty(&attributes)?)?;
                }
                ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                    if attributes.is_empty() {
                        snapshot.remove_prefix(attrs_key.as_str());
                    } else {
                        snapshot.insert(
                            attrs_key.as_str().to_string(),
                            serde_json::Value::Object(attributes.clone()),
                        );
                    }
                });
            }
            ZarrVersion::V3 => {
                let key = meta_key_v3(&self.inner.path);
                let document = GroupMetadataV3 {
                    attributes: attributes.clone(),
                    ..GroupMetadataV3::default()
                };
                ctx.store().set(&key, &serde_json::to_vec_pretty(&document)?)?;
                ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                });
            }
        }
        Ok(())
    }

    /// Write the metadata of a newly created root group (used by store creation).
    pub(crate) fn bootstrap_root(&self) -> Result<(), ZarrError> {
        self.store_metadata()
    }
}

fn read_v2_attributes(
    ctx: &Arc<StoreContext>,
    path: &NodePath,
) -> Result<Attributes, ZarrError> {
    match ctx.metadata_bytes(&meta_key_v2_attributes(path))? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Attributes::default()),
    }
}
