//! Zarr arrays.
//!
//! An [`Array`] is a node in a Zarr hierarchy holding chunked multidimensional data. It
//! carries the chunk grid, data type, fill value and codec chain, binds one
//! [`Dimension`](crate::dimension::Dimension) per axis, and implements strided
//! n-dimensional [`read`](Array::read)/[`write`](Array::write) with data type conversion,
//! monotonic [`resize`](Array::resize), and thread-pooled prefetch
//! ([`advise_read`](Array::advise_read)).
//!
//! Writes batch in a single dirty chunk slot; accessing a different chunk flushes the slot.
//! [`flush`](Array::flush) persists the dirty chunk and any modified metadata.

pub(crate) mod chunk_cache;
pub mod chunk_grid;
pub mod chunk_key;
pub mod chunk_layout;
pub mod codec;
pub mod conventions;
pub mod data_type;
pub mod endianness;
pub mod fill_value;
mod chunk_io;
mod prefetch;
mod read_write;
mod tile_presence;

pub use chunk_grid::RegularChunkGrid;
pub use chunk_key::ChunkKeyEncoding;
pub use chunk_layout::ChunkLayout;
pub use codec::{CodecChain, CodecRegistry};
pub use conventions::CrsDefinition;
pub use data_type::{CompoundField, DataType};
pub use endianness::{Endianness, NATIVE_ENDIAN};
pub use fill_value::FillValue;
pub use tile_presence::FillingStatus;

pub(crate) use tile_presence::list_keys_recursive;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    array_subset::ArrayShape,
    config::{CompressOption, FilterOption},
    context::StoreContext,
    dimension::SharedDimension,
    error::ZarrError,
    metadata::{
        Attributes, ChunkKeySeparator, FillValueMetadata,
        v2::{
            ArrayMetadataV2, DataTypeMetadataV2, MemoryOrderV2, MetadataV2, StructuredFieldV2,
        },
        v3::{
            ArrayMetadataV3, ChunkKeyEncodingConfiguration, MetadataV3,
            RegularChunkGridConfiguration,
        },
    },
    node::NodePath,
    storage::{StoreKey, meta_key_v2_array, meta_key_v2_attributes, meta_key_v3},
    version::ZarrVersion,
};

use chunk_cache::ChunkCache;
use tile_presence::TilePresence;

/// A progress callback: receives the completed fraction, returns false to abort.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) -> bool + Send + Sync);

/// A typed array element.
pub trait Element: bytemuck::Pod {
    /// The array data type matching this element type.
    fn data_type() -> DataType;
}

macro_rules! impl_element {
    ($($t:ty => $d:expr),* $(,)?) => {
        $(
            impl Element for $t {
                fn data_type() -> DataType {
                    $d
                }
            }
        )*
    };
}
impl_element!(
    i8 => DataType::Int8,
    i16 => DataType::Int16,
    i32 => DataType::Int32,
    i64 => DataType::Int64,
    u8 => DataType::UInt8,
    u16 => DataType::UInt16,
    u32 => DataType::UInt32,
    u64 => DataType::UInt64,
    half::f16 => DataType::Float16,
    f32 => DataType::Float32,
    f64 => DataType::Float64,
    num_complex::Complex32 => DataType::Complex64,
    num_complex::Complex64 => DataType::Complex128,
);

/// Transmute from `Vec<u8>` to `Vec<T>`.
#[must_use]
pub fn transmute_from_bytes_vec<T: bytemuck::Pod>(from: Vec<u8>) -> Vec<T> {
    bytemuck::allocation::try_cast_vec(from)
        .unwrap_or_else(|(_err, from)| bytemuck::allocation::pod_collect_to_vec(&from))
}

/// Transmute from `Vec<T>` to `Vec<u8>`.
#[must_use]
pub fn transmute_to_bytes_vec<T: bytemuck::NoUninit>(from: Vec<T>) -> Vec<u8> {
    bytemuck::allocation::try_cast_vec(from)
        .unwrap_or_else(|(_err, from)| bytemuck::allocation::pod_collect_to_vec(&from))
}

/// The format-specific state of an array.
#[derive(Clone, Debug)]
pub enum ArrayKind {
    /// A Zarr V2 array.
    V2 {
        /// The chunk memory layout recorded in `.zarray`.
        order: MemoryOrderV2,
    },
    /// A Zarr V3 array.
    V3,
}

/// Raw storage information of one chunk, for callers reading chunk bytes directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawChunkInfo {
    /// The store key of the blob holding the chunk (the shard blob for sharded arrays).
    pub key: StoreKey,
    /// The byte offset of the chunk payload within the blob.
    pub offset: u64,
    /// The byte length of the chunk payload.
    pub length: u64,
    /// Whether the chunk exists in the store.
    pub exists: bool,
}

/// Options for creating an array.
#[derive(Clone, Debug)]
pub struct ArrayCreateOptions {
    /// The data type.
    pub data_type: DataType,
    /// The outer chunk shape. Defaults to 256 along the two trailing axes and 1 elsewhere,
    /// clipped to the array shape.
    pub chunk_shape: Option<Vec<u64>>,
    /// The inner chunk shape; enables `sharding_indexed` (Zarr V3 only).
    pub inner_chunk_shape: Option<Vec<u64>>,
    /// The fill value; unwritten chunks read as zero when [`None`].
    pub fill_value: Option<FillValue>,
    /// The compressor.
    pub compressor: CompressOption,
    /// The filter (Zarr V2 only).
    pub filter: FilterOption,
    /// The chunk key separator.
    pub dim_separator: Option<ChunkKeySeparator>,
    /// Write chunks in Fortran (column-major) order (Zarr V2 only).
    pub fortran_order: bool,
    /// The on-disk byte order.
    pub endian: Option<Endianness>,
    /// Codec parameters.
    pub codec_params: crate::config::CodecParams,
    /// Dimension names binding the array axes to group dimensions.
    pub dimension_names: Option<Vec<String>>,
    /// Initial user attributes.
    pub attributes: Attributes,
}

impl ArrayCreateOptions {
    /// Apply parsed key/value creation options (`COMPRESS`, `FILTER`, `BLOCKSIZE`, ...)
    /// over these options.
    ///
    /// `STRING_FORMAT` switches a string data type between its ASCII and UCS-4
    /// representations; it has no effect on other data types.
    pub fn apply_kv(&mut self, kv: &crate::config::CreationKvOptions) {
        self.compressor = kv.compress;
        self.filter = kv.filter;
        if let Some(blocksize) = &kv.blocksize {
            self.chunk_shape = Some(blocksize.clone());
        }
        if kv.dim_separator.is_some() {
            self.dim_separator = kv.dim_separator;
        }
        self.fortran_order = kv.fortran_order;
        if kv.endian.is_some() {
            self.endian = kv.endian;
        }
        self.codec_params = kv.codec_params.clone();
        match (&self.data_type, kv.string_format) {
            (DataType::Ascii(n), crate::config::StringFormat::Unicode) => {
                self.data_type = DataType::Unicode(*n);
            }
            (DataType::Unicode(n), crate::config::StringFormat::Ascii) => {
                self.data_type = DataType::Ascii(*n);
            }
            _ => {}
        }
    }
}

impl Default for ArrayCreateOptions {
    fn default() -> Self {
        Self {
            data_type: DataType::Float64,
            chunk_shape: None,
            inner_chunk_shape: None,
            fill_value: None,
            compressor: CompressOption::None,
            filter: FilterOption::None,
            dim_separator: None,
            fortran_order: false,
            endian: None,
            codec_params: crate::config::CodecParams::default(),
            dimension_names: None,
            attributes: Attributes::default(),
        }
    }
}

pub(crate) struct ArrayState {
    pub attributes: Attributes,
    pub unit: Option<String>,
    pub offset: Option<f64>,
    pub scale: Option<f64>,
    pub crs: Option<CrsDefinition>,
    pub geotransform: Option<[f64; 6]>,
    pub deleted: bool,
    pub modified: bool,
}

/// A Zarr array.
pub struct Array {
    ctx: Arc<StoreContext>,
    path: NodePath,
    kind: ArrayKind,
    data_type: DataType,
    endianness: Endianness,
    fill_value: Option<FillValue>,
    grid: RegularChunkGrid,
    inner_chunk_shape: Vec<u64>,
    codecs: CodecChain,
    key_encoding: ChunkKeyEncoding,
    dims: Vec<SharedDimension>,
    xarray_named: bool,
    pub(crate) state: RwLock<ArrayState>,
    pub(crate) cache: Mutex<ChunkCache>,
    pub(crate) presence: Mutex<Option<TilePresence>>,
}

impl core::fmt::Debug for Array {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Array")
            .field("path", &self.path)
            .field("data_type", &self.data_type)
            .field("shape", &self.shape())
            .field("chunk_shape", &self.grid.chunk_shape())
            .field("inner_chunk_shape", &self.inner_chunk_shape)
            .finish_non_exhaustive()
    }
}

impl Array {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        ctx: Arc<StoreContext>,
        path: NodePath,
        kind: ArrayKind,
        data_type: DataType,
        endianness: Endianness,
        fill_value: Option<FillValue>,
        outer_chunk_shape: Vec<u64>,
        codecs: CodecChain,
        key_encoding: ChunkKeyEncoding,
        dims: Vec<SharedDimension>,
        xarray_named: bool,
        attributes: Attributes,
    ) -> Result<Arc<Self>, ZarrError> {
        let shape: Vec<u64> = dims.iter().map(|dim| dim.read().size()).collect();
        if shape.len() != outer_chunk_shape.len() {
            return Err(ZarrError::format(format!(
                "chunk shape {outer_chunk_shape:?} does not match array shape {shape:?}"
            )));
        }
        let grid = RegularChunkGrid::new(outer_chunk_shape)
            .map_err(|err| ZarrError::format(err.to_string()))?;
        let inner_chunk_shape = codecs
            .inner_chunk_shape(grid.chunk_shape())
            .unwrap_or_else(|| grid.chunk_shape().to_vec());

        // The inner chunk count must fit in 64 bits and one decoded inner chunk must be
        // addressable (and within the big-tile gate).
        let inner_grid = RegularChunkGrid::new(inner_chunk_shape.clone())
            .map_err(|err| ZarrError::format(err.to_string()))?;
        inner_grid
            .num_chunks(&shape)
            .map_err(|err| ZarrError::format(err.to_string()))?;
        let inner_elements: u64 = inner_chunk_shape.iter().product();
        let inner_bytes = inner_elements
            .checked_mul(data_type.size() as u64)
            .ok_or(ZarrError::OutOfMemory(u64::MAX))?;
        ctx.check_chunk_allocation(inner_bytes)?;

        Ok(Arc::new(Self {
            ctx,
            path,
            kind,
            data_type,
            endianness,
            fill_value,
            grid,
            inner_chunk_shape,
            codecs,
            key_encoding,
            dims,
            xarray_named,
            state: RwLock::new(ArrayState {
                attributes,
                unit: None,
                offset: None,
                scale: None,
                crs: None,
                geotransform: None,
                deleted: false,
                modified: false,
            }),
            cache: Mutex::new(ChunkCache::default()),
            presence: Mutex::new(None),
        }))
    }

    /// Build an array from Zarr V2 metadata.
    pub(crate) fn from_v2_metadata(
        ctx: Arc<StoreContext>,
        path: NodePath,
        metadata: &ArrayMetadataV2,
        dims: Vec<SharedDimension>,
        xarray_named: bool,
    ) -> Result<Arc<Self>, ZarrError> {
        let (data_type, endianness) = match &metadata.dtype {
            DataTypeMetadataV2::Simple(dtype) => DataType::from_v2_dtype(dtype)
                .map_err(|err| ZarrError::format(err.to_string()))?,
            DataTypeMetadataV2::Structured(fields) => {
                let mut endianness = None;
                let mut compound = Vec::with_capacity(fields.len());
                for StructuredFieldV2(name, dtype) in fields {
                    let (field_type, field_endianness) = DataType::from_v2_dtype(dtype)
                        .map_err(|err| ZarrError::format(err.to_string()))?;
                    endianness = endianness.or(field_endianness);
                    compound.push(CompoundField {
                        name: name.clone(),
                        data_type: field_type,
                    });
                }
                (DataType::Compound(compound), endianness)
            }
        };
        let endianness = endianness.unwrap_or(NATIVE_ENDIAN);

        let fill_value = FillValue::from_metadata(&data_type, &metadata.fill_value)
            .map_err(|err| ZarrError::format(err.to_string()))?;

        let mut chain = vec![codec::Codec::Bytes(codec::BytesCodec::new(Some(endianness)))];
        if metadata.order == MemoryOrderV2::F {
            chain.push(codec::Codec::Transpose(codec::TransposeCodec::f_order()));
        }
        for filter in metadata.filters.as_deref().unwrap_or_default() {
            chain.push(ctx.registry().codec_from_v2(filter, &data_type)?);
        }
        if let Some(compressor) = &metadata.compressor {
            chain.push(ctx.registry().codec_from_v2(compressor, &data_type)?);
        }

        Self::from_parts(
            ctx,
            path,
            ArrayKind::V2 {
                order: metadata.order,
            },
            data_type,
            endianness,
            fill_value,
            metadata.chunks.clone(),
            CodecChain::new(chain),
            ChunkKeyEncoding::V2(metadata.dimension_separator),
            dims,
            xarray_named,
            metadata.attributes.clone(),
        )
    }

    /// Build an array from Zarr V3 metadata.
    pub(crate) fn from_v3_metadata(
        ctx: Arc<StoreContext>,
        path: NodePath,
        metadata: &ArrayMetadataV3,
        dims: Vec<SharedDimension>,
    ) -> Result<Arc<Self>, ZarrError> {
        if metadata
            .storage_transformers
            .as_ref()
            .is_some_and(|transformers| !transformers.is_empty())
        {
            return Err(ZarrError::Unsupported(
                "storage transformers are not supported".to_string(),
            ));
        }

        let data_type = DataType::from_v3_name(&metadata.data_type)
            .map_err(|err| ZarrError::format(err.to_string()))?;
        let fill_value = FillValue::from_metadata(&data_type, &metadata.fill_value)
            .map_err(|err| ZarrError::format(err.to_string()))?;

        if metadata.chunk_grid.name != "regular" {
            return Err(ZarrError::format(format!(
                "unsupported chunk grid {}",
                metadata.chunk_grid.name
            )));
        }
        let grid_configuration: RegularChunkGridConfiguration =
            metadata.chunk_grid.to_configuration()?;

        let key_encoding = match metadata.chunk_key_encoding.name.as_str() {
            "default" => ChunkKeyEncoding::Default(
                metadata
                    .chunk_key_encoding
                    .to_configuration::<ChunkKeyEncodingConfiguration>()
                    .map(|configuration| configuration.separator)
                    .unwrap_or(ChunkKeySeparator::Slash),
            ),
            "v2" => ChunkKeyEncoding::V2(
                metadata
                    .chunk_key_encoding
                    .to_configuration::<ChunkKeyEncodingConfiguration>()
                    .map(|configuration| configuration.separator)
                    .unwrap_or(ChunkKeySeparator::Dot),
            ),
            other => {
                return Err(ZarrError::format(format!(
                    "unsupported chunk key encoding {other}"
                )));
            }
        };

        let codecs = match &metadata.codecs {
            Some(codecs) => ctx.registry().chain_from_v3(codecs, &data_type)?,
            None => CodecChain::new(vec![codec::Codec::Bytes(codec::BytesCodec::little())]),
        };
        let endianness = codecs
            .codecs()
            .iter()
            .find_map(|stage| match stage {
                codec::Codec::Bytes(bytes) => bytes.endian(),
                _ => None,
            })
            .unwrap_or(Endianness::Little);

        let xarray_named = metadata.dimension_names.is_some();
        Self::from_parts(
            ctx,
            path,
            ArrayKind::V3,
            data_type,
            endianness,
            fill_value,
            grid_configuration.chunk_shape,
            codecs,
            key_encoding,
            dims,
            xarray_named,
            metadata.attributes.clone(),
        )
    }

    /// Build a new array with `options`, to be written at `path` in `version` format.
    pub(crate) fn create(
        ctx: Arc<StoreContext>,
        path: NodePath,
        version: ZarrVersion,
        options: &ArrayCreateOptions,
        dims: Vec<SharedDimension>,
    ) -> Result<Arc<Self>, ZarrError> {
        let shape: Vec<u64> = dims.iter().map(|dim| dim.read().size()).collect();
        let chunk_shape = match &options.chunk_shape {
            Some(chunk_shape) => chunk_shape.clone(),
            None => default_chunk_shape(&shape),
        };
        let endianness = options.endian.unwrap_or(Endianness::Little);
        let data_type = &options.data_type;

        let mut chain = vec![codec::Codec::Bytes(codec::BytesCodec::new(Some(endianness)))];
        match version {
            ZarrVersion::V2 => {
                if options.fortran_order {
                    chain.push(codec::Codec::Transpose(codec::TransposeCodec::f_order()));
                }
                match options.filter {
                    FilterOption::None => {}
                    FilterOption::Shuffle => {
                        let elementsize = options
                            .codec_params
                            .shuffle_elementsize
                            .unwrap_or_else(|| data_type.non_complex_size());
                        chain.push(codec::Codec::Shuffle(codec::ShuffleCodec::new(elementsize)?));
                    }
                    FilterOption::Delta => {
                        let dtype = match &options.codec_params.delta_dtype {
                            Some(dtype) => dtype.clone(),
                            None => data_type
                                .to_v2_dtype(endianness)
                                .map_err(|err| ZarrError::format(err.to_string()))?,
                        };
                        chain.push(codec::Codec::Delta(codec::DeltaCodec::new(&dtype)?));
                    }
                }
            }
            ZarrVersion::V3 => {
                if options.fortran_order {
                    return Err(ZarrError::Unsupported(
                        "CHUNK_MEMORY_LAYOUT=F applies to Zarr V2 arrays only".to_string(),
                    ));
                }
                if options.filter != FilterOption::None {
                    return Err(ZarrError::Unsupported(
                        "filters apply to Zarr V2 arrays only".to_string(),
                    ));
                }
            }
        }
        match options.compressor {
            CompressOption::None => {}
            CompressOption::Gzip => {
                let level = options.codec_params.gzip_level.unwrap_or(6);
                chain.push(codec::Codec::Gzip(
                    codec::GzipCodec::new(level).map_err(|level| {
                        ZarrError::invalid_argument(format!("invalid gzip level {level}"))
                    })?,
                ));
            }
            CompressOption::Zstd => {
                let level = options.codec_params.zstd_level.unwrap_or(13);
                chain.push(codec::Codec::Zstd(codec::ZstdCodec::new(level, false)));
            }
            #[cfg(feature = "blosc")]
            CompressOption::Blosc => {
                chain.push(blosc_codec_from_params(&options.codec_params, data_type)?);
            }
        }

        let (kind, key_encoding, outer_chunk_shape, chain) = match version {
            ZarrVersion::V2 => {
                if options.inner_chunk_shape.is_some() {
                    return Err(ZarrError::Unsupported(
                        "sharding applies to Zarr V3 arrays only".to_string(),
                    ));
                }
                (
                    ArrayKind::V2 {
                        order: if options.fortran_order {
                            MemoryOrderV2::F
                        } else {
                            MemoryOrderV2::C
                        },
                    },
                    ChunkKeyEncoding::V2(options.dim_separator.unwrap_or(ChunkKeySeparator::Dot)),
                    chunk_shape,
                    chain,
                )
            }
            ZarrVersion::V3 => {
                let key_encoding = ChunkKeyEncoding::Default(
                    options.dim_separator.unwrap_or(ChunkKeySeparator::Slash),
                );
                if let Some(inner) = &options.inner_chunk_shape {
                    // The inner chain holds the data codecs; the outer chain is the shard.
                    let sharding = codec::ShardingCodec::new(
                        inner.clone(),
                        CodecChain::new(chain),
                        endianness,
                        codec::ShardIndexLocation::End,
                    )?;
                    (
                        ArrayKind::V3,
                        key_encoding,
                        chunk_shape,
                        vec![codec::Codec::Sharding(Box::new(sharding))],
                    )
                } else {
                    (ArrayKind::V3, key_encoding, chunk_shape, chain)
                }
            }
        };

        let array = Self::from_parts(
            ctx,
            path,
            kind,
            data_type.clone(),
            endianness,
            options.fill_value.clone(),
            outer_chunk_shape,
            CodecChain::new(chain),
            key_encoding,
            dims,
            options.dimension_names.is_some(),
            options.attributes.clone(),
        )?;
        array.state.write().modified = true;
        Ok(array)
    }

    /// The store context.
    #[must_use]
    pub(crate) fn ctx(&self) -> &Arc<StoreContext> {
        &self.ctx
    }

    /// The node path of the array.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The name of the array.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// The on-disk byte order.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The declared fill value, if any.
    #[must_use]
    pub fn fill_value(&self) -> Option<&FillValue> {
        self.fill_value.as_ref()
    }

    /// The fill value used for missing chunks: the declared one, or zero.
    #[must_use]
    pub fn effective_fill_value(&self) -> FillValue {
        self.fill_value
            .clone()
            .unwrap_or_else(|| FillValue::zero(&self.data_type))
    }

    /// The array shape, read through the bound dimensions.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        self.dims.iter().map(|dim| dim.read().size()).collect()
    }

    /// The array rank.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dims.len()
    }

    /// The bound dimensions.
    #[must_use]
    pub fn dimensions(&self) -> &[SharedDimension] {
        &self.dims
    }

    /// Whether the array names its dimensions (`_ARRAY_DIMENSIONS` / `dimension_names`).
    #[must_use]
    pub fn is_xarray_named(&self) -> bool {
        self.xarray_named
    }

    /// The outer chunk shape (the shard shape for sharded arrays).
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        self.grid.chunk_shape()
    }

    /// The inner chunk shape: the unit of caching and user-visible chunking.
    #[must_use]
    pub fn inner_chunk_shape(&self) -> &[u64] {
        &self.inner_chunk_shape
    }

    /// The codec chain.
    #[must_use]
    pub fn codecs(&self) -> &CodecChain {
        &self.codecs
    }

    /// The chunk key encoding.
    #[must_use]
    pub fn chunk_key_encoding(&self) -> &ChunkKeyEncoding {
        &self.key_encoding
    }

    /// The outer chunk grid.
    #[must_use]
    pub(crate) fn grid(&self) -> &RegularChunkGrid {
        &self.grid
    }

    /// Whether the array is sharded (inner chunks differ from outer chunks).
    #[must_use]
    pub fn is_sharded(&self) -> bool {
        self.codecs.sharding_codec().is_some()
    }

    /// The storage format of the array.
    #[must_use]
    pub fn zarr_version(&self) -> ZarrVersion {
        match self.kind {
            ArrayKind::V2 { .. } => ZarrVersion::V2,
            ArrayKind::V3 => ZarrVersion::V3,
        }
    }

    /// Whether the array rejects writes.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.ctx.read_only()
    }

    /// The number of chunks held by the prefetch cache map.
    #[must_use]
    pub fn cached_chunk_count(&self) -> usize {
        self.cache.lock().map_len()
    }

    /// Drop every prefetched chunk from the cache map.
    pub fn clear_chunk_cache(&self) {
        self.cache.lock().clear_map();
    }

    /// The user attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.state.read().attributes.clone()
    }

    /// Set a user attribute.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted array.
    pub fn set_attribute(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.state.write();
        state.attributes.insert(name.to_string(), value);
        state.modified = true;
        Ok(())
    }

    /// Delete a user attribute. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted array.
    pub fn delete_attribute(&self, name: &str) -> Result<bool, ZarrError> {
        self.check_writable()?;
        let mut state = self.state.write();
        let removed = state.attributes.remove(name).is_some();
        state.modified |= removed;
        Ok(removed)
    }

    /// The unit of the array values, lifted from CF `units`.
    #[must_use]
    pub fn unit(&self) -> Option<String> {
        self.state.read().unit.clone()
    }

    /// The value offset, lifted from CF `add_offset`.
    #[must_use]
    pub fn offset(&self) -> Option<f64> {
        self.state.read().offset
    }

    /// The value scale, lifted from CF `scale_factor`.
    #[must_use]
    pub fn scale(&self) -> Option<f64> {
        self.state.read().scale
    }

    /// The spatial reference, lifted from the geo conventions.
    #[must_use]
    pub fn crs(&self) -> Option<CrsDefinition> {
        self.state.read().crs.clone()
    }

    /// The affine geotransform, lifted from the geo conventions.
    #[must_use]
    pub fn geotransform(&self) -> Option<[f64; 6]> {
        self.state.read().geotransform
    }

    /// Set the unit of the array values.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted array.
    pub fn set_unit(&self, unit: &str) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.state.write();
        state.unit = Some(unit.to_string());
        state.modified = true;
        Ok(())
    }

    /// Set the value offset and scale.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted array.
    pub fn set_offset_scale(&self, offset: f64, scale: f64) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.state.write();
        state.offset = Some(offset);
        state.scale = Some(scale);
        state.modified = true;
        Ok(())
    }

    /// Record computed statistics: writes the `actual_range` attribute.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only or deleted array.
    pub fn set_statistics(&self, minimum: f64, maximum: f64) -> Result<(), ZarrError> {
        self.check_writable()?;
        let mut state = self.state.write();
        state.attributes.insert(
            "actual_range".to_string(),
            serde_json::json!([minimum, maximum]),
        );
        state.modified = true;
        Ok(())
    }

    pub(crate) fn check_not_deleted(&self) -> Result<(), ZarrError> {
        if self.state.read().deleted {
            return Err(ZarrError::NotFound(self.path.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<(), ZarrError> {
        self.check_not_deleted()?;
        if self.read_only() {
            return Err(ZarrError::Unsupported(format!(
                "array {} is read-only",
                self.path
            )));
        }
        Ok(())
    }

    /// Mark the array deleted; subsequent access errors with
    /// [`NotFound`](ZarrError::NotFound).
    pub(crate) fn mark_deleted(&self) {
        self.state.write().deleted = true;
        self.cache.lock().invalidate();
    }

    /// Grow the array to `new_shape`.
    ///
    /// Every dimension of the array observes the new size, as do sibling arrays bound to
    /// the same dimensions (on their next access). Shrinking is rejected. A dimension
    /// referenced by several axes must receive the same size on each.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a shrinking resize, inconsistent sizes for a shared
    /// dimension, a wrong rank, or a read-only array.
    pub fn resize(&self, new_shape: &[u64]) -> Result<(), ZarrError> {
        self.check_writable()?;
        if new_shape.len() != self.dimensionality() {
            return Err(ZarrError::invalid_argument(format!(
                "resize shape {new_shape:?} does not have rank {}",
                self.dimensionality()
            )));
        }
        // Validate before mutating: monotonic growth and shared-dimension consistency.
        for (axis, (dim, &new_size)) in std::iter::zip(&self.dims, new_shape).enumerate() {
            if new_size < dim.read().size() {
                return Err(ZarrError::Unsupported(format!(
                    "shrinking axis {axis} from {} to {new_size}",
                    dim.read().size()
                )));
            }
            for (other_axis, other) in self.dims.iter().enumerate() {
                if other_axis != axis
                    && Arc::ptr_eq(dim, other)
                    && new_shape[other_axis] != new_size
                {
                    return Err(ZarrError::invalid_argument(format!(
                        "axes {axis} and {other_axis} share a dimension but received sizes \
                         {new_size} and {}",
                        new_shape[other_axis]
                    )));
                }
            }
        }
        for (dim, &new_size) in std::iter::zip(&self.dims, new_shape) {
            dim.write().resize(new_size)?;
        }
        self.state.write().modified = true;
        Ok(())
    }

    /// Persist the dirty chunk (if any) and rewrite the metadata if it was modified.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the flush fails; the chunk stays dirty and the next
    /// flush retries.
    pub fn flush(&self) -> Result<(), ZarrError> {
        self.check_not_deleted()?;
        {
            let mut cache = self.cache.lock();
            self.flush_dirty(&mut cache)?;
        }
        let modified = self.state.read().modified;
        if modified && !self.read_only() {
            self.store_metadata()?;
            self.state.write().modified = false;
        }
        Ok(())
    }

    /// Write the array metadata documents to the store and the consolidated snapshot.
    pub(crate) fn store_metadata(&self) -> Result<(), ZarrError> {
        match self.kind {
            ArrayKind::V2 { .. } => {
                let (document, attributes) = self.to_v2_document()?;
                let key = meta_key_v2_array(&self.path);
                let bytes = serde_json::to_vec_pretty(&document)?;
                self.ctx.store().set(&key, &bytes)?;
                self.ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                });
                let attrs_key = meta_key_v2_attributes(&self.path);
                if attributes.is_empty() {
                    self.ctx.store().erase(&attrs_key)?;
                    self.ctx.update_consolidated(|snapshot| {
                        snapshot.remove_prefix(attrs_key.as_str());
                    });
                } else {
                    let bytes = serde_json::to_vec_pretty(&attributes)?;
                    self.ctx.store().set(&attrs_key, &bytes)?;
                    self.ctx.update_consolidated(|snapshot| {
                        snapshot.insert(
                            attrs_key.as_str().to_string(),
                            serde_json::Value::Object(attributes.clone()),
                        );
                    });
                }
            }
            ArrayKind::V3 => {
                let document = self.to_v3_document()?;
                let key = meta_key_v3(&self.path);
                let bytes = serde_json::to_vec_pretty(&document)?;
                self.ctx.store().set(&key, &bytes)?;
                self.ctx.update_consolidated(|snapshot| {
                    if let Ok(value) = serde_json::to_value(&document) {
                        snapshot.insert(key.as_str().to_string(), value);
                    }
                });
            }
        }
        Ok(())
    }

    /// The serializable user attributes, with lifted fields written back.
    fn serializable_attributes(&self) -> Attributes {
        let state = self.state.read();
        let mut attributes = state.attributes.clone();
        if let Some(unit) = &state.unit {
            attributes.insert("units".to_string(), serde_json::json!(unit));
        }
        if let Some(offset) = state.offset {
            attributes.insert("add_offset".to_string(), serde_json::json!(offset));
        }
        if let Some(scale) = state.scale {
            attributes.insert("scale_factor".to_string(), serde_json::json!(scale));
        }
        match &state.crs {
            Some(CrsDefinition::Wkt(wkt)) => {
                attributes.insert("proj:wkt2".to_string(), serde_json::json!(wkt));
            }
            Some(CrsDefinition::ProjJson(projjson)) => {
                attributes.insert("proj:projjson".to_string(), projjson.clone());
            }
            Some(CrsDefinition::Epsg(epsg)) => {
                attributes.insert("proj:epsg".to_string(), serde_json::json!(epsg));
            }
            Some(CrsDefinition::Code(code)) => {
                attributes.insert("proj:code".to_string(), serde_json::json!(code));
            }
            Some(CrsDefinition::GridMappingName(name)) => {
                attributes.insert("grid_mapping".to_string(), serde_json::json!(name));
            }
            None => {}
        }
        if let Some(geotransform) = state.geotransform {
            attributes.insert(
                "spatial:transform".to_string(),
                serde_json::json!(geotransform.to_vec()),
            );
        }
        if self.dimensionality() == 1 {
            let dim_type = self.dims[0].read().dim_type();
            if let Some(dim_type) = dim_type {
                let axis = match dim_type {
                    crate::dimension::DimensionType::HorizontalX => "X",
                    crate::dimension::DimensionType::HorizontalY => "Y",
                    crate::dimension::DimensionType::Vertical => "Z",
                    crate::dimension::DimensionType::Temporal => "T",
                };
                attributes.insert("axis".to_string(), serde_json::json!(axis));
            }
        }
        if self.xarray_named && matches!(self.kind, ArrayKind::V2 { .. }) {
            let names: Vec<String> = self
                .dims
                .iter()
                .map(|dim| dim.read().name().to_string())
                .collect();
            attributes.insert("_ARRAY_DIMENSIONS".to_string(), serde_json::json!(names));
        }
        attributes
    }

    /// Serialize as a Zarr V2 `.zarray` document plus `.zattrs` attributes.
    pub(crate) fn to_v2_document(&self) -> Result<(ArrayMetadataV2, Attributes), ZarrError> {
        let ArrayKind::V2 { order } = self.kind else {
            return Err(ZarrError::Unsupported(
                "a V3 array cannot serialize as .zarray".to_string(),
            ));
        };
        let dtype = match &self.data_type {
            DataType::Compound(fields) => DataTypeMetadataV2::Structured(
                fields
                    .iter()
                    .map(|field| {
                        Ok(StructuredFieldV2(
                            field.name.clone(),
                            field
                                .data_type
                                .to_v2_dtype(self.endianness)
                                .map_err(|err| ZarrError::format(err.to_string()))?,
                        ))
                    })
                    .collect::<Result<_, ZarrError>>()?,
            ),
            other => DataTypeMetadataV2::Simple(
                other
                    .to_v2_dtype(self.endianness)
                    .map_err(|err| ZarrError::format(err.to_string()))?,
            ),
        };
        let fill_value = match &self.fill_value {
            Some(fill) => fill
                .to_metadata(&self.data_type)
                .map_err(|err| ZarrError::format(err.to_string()))?,
            None => FillValueMetadata::Null,
        };

        // Filters and compressor from the chain, skipping the synthetic bytes/transpose.
        let mut filters: Vec<MetadataV2> = Vec::new();
        let mut compressor = None;
        for stage in self.codecs.codecs() {
            match stage {
                codec::Codec::Bytes(_) | codec::Codec::Transpose(_) => {}
                other if other.is_v2_compressor() => {
                    compressor = other.v2_metadata();
                }
                other => {
                    if let Some(metadata) = other.v2_metadata() {
                        filters.push(metadata);
                    }
                }
            }
        }

        Ok((
            ArrayMetadataV2 {
                zarr_format: monostate::MustBe!(2u64),
                shape: self.shape(),
                chunks: self.grid.chunk_shape().to_vec(),
                dtype,
                compressor,
                fill_value,
                order,
                filters: (!filters.is_empty()).then_some(filters),
                dimension_separator: self.key_encoding.separator(),
                attributes: Attributes::default(),
            },
            self.serializable_attributes(),
        ))
    }

    /// Serialize as a Zarr V3 `zarr.json` document.
    pub(crate) fn to_v3_document(&self) -> Result<ArrayMetadataV3, ZarrError> {
        let (key_name, separator) = match self.key_encoding {
            ChunkKeyEncoding::Default(separator) => ("default", separator),
            ChunkKeyEncoding::V2(separator) => ("v2", separator),
        };
        let fill_value = self
            .effective_fill_value()
            .to_metadata(&self.data_type)
            .map_err(|err| ZarrError::format(err.to_string()))?;
        Ok(ArrayMetadataV3 {
            zarr_format: monostate::MustBe!(3u64),
            node_type: monostate::MustBe!("array"),
            shape: self.shape(),
            data_type: self
                .data_type
                .v3_name()
                .map_err(|err| ZarrError::format(err.to_string()))?
                .to_string(),
            chunk_grid: MetadataV3::new_with_configuration(
                "regular",
                &RegularChunkGridConfiguration {
                    chunk_shape: self.grid.chunk_shape().to_vec(),
                },
            )?,
            chunk_key_encoding: MetadataV3::new_with_configuration(
                key_name,
                &ChunkKeyEncodingConfiguration { separator },
            )?,
            fill_value,
            codecs: Some(self.codecs.v3_metadata()?),
            attributes: self.serializable_attributes(),
            dimension_names: self.xarray_named.then(|| {
                self.dims
                    .iter()
                    .map(|dim| Some(dim.read().name().to_string()))
                    .collect()
            }),
            storage_transformers: None,
        })
    }
}

/// The default chunk shape: 256 along the two trailing axes, 1 elsewhere, clipped to the
/// array shape.
fn default_chunk_shape(shape: &[u64]) -> Vec<u64> {
    let rank = shape.len();
    shape
        .iter()
        .enumerate()
        .map(|(axis, &size)| {
            if axis + 2 >= rank {
                size.clamp(1, 256)
            } else {
                1
            }
        })
        .collect()
}

#[cfg(feature = "blosc")]
fn blosc_codec_from_params(
    params: &crate::config::CodecParams,
    data_type: &DataType,
) -> Result<codec::Codec, ZarrError> {
    let cname = match params.blosc_cname.as_deref() {
        None | Some("lz4") => codec::blosc::BloscCompressor::LZ4,
        Some("blosclz") => codec::blosc::BloscCompressor::BloscLZ,
        Some("lz4hc") => codec::blosc::BloscCompressor::LZ4HC,
        Some("snappy") => codec::blosc::BloscCompressor::Snappy,
        Some("zlib") => codec::blosc::BloscCompressor::Zlib,
        Some("zstd") => codec::blosc::BloscCompressor::Zstd,
        Some(other) => {
            return Err(ZarrError::invalid_argument(format!(
                "unknown blosc compressor {other}"
            )));
        }
    };
    let shuffle = match params.blosc_shuffle {
        Some(0) => codec::blosc::BloscShuffleMode::NoShuffle,
        Some(2) => codec::blosc::BloscShuffleMode::BitShuffle,
        Some(1) => codec::blosc::BloscShuffleMode::Shuffle,
        None => {
            if data_type.non_complex_size() > 1 {
                codec::blosc::BloscShuffleMode::Shuffle
            } else {
                codec::blosc::BloscShuffleMode::NoShuffle
            }
        }
        Some(other) => {
            return Err(ZarrError::invalid_argument(format!(
                "unknown blosc shuffle mode {other}"
            )));
        }
    };
    Ok(codec::Codec::Blosc(codec::BloscCodec::new(
        cname,
        params.blosc_clevel.unwrap_or(5),
        shuffle,
        Some(data_type.non_complex_size()),
        params.blosc_blocksize.unwrap_or(0),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_options_from_kv() {
        let kv = crate::config::CreationKvOptions::from_kv_pairs([
            ("COMPRESS", "GZIP"),
            ("GZIP_LEVEL", "2"),
            ("BLOCKSIZE", "10,20"),
            ("DIM_SEPARATOR", "/"),
            ("STRING_FORMAT", "UNICODE"),
        ]);
        let mut options = ArrayCreateOptions {
            data_type: DataType::Ascii(16),
            ..Default::default()
        };
        options.apply_kv(&kv);
        assert_eq!(options.data_type, DataType::Unicode(16));
        assert_eq!(options.chunk_shape, Some(vec![10, 20]));
        assert_eq!(options.codec_params.gzip_level, Some(2));
        assert_eq!(
            options.dim_separator,
            Some(crate::metadata::ChunkKeySeparator::Slash)
        );
    }

    #[test]
    fn default_chunk_shape_trailing_axes() {
        assert_eq!(default_chunk_shape(&[1000, 1000]), vec![256, 256]);
        assert_eq!(default_chunk_shape(&[10, 1000, 1000]), vec![1, 256, 256]);
        assert_eq!(default_chunk_shape(&[100]), vec![100]);
        assert_eq!(default_chunk_shape(&[5, 3]), vec![5, 3]);
    }
}
