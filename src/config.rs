//! Open/create options and environment gates.
//!
//! Options arrive as string key/value pairs (the way drivers receive them) and are parsed
//! into typed structures once at store open or array creation. Unrecognized options are
//! ignored with a warning.

use log::warn;

use crate::{metadata::ChunkKeySeparator, version::ZarrVersion};

/// The default chunk cache budget for [`advise_read`](crate::array::Array::advise_read),
/// 256 MiB.
pub const DEFAULT_CACHE_SIZE: u64 = 256 * 1024 * 1024;

/// The default maximum decoded chunk size, 1 GiB.
///
/// Larger chunks are rejected unless `ZARR_ALLOW_BIG_TILE_SIZE` is set.
pub const DEFAULT_MAX_TILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Above this expected sibling count, eager directory listing is suppressed when
/// enumerating group children (chunk directories on object stores can be huge).
pub const LISTING_SUPPRESSION_THRESHOLD: u64 = 1000;

/// The string representation of created string arrays.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum StringFormat {
    /// Fixed-length ASCII (`|Sn`).
    #[default]
    Ascii,
    /// Fixed-length UCS-4 (`|Un`).
    Unicode,
}

/// The compressor applied to created arrays.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum CompressOption {
    /// No compression.
    #[default]
    None,
    /// gzip.
    Gzip,
    /// blosc.
    #[cfg(feature = "blosc")]
    Blosc,
    /// zstd.
    Zstd,
}

/// The filter applied to created arrays.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FilterOption {
    /// No filter.
    #[default]
    None,
    /// Byte shuffle.
    Shuffle,
    /// Delta.
    Delta,
}

/// Options for opening a store.
#[derive(Clone, Debug)]
pub struct StoreOpenOptions {
    /// Build (or load) the tile-presence sidecar of every opened array.
    pub cache_tile_presence: bool,
    /// The chunk cache budget in bytes for `advise_read`.
    pub cache_size: u64,
    /// Worker threads for prefetch; 0 means the available parallelism.
    pub num_threads: usize,
    /// Use consolidated metadata when present.
    pub use_consolidated: bool,
    /// The format written by `create` operations.
    pub create_version: ZarrVersion,
    /// Open for reading only.
    pub read_only: bool,
}

impl Default for StoreOpenOptions {
    fn default() -> Self {
        Self {
            cache_tile_presence: false,
            cache_size: DEFAULT_CACHE_SIZE,
            num_threads: 0,
            use_consolidated: true,
            create_version: ZarrVersion::V2,
            read_only: false,
        }
    }
}

impl StoreOpenOptions {
    /// Parse options from string key/value pairs.
    ///
    /// Unrecognized keys are ignored with a warning.
    #[must_use]
    pub fn from_kv_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut options = Self::default();
        for (key, value) in pairs {
            match key.to_ascii_uppercase().as_str() {
                "CACHE_TILE_PRESENCE" => options.cache_tile_presence = parse_bool(key, value),
                "CACHE_SIZE" => match value.parse() {
                    Ok(size) => options.cache_size = size,
                    Err(_) => warn!("invalid value {value} for option {key}, ignored"),
                },
                "NUM_THREADS" => {
                    options.num_threads = if value.eq_ignore_ascii_case("ALL_CPUS") {
                        0
                    } else {
                        match value.parse() {
                            Ok(threads) => threads,
                            Err(_) => {
                                warn!("invalid value {value} for option {key}, ignored");
                                0
                            }
                        }
                    };
                }
                "USE_ZMETADATA" => options.use_consolidated = parse_bool(key, value),
                "FORMAT" => match value.to_ascii_uppercase().as_str() {
                    "ZARR_V2" => options.create_version = ZarrVersion::V2,
                    "ZARR_V3" => options.create_version = ZarrVersion::V3,
                    _ => warn!("invalid value {value} for option {key}, ignored"),
                },
                _ => warn!("option {key} is not recognized, ignored"),
            }
        }
        options
    }

    /// The effective worker thread count.
    #[must_use]
    pub fn effective_num_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.num_threads
        }
    }
}

/// Codec parameters for array creation, parsed from `<CODEC>_<PARAM>` options.
#[derive(Clone, Debug, Default)]
pub struct CodecParams {
    /// `GZIP_LEVEL`.
    pub gzip_level: Option<u8>,
    /// `ZSTD_LEVEL`.
    pub zstd_level: Option<i32>,
    /// `BLOSC_CNAME`.
    pub blosc_cname: Option<String>,
    /// `BLOSC_CLEVEL`.
    pub blosc_clevel: Option<u8>,
    /// `BLOSC_SHUFFLE`.
    pub blosc_shuffle: Option<i8>,
    /// `BLOSC_BLOCKSIZE`.
    pub blosc_blocksize: Option<usize>,
    /// `SHUFFLE_ELEMENTSIZE`.
    pub shuffle_elementsize: Option<usize>,
    /// `DELTA_DTYPE`.
    pub delta_dtype: Option<String>,
}

/// Options for creating an array, parsed from string key/value pairs.
#[derive(Clone, Debug, Default)]
pub struct CreationKvOptions {
    /// `STRING_FORMAT`.
    pub string_format: StringFormat,
    /// `COMPRESS`.
    pub compress: CompressOption,
    /// `FILTER`.
    pub filter: FilterOption,
    /// `BLOCKSIZE` (`d0,d1,...`).
    pub blocksize: Option<Vec<u64>>,
    /// `DIM_SEPARATOR`.
    pub dim_separator: Option<ChunkKeySeparator>,
    /// `CHUNK_MEMORY_LAYOUT` (`C` or `F`).
    pub fortran_order: bool,
    /// `@ENDIAN` (`little` or `big`).
    pub endian: Option<crate::array::Endianness>,
    /// Codec parameters.
    pub codec_params: CodecParams,
}

impl CreationKvOptions {
    /// Parse options from string key/value pairs.
    ///
    /// Unrecognized keys are ignored with a warning.
    #[must_use]
    pub fn from_kv_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut options = Self::default();
        for (key, value) in pairs {
            match key.to_ascii_uppercase().as_str() {
                "STRING_FORMAT" => match value.to_ascii_uppercase().as_str() {
                    "ASCII" => options.string_format = StringFormat::Ascii,
                    "UNICODE" => options.string_format = StringFormat::Unicode,
                    _ => warn!("invalid value {value} for option {key}, ignored"),
                },
                "COMPRESS" => match value.to_ascii_uppercase().as_str() {
                    "NONE" => options.compress = CompressOption::None,
                    "GZIP" => options.compress = CompressOption::Gzip,
                    #[cfg(feature = "blosc")]
                    "BLOSC" => options.compress = CompressOption::Blosc,
                    "ZSTD" => options.compress = CompressOption::Zstd,
                    _ => warn!("compressor {value} is not available, ignored"),
                },
                "FILTER" => match value.to_ascii_uppercase().as_str() {
                    "NONE" => options.filter = FilterOption::None,
                    "SHUFFLE" => options.filter = FilterOption::Shuffle,
                    "DELTA" => options.filter = FilterOption::Delta,
                    _ => warn!("filter {value} is not available, ignored"),
                },
                "BLOCKSIZE" => {
                    let sizes: Result<Vec<u64>, _> =
                        value.split(',').map(str::parse).collect();
                    match sizes {
                        Ok(sizes) => options.blocksize = Some(sizes),
                        Err(_) => warn!("invalid value {value} for option {key}, ignored"),
                    }
                }
                "DIM_SEPARATOR" => match value {
                    "." => options.dim_separator = Some(ChunkKeySeparator::Dot),
                    "/" => options.dim_separator = Some(ChunkKeySeparator::Slash),
                    _ => warn!("invalid value {value} for option {key}, ignored"),
                },
                "CHUNK_MEMORY_LAYOUT" => match value.to_ascii_uppercase().as_str() {
                    "C" => options.fortran_order = false,
                    "F" => options.fortran_order = true,
                    _ => warn!("invalid value {value} for option {key}, ignored"),
                },
                "@ENDIAN" => match value.to_ascii_lowercase().as_str() {
                    "little" => options.endian = Some(crate::array::Endianness::Little),
                    "big" => options.endian = Some(crate::array::Endianness::Big),
                    _ => warn!("invalid value {value} for option {key}, ignored"),
                },
                "GZIP_LEVEL" => parse_into(key, value, &mut options.codec_params.gzip_level),
                "ZSTD_LEVEL" => parse_into(key, value, &mut options.codec_params.zstd_level),
                "BLOSC_CNAME" => options.codec_params.blosc_cname = Some(value.to_string()),
                "BLOSC_CLEVEL" => parse_into(key, value, &mut options.codec_params.blosc_clevel),
                "BLOSC_SHUFFLE" => parse_into(key, value, &mut options.codec_params.blosc_shuffle),
                "BLOSC_BLOCKSIZE" => {
                    parse_into(key, value, &mut options.codec_params.blosc_blocksize);
                }
                "SHUFFLE_ELEMENTSIZE" => {
                    parse_into(key, value, &mut options.codec_params.shuffle_elementsize);
                }
                "DELTA_DTYPE" => options.codec_params.delta_dtype = Some(value.to_string()),
                _ => warn!("option {key} is not recognized, ignored"),
            }
        }
        options
    }
}

fn parse_bool(key: &str, value: &str) -> bool {
    match value.to_ascii_uppercase().as_str() {
        "YES" | "TRUE" | "ON" | "1" => true,
        "NO" | "FALSE" | "OFF" | "0" => false,
        _ => {
            warn!("invalid boolean {value} for option {key}, assuming NO");
            false
        }
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, out: &mut Option<T>) {
    match value.parse() {
        Ok(parsed) => *out = Some(parsed),
        Err(_) => warn!("invalid value {value} for option {key}, ignored"),
    }
}

/// Environment gates, read once at store open.
#[derive(Copy, Clone, Debug)]
pub struct EnvGates {
    /// `ZARR_ALLOW_BIG_TILE_SIZE`: permit decoded chunks above 1 GiB.
    pub allow_big_tile_size: bool,
    /// `MDZARR_USE_OPTIMIZED_CODE_PATHS`: use the word-copy fast paths (default on).
    pub use_optimized_code_paths: bool,
}

impl Default for EnvGates {
    fn default() -> Self {
        Self {
            allow_big_tile_size: false,
            use_optimized_code_paths: true,
        }
    }
}

impl EnvGates {
    /// Read the gates from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            allow_big_tile_size: env_bool("ZARR_ALLOW_BIG_TILE_SIZE", false),
            use_optimized_code_paths: env_bool("MDZARR_USE_OPTIMIZED_CODE_PATHS", true),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).map_or(default, |value| {
        matches!(
            value.to_ascii_uppercase().as_str(),
            "YES" | "TRUE" | "ON" | "1"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_options_parsing() {
        let options = StoreOpenOptions::from_kv_pairs([
            ("CACHE_TILE_PRESENCE", "YES"),
            ("CACHE_SIZE", "1048576"),
            ("NUM_THREADS", "4"),
            ("FORMAT", "ZARR_V3"),
            ("NOT_AN_OPTION", "whatever"),
        ]);
        assert!(options.cache_tile_presence);
        assert_eq!(options.cache_size, 1_048_576);
        assert_eq!(options.num_threads, 4);
        assert_eq!(options.create_version, ZarrVersion::V3);
    }

    #[test]
    fn creation_options_parsing() {
        let options = CreationKvOptions::from_kv_pairs([
            ("COMPRESS", "GZIP"),
            ("GZIP_LEVEL", "7"),
            ("FILTER", "SHUFFLE"),
            ("BLOCKSIZE", "100,200"),
            ("DIM_SEPARATOR", "/"),
            ("CHUNK_MEMORY_LAYOUT", "F"),
        ]);
        assert_eq!(options.compress, CompressOption::Gzip);
        assert_eq!(options.codec_params.gzip_level, Some(7));
        assert_eq!(options.filter, FilterOption::Shuffle);
        assert_eq!(options.blocksize, Some(vec![100, 200]));
        assert_eq!(options.dim_separator, Some(ChunkKeySeparator::Slash));
        assert!(options.fortran_order);
    }

    #[test]
    fn effective_num_threads_nonzero() {
        let options = StoreOpenOptions::default();
        assert!(options.effective_num_threads() >= 1);
    }
}
