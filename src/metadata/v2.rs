//! Zarr V2 metadata documents (`.zarray`, `.zgroup`).

use serde::{Deserialize, Serialize};

use super::{Attributes, ChunkKeySeparator, FillValueMetadata};

/// Zarr V2 codec metadata: a compressor or filter object with an `id` and flattened
/// configuration, e.g. `{"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1}`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct MetadataV2 {
    /// The codec identifier.
    pub id: String,
    /// The codec configuration parameters.
    #[serde(flatten)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl MetadataV2 {
    /// Create codec metadata with `id` and no configuration.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            configuration: serde_json::Map::new(),
        }
    }

    /// Create codec metadata with `id` and a serializable `configuration`.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if `configuration` does not serialize to a JSON
    /// object.
    pub fn new_with_configuration<T: Serialize>(
        id: &str,
        configuration: &T,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(configuration)?;
        let serde_json::Value::Object(configuration) = value else {
            return Err(serde::ser::Error::custom(
                "codec configuration must be a JSON object",
            ));
        };
        Ok(Self {
            id: id.to_string(),
            configuration,
        })
    }

    /// Deserialize the configuration into `T`.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if the configuration is incompatible with `T`.
    pub fn to_configuration<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.configuration.clone()))
    }
}

/// A Zarr V2 dtype: either a simple dtype string or a structured list of
/// `[field name, field dtype]` pairs.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(untagged)]
pub enum DataTypeMetadataV2 {
    /// A simple dtype string, e.g. `"<i4"`.
    Simple(String),
    /// A structured dtype.
    Structured(Vec<StructuredFieldV2>),
}

/// A field of a Zarr V2 structured dtype, serialized as a `[name, dtype]` tuple.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct StructuredFieldV2(pub String, pub String);

/// Zarr V2 array metadata (`.zarray`).
///
/// An example document:
/// ```json
/// {
///     "zarr_format": 2,
///     "shape": [10000, 10000],
///     "chunks": [1000, 1000],
///     "dtype": "<f8",
///     "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1},
///     "fill_value": "NaN",
///     "order": "C",
///     "filters": [{"id": "delta", "dtype": "<f8"}]
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ArrayMetadataV2 {
    /// The storage specification version. Must be `2`.
    pub zarr_format: monostate::MustBe!(2u64),
    /// The length of each dimension of the array.
    pub shape: Vec<u64>,
    /// The length of each dimension of a chunk.
    pub chunks: Vec<u64>,
    /// The dtype string or structured dtype.
    pub dtype: DataTypeMetadataV2,
    /// The primary compressor, or null.
    pub compressor: Option<MetadataV2>,
    /// The fill value, or null.
    pub fill_value: FillValueMetadata,
    /// The layout of bytes within each chunk: `"C"` or `"F"`.
    pub order: MemoryOrderV2,
    /// The filter chain, or null.
    #[serde(default)]
    pub filters: Option<Vec<MetadataV2>>,
    /// The separator between chunk grid coordinates, `.` (the default) or `/`.
    #[serde(default = "chunk_key_separator_default_v2")]
    pub dimension_separator: ChunkKeySeparator,
    /// User attributes from the sibling `.zattrs` document (not part of `.zarray`).
    #[serde(skip)]
    pub attributes: Attributes,
}

const fn chunk_key_separator_default_v2() -> ChunkKeySeparator {
    ChunkKeySeparator::Dot
}

/// The layout of bytes within each chunk of a Zarr V2 array.
#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum MemoryOrderV2 {
    /// Row-major order: the last dimension varies fastest.
    #[default]
    C,
    /// Column-major order: the first dimension varies fastest.
    F,
}

/// Zarr V2 group metadata (`.zgroup`).
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct GroupMetadataV2 {
    /// The storage specification version. Must be `2`.
    pub zarr_format: monostate::MustBe!(2u64),
    /// User attributes from the sibling `.zattrs` document (not part of `.zgroup`).
    #[serde(skip)]
    pub attributes: Attributes,
}

impl Default for GroupMetadataV2 {
    fn default() -> Self {
        Self {
            zarr_format: monostate::MustBe!(2u64),
            attributes: Attributes::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_metadata_v2_roundtrip() {
        let json = r#"{
            "zarr_format": 2,
            "shape": [4, 6],
            "chunks": [2, 3],
            "dtype": "<i4",
            "compressor": null,
            "fill_value": -1,
            "order": "C",
            "filters": null
        }"#;
        let metadata: ArrayMetadataV2 = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.shape, vec![4, 6]);
        assert_eq!(metadata.chunks, vec![2, 3]);
        assert_eq!(metadata.dimension_separator, ChunkKeySeparator::Dot);
        assert!(metadata.compressor.is_none());
        let serialized = serde_json::to_value(&metadata).unwrap();
        assert_eq!(serialized["zarr_format"], 2);
        assert_eq!(serialized["dtype"], "<i4");
    }

    #[test]
    fn array_metadata_v2_wrong_format_rejected() {
        let json = r#"{
            "zarr_format": 3,
            "shape": [4],
            "chunks": [2],
            "dtype": "<i4",
            "compressor": null,
            "fill_value": 0,
            "order": "C"
        }"#;
        assert!(serde_json::from_str::<ArrayMetadataV2>(json).is_err());
    }

    #[test]
    fn array_metadata_v2_structured_dtype() {
        let json = r#"{
            "zarr_format": 2,
            "shape": [4],
            "chunks": [2],
            "dtype": [["a", "<i2"], ["b", "<f8"]],
            "compressor": null,
            "fill_value": null,
            "order": "C"
        }"#;
        let metadata: ArrayMetadataV2 = serde_json::from_str(json).unwrap();
        let DataTypeMetadataV2::Structured(fields) = &metadata.dtype else {
            panic!("expected structured dtype");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], StructuredFieldV2("a".to_string(), "<i2".to_string()));
    }

    #[test]
    fn codec_metadata_v2_flattened() {
        let json = r#"{"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1}"#;
        let metadata: MetadataV2 = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.id, "blosc");
        assert_eq!(metadata.configuration["clevel"], 5);
    }
}
