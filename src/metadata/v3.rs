//! Zarr V3 metadata documents (`zarr.json`).

use serde::{Deserialize, Serialize};

use super::{Attributes, ChunkKeySeparator, FillValueMetadata};

/// Zarr V3 extension-point metadata: a `name` plus optional `configuration` object, used for
/// chunk grids, chunk key encodings and codecs.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct MetadataV3 {
    /// The extension name.
    pub name: String,
    /// The extension configuration.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl MetadataV3 {
    /// Create metadata with `name` and no configuration.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            configuration: serde_json::Map::new(),
        }
    }

    /// Create metadata with `name` and a serializable `configuration`.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if `configuration` does not serialize to a JSON
    /// object.
    pub fn new_with_configuration<T: Serialize>(
        name: &str,
        configuration: &T,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(configuration)?;
        let serde_json::Value::Object(configuration) = value else {
            return Err(serde::ser::Error::custom(
                "extension configuration must be a JSON object",
            ));
        };
        Ok(Self {
            name: name.to_string(),
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

/// The configuration of the `regular` chunk grid.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct RegularChunkGridConfiguration {
    /// The chunk shape.
    pub chunk_shape: Vec<u64>,
}

/// The configuration of the `default` and `v2` chunk key encodings.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct ChunkKeyEncodingConfiguration {
    /// The separator between chunk grid coordinates.
    #[serde(default)]
    pub separator: ChunkKeySeparator,
}

/// Zarr V3 array metadata (`zarr.json` with `"node_type": "array"`).
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ArrayMetadataV3 {
    /// The storage specification version. Must be `3`.
    pub zarr_format: monostate::MustBe!(3u64),
    /// The node type. Must be `"array"`.
    pub node_type: monostate::MustBe!("array"),
    /// The length of each dimension of the array.
    pub shape: Vec<u64>,
    /// The data type name.
    pub data_type: String,
    /// The chunk grid (`regular` with a `chunk_shape` configuration).
    pub chunk_grid: MetadataV3,
    /// The chunk key encoding (`default` or `v2`).
    #[serde(default = "chunk_key_encoding_default")]
    pub chunk_key_encoding: MetadataV3,
    /// The fill value.
    pub fill_value: FillValueMetadata,
    /// The codec chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codecs: Option<Vec<MetadataV3>>,
    /// User attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
    /// Dimension names; entries may be null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_names: Option<Vec<Option<String>>>,
    /// Storage transformers. Unsupported: arrays declaring any fail to open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_transformers: Option<Vec<MetadataV3>>,
}

fn chunk_key_encoding_default() -> MetadataV3 {
    MetadataV3::new("default")
}

/// Zarr V3 group metadata (`zarr.json` with `"node_type": "group"`).
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct GroupMetadataV3 {
    /// The storage specification version. Must be `3`.
    pub zarr_format: monostate::MustBe!(3u64),
    /// The node type. Must be `"group"`.
    pub node_type: monostate::MustBe!("group"),
    /// User attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: Attributes,
    /// Internal consolidated metadata for the subtree rooted at this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consolidated_metadata: Option<super::consolidated::ConsolidatedMetadataV3>,
}

impl Default for GroupMetadataV3 {
    fn default() -> Self {
        Self {
            zarr_format: monostate::MustBe!(3u64),
            node_type: monostate::MustBe!("group"),
            attributes: Attributes::default(),
            consolidated_metadata: None,
        }
    }
}

/// The `node_type` discriminator of a `zarr.json` document, read before full parsing.
#[derive(Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum NodeTypeV3 {
    /// An array node.
    Array,
    /// A group node.
    Group,
}

/// Peek the `node_type` of a raw `zarr.json` document.
#[must_use]
pub fn peek_node_type(document: &serde_json::Value) -> Option<NodeTypeV3> {
    match document.get("node_type")?.as_str()? {
        "array" => Some(NodeTypeV3::Array),
        "group" => Some(NodeTypeV3::Group),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_metadata_v3_roundtrip() {
        let json = r#"{
            "zarr_format": 3,
            "node_type": "array",
            "shape": [8],
            "data_type": "float32",
            "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [4]}},
            "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
            "fill_value": "NaN",
            "codecs": [
                {"name": "bytes", "configuration": {"endian": "little"}},
                {"name": "gzip", "configuration": {"level": 5}}
            ],
            "dimension_names": ["x"]
        }"#;
        let metadata: ArrayMetadataV3 = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.shape, vec![8]);
        assert_eq!(metadata.data_type, "float32");
        let grid: RegularChunkGridConfiguration =
            metadata.chunk_grid.to_configuration().unwrap();
        assert_eq!(grid.chunk_shape, vec![4]);
        let encoding: ChunkKeyEncodingConfiguration =
            metadata.chunk_key_encoding.to_configuration().unwrap();
        assert_eq!(encoding.separator, ChunkKeySeparator::Slash);
        assert_eq!(metadata.codecs.as_ref().unwrap().len(), 2);
        assert_eq!(
            metadata.dimension_names,
            Some(vec![Some("x".to_string())])
        );

        let serialized = serde_json::to_value(&metadata).unwrap();
        assert_eq!(serialized["node_type"], "array");
        assert_eq!(serialized["zarr_format"], 3);
    }

    #[test]
    fn array_metadata_v3_group_document_rejected() {
        let json = r#"{"zarr_format": 3, "node_type": "group"}"#;
        assert!(serde_json::from_str::<ArrayMetadataV3>(json).is_err());
        let document: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(peek_node_type(&document), Some(NodeTypeV3::Group));
    }

    #[test]
    fn group_metadata_v3_roundtrip() {
        let json = r#"{"zarr_format": 3, "node_type": "group", "attributes": {"a": 1}}"#;
        let metadata: GroupMetadataV3 = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.attributes["a"], 1);
        let serialized = serde_json::to_value(&metadata).unwrap();
        assert_eq!(serialized["node_type"], "group");
    }
}
