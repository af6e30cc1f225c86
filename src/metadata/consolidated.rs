//! Consolidated metadata.
//!
//! Consolidated metadata aggregates the metadata documents of every node of a hierarchy into
//! a single document so that opening nodes requires neither directory listing nor per-node
//! reads. Zarr V2 stores it in a root `.zmetadata` document; Zarr V3 embeds it in the root
//! group `zarr.json` under `consolidated_metadata`.

use serde::{Deserialize, Serialize};

/// The Zarr V2 `.zmetadata` document.
///
/// Keys of `metadata` are store-relative metadata keys such as `"group/array/.zarray"`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ConsolidatedMetadataV2 {
    /// The consolidated metadata format version. Must be `1`.
    pub zarr_consolidated_format: monostate::MustBe!(1u64),
    /// Metadata documents keyed by store-relative metadata key.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The Zarr V3 `consolidated_metadata` member of a root group document.
///
/// Keys of `metadata` are node paths relative to the consolidating group, e.g.
/// `"group/array"`, each mapping to the full `zarr.json` document of that node.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ConsolidatedMetadataV3 {
    /// Metadata documents keyed by relative node path.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// The kind of consolidated metadata. Only `"inline"` is defined.
    #[serde(default = "kind_inline")]
    pub kind: String,
    /// Whether consumers must understand this member. Always false.
    #[serde(default)]
    pub must_understand: bool,
}

fn kind_inline() -> String {
    "inline".to_string()
}

/// An in-memory consolidated metadata snapshot shared by all nodes of a store.
///
/// Lookups answer "what would the metadata document at this store key contain" without
/// touching the byte store. The snapshot is marked dirty by tree mutations and rewritten
/// when the store closes.
#[derive(Clone, Debug, Default)]
pub struct ConsolidatedMetadata {
    /// Documents keyed by store-relative metadata key (`group/array/.zarray`,
    /// `group/array/zarr.json`, ...). V3 node-path keys are normalized to `zarr.json` keys
    /// on load.
    documents: serde_json::Map<String, serde_json::Value>,
}

impl ConsolidatedMetadata {
    /// Build a snapshot from a parsed V2 `.zmetadata` document.
    #[must_use]
    pub fn from_v2(document: ConsolidatedMetadataV2) -> Self {
        Self {
            documents: document.metadata,
        }
    }

    /// Build a snapshot from a V3 `consolidated_metadata` member.
    #[must_use]
    pub fn from_v3(document: &ConsolidatedMetadataV3) -> Self {
        let mut documents = serde_json::Map::new();
        for (path, value) in &document.metadata {
            documents.insert(format!("{path}/zarr.json"), value.clone());
        }
        Self { documents }
    }

    /// Return the document that the metadata blob at `key` would contain.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.documents.get(key)
    }

    /// Insert or replace the document at `key`.
    pub fn insert(&mut self, key: String, document: serde_json::Value) {
        self.documents.insert(key, document);
    }

    /// Remove every document at or under the node with store-relative prefix `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) {
        self.documents
            .retain(|key, _| !key.starts_with(prefix));
    }

    /// Rename every document under `from` to the same relative key under `to`.
    pub fn rename_prefix(&mut self, from: &str, to: &str) {
        let renamed: Vec<(String, serde_json::Value)> = self
            .documents
            .iter()
            .filter(|(key, _)| key.starts_with(from))
            .map(|(key, value)| (format!("{to}{}", &key[from.len()..]), value.clone()))
            .collect();
        self.documents.retain(|key, _| !key.starts_with(from));
        for (key, value) in renamed {
            self.documents.insert(key, value);
        }
    }

    /// The store-relative metadata keys of every document, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Serialize the snapshot as a V2 `.zmetadata` document.
    #[must_use]
    pub fn to_v2(&self) -> ConsolidatedMetadataV2 {
        ConsolidatedMetadataV2 {
            zarr_consolidated_format: monostate::MustBe!(1u64),
            metadata: self.documents.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidated_v2_roundtrip() {
        let json = r#"{
            "zarr_consolidated_format": 1,
            "metadata": {
                ".zgroup": {"zarr_format": 2},
                "array/.zarray": {"shape": [4]}
            }
        }"#;
        let document: ConsolidatedMetadataV2 = serde_json::from_str(json).unwrap();
        let snapshot = ConsolidatedMetadata::from_v2(document);
        assert!(snapshot.get(".zgroup").is_some());
        assert_eq!(snapshot.get("array/.zarray").unwrap()["shape"][0], 4);
        assert!(snapshot.get("array/.zattrs").is_none());
    }

    #[test]
    fn consolidated_v3_normalizes_keys() {
        let json = r#"{
            "kind": "inline",
            "must_understand": false,
            "metadata": {
                "group/array": {"zarr_format": 3, "node_type": "array"}
            }
        }"#;
        let document: ConsolidatedMetadataV3 = serde_json::from_str(json).unwrap();
        let snapshot = ConsolidatedMetadata::from_v3(&document);
        assert!(snapshot.get("group/array/zarr.json").is_some());
    }

    #[test]
    fn consolidated_rename_and_remove() {
        let mut snapshot = ConsolidatedMetadata::default();
        snapshot.insert("a/.zarray".to_string(), serde_json::Value::Null);
        snapshot.insert("a/.zattrs".to_string(), serde_json::Value::Null);
        snapshot.rename_prefix("a/", "b/");
        assert!(snapshot.get("a/.zarray").is_none());
        assert!(snapshot.get("b/.zarray").is_some());
        snapshot.remove_prefix("b/");
        assert!(snapshot.keys().is_empty());
    }
}
