//! Node paths and node names.
//!
//! Groups and arrays are nodes in a Zarr hierarchy. A [`NodePath`] is the absolute path of a
//! node from the hierarchy root (`/`). Node names obey the validity rules shared by groups,
//! arrays and dimensions: non-empty, no `/`, `\` or `:`, and no `.z` prefix (reserved for
//! Zarr V2 metadata markers).

use derive_more::Display;
use thiserror::Error;

/// The path of a node in a Zarr hierarchy.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct NodePath(String);

/// An invalid node path error.
#[derive(Clone, Debug, Error)]
#[error("invalid node path {0}")]
pub struct NodePathError(String);

impl NodePath {
    /// The root node path, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Create a new node path from `path`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `path` is not absolute, has a trailing `/` (other than
    /// the root itself), or contains an invalid node name.
    pub fn new(path: &str) -> Result<Self, NodePathError> {
        if path == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(NodePathError(path.to_string()));
        };
        if rest.is_empty() || rest.ends_with('/') {
            return Err(NodePathError(path.to_string()));
        }
        if rest.split('/').any(|name| !is_valid_node_name(name)) {
            return Err(NodePathError(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    /// The path as a string, always beginning with `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name of the node (the last path component), or `""` for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// The path of the parent node, or [`None`] for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodePath> {
        if self.0 == "/" {
            return None;
        }
        let parent = &self.0[..self.0.rfind('/').unwrap_or(0)];
        Some(if parent.is_empty() {
            Self::root()
        } else {
            Self(parent.to_string())
        })
    }

    /// The path of the child node `name`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `name` is not a valid node name.
    pub fn child(&self, name: &str) -> Result<NodePath, NodePathError> {
        if !is_valid_node_name(name) {
            return Err(NodePathError(name.to_string()));
        }
        Ok(if self.0 == "/" {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        })
    }

    /// The path relative to the hierarchy root without the leading `/`; `""` for the root.
    #[must_use]
    pub fn as_relative(&self) -> &str {
        self.0.strip_prefix('/').unwrap_or(&self.0)
    }
}

impl TryFrom<&str> for NodePath {
    type Error = NodePathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

/// Return true if `name` is a valid name for a group, array or dimension.
///
/// Names must be non-empty, must not contain `/`, `\` or `:`, and must not start with `.z`.
#[must_use]
pub fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(".z")
        && !name.contains(['/', '\\', ':'])
        && name != "."
        && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_path_root() {
        let root = NodePath::root();
        assert_eq!(root.as_str(), "/");
        assert_eq!(root.name(), "");
        assert!(root.parent().is_none());
        assert_eq!(root.as_relative(), "");
    }

    #[test]
    fn node_path_nested() {
        let path = NodePath::new("/group/array").unwrap();
        assert_eq!(path.name(), "array");
        assert_eq!(path.parent().unwrap().as_str(), "/group");
        assert_eq!(path.parent().unwrap().parent().unwrap().as_str(), "/");
        assert_eq!(path.as_relative(), "group/array");
        assert_eq!(path.child("x").unwrap().as_str(), "/group/array/x");
    }

    #[test]
    fn node_path_invalid() {
        assert!(NodePath::new("group").is_err());
        assert!(NodePath::new("/group/").is_err());
        assert!(NodePath::new("//group").is_err());
        assert!(NodePath::new("/.zarray").is_err());
    }

    #[test]
    fn node_name_validity() {
        assert!(is_valid_node_name("temperature"));
        assert!(is_valid_node_name("0"));
        assert!(!is_valid_node_name(""));
        assert!(!is_valid_node_name(".zarray"));
        assert!(!is_valid_node_name("a/b"));
        assert!(!is_valid_node_name("a\\b"));
        assert!(!is_valid_node_name("a:b"));
    }
}
