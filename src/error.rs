//! Error types.
//!
//! [`ZarrError`] is the error surface of the crate; layer-specific errors
//! ([`StoreError`](crate::storage::StoreError), [`CodecError`](crate::array::codec::CodecError))
//! convert into it.

use thiserror::Error;

use crate::{
    array::codec::CodecError, array_subset::IncompatibleDimensionalityError, node::NodePathError,
    storage::StoreError,
};

/// An error produced by any `mdzarr` operation.
#[derive(Debug, Error)]
pub enum ZarrError {
    /// An array, group or dimension does not exist, or its handle was invalidated by a delete.
    #[error("{0} does not exist")]
    NotFound(String),
    /// Metadata could not be parsed, or describes a layout this crate cannot represent.
    #[error("invalid metadata: {0}")]
    Format(String),
    /// The operation is recognized but deliberately unsupported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The underlying byte store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A codec failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// An allocation or cache request exceeds the permitted budget.
    #[error("allocation of {0} bytes exceeds the permitted maximum")]
    OutOfMemory(u64),
    /// The user aborted the operation through a progress callback.
    #[error("operation interrupted by user")]
    Interrupted,
    /// An argument is out of range, has the wrong rank, or names an invalid node.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ZarrError {
    /// Shorthand for an [`InvalidArgument`](ZarrError::InvalidArgument) with a formatted message.
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for a [`Format`](ZarrError::Format) with a formatted message.
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

impl From<IncompatibleDimensionalityError> for ZarrError {
    fn from(err: IncompatibleDimensionalityError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<NodePathError> for ZarrError {
    fn from(err: NodePathError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for ZarrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            ZarrError::NotFound("/group/array".to_string()).to_string(),
            "/group/array does not exist"
        );
        assert_eq!(
            ZarrError::OutOfMemory(1 << 31).to_string(),
            "allocation of 2147483648 bytes exceeds the permitted maximum"
        );
    }
}
