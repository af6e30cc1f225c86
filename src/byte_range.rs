//! Byte ranges.
//!
//! A [`ByteRange`] represents a byte range relative to the start or end of a byte blob.
//! Ranges are used for partial reads of chunk blobs, most notably to extract a shard
//! index and individual inner chunk payloads without materializing the whole shard.

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ByteRange {
    /// A range from the start of a blob.
    ///
    /// A length of [`None`] means to the end of the blob.
    FromStart(ByteOffset, Option<ByteLength>),
    /// A range from the end of a blob.
    ///
    /// A length of [`None`] means to the start of the blob.
    FromEnd(ByteOffset, Option<ByteLength>),
}

impl ByteRange {
    /// Return the start of the byte range within a blob of `size` bytes.
    #[must_use]
    pub fn start(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, _) => *offset,
            Self::FromEnd(offset, length) => {
                length.map_or(0, |length| size - offset - length)
            }
        }
    }

    /// Return the exclusive end of the byte range within a blob of `size` bytes.
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, length) => length.map_or(size, |length| offset + length),
            Self::FromEnd(offset, _) => size - offset,
        }
    }

    /// Return the length of the byte range within a blob of `size` bytes.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, None) | Self::FromEnd(offset, None) => size - offset,
            Self::FromStart(_, Some(length)) | Self::FromEnd(_, Some(length)) => *length,
        }
    }
}

impl core::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FromStart(offset, length) => write!(
                f,
                "{offset}..{}",
                length.map_or(String::new(), |length| (offset + length).to_string())
            ),
            Self::FromEnd(offset, length) => write!(
                f,
                "{}..-{offset}",
                length.map_or(String::new(), |length| format!("-{}", offset + length))
            ),
        }
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for blob of {1} bytes")]
pub struct InvalidByteRangeError(pub ByteRange, pub u64);

/// Validate that all `byte_ranges` are within a blob of `size` bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] for the first range extending beyond `size`.
pub fn validate_byte_ranges(
    byte_ranges: &[ByteRange],
    size: u64,
) -> Result<(), InvalidByteRangeError> {
    for byte_range in byte_ranges {
        let valid = match byte_range {
            ByteRange::FromStart(offset, length) | ByteRange::FromEnd(offset, length) => {
                offset + length.unwrap_or(0) <= size
            }
        };
        if !valid {
            return Err(InvalidByteRangeError(*byte_range, size));
        }
    }
    Ok(())
}

/// Extract `byte_ranges` from `bytes`.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] if any range extends beyond `bytes`.
pub fn extract_byte_ranges(
    bytes: &[u8],
    byte_ranges: &[ByteRange],
) -> Result<Vec<Vec<u8>>, InvalidByteRangeError> {
    let size = bytes.len() as u64;
    validate_byte_ranges(byte_ranges, size)?;
    Ok(byte_ranges
        .iter()
        .map(|byte_range| {
            let start = usize::try_from(byte_range.start(size)).unwrap();
            let end = usize::try_from(byte_range.end(size)).unwrap();
            bytes[start..end].to_vec()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_from_start() {
        let range = ByteRange::FromStart(2, Some(4));
        assert_eq!(range.start(10), 2);
        assert_eq!(range.end(10), 6);
        assert_eq!(range.length(10), 4);
    }

    #[test]
    fn byte_range_from_end() {
        let range = ByteRange::FromEnd(2, Some(4));
        assert_eq!(range.start(10), 4);
        assert_eq!(range.end(10), 8);
        assert_eq!(range.length(10), 4);
    }

    #[test]
    fn byte_range_unbounded() {
        let range = ByteRange::FromStart(3, None);
        assert_eq!(range.length(10), 7);
        let range = ByteRange::FromEnd(0, None);
        assert_eq!(range.start(10), 0);
        assert_eq!(range.length(10), 10);
    }

    #[test]
    fn byte_range_extract() {
        let bytes = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let extracted = extract_byte_ranges(
            &bytes,
            &[ByteRange::FromStart(1, Some(2)), ByteRange::FromEnd(0, Some(3))],
        )
        .unwrap();
        assert_eq!(extracted, vec![vec![1, 2], vec![5, 6, 7]]);
        assert!(extract_byte_ranges(&bytes, &[ByteRange::FromStart(7, Some(2))]).is_err());
    }
}
