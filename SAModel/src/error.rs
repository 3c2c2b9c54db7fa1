//! Error types for `SAModel`

use thiserror::Error;

use crate::attach::AttachFormat;

/// The error type for `SAModel` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Decode Errors ====================
    /// The requested decoder cannot interpret the data at the given address.
    #[error("{format} format mismatch at 0x{address:08X}: {reason}")]
    FormatMismatch {
        /// The decoder variant that was asked to read the data.
        format: AttachFormat,
        /// File-relative offset of the rejected structure.
        address: u32,
        /// What the decoder found instead.
        reason: String,
    },

    /// A read would run past the end of the supplied bytes.
    #[error("truncated input: {len} bytes at offset 0x{offset:08X} exceed buffer size 0x{size:X}")]
    Truncated {
        /// File-relative offset of the read.
        offset: usize,
        /// Number of bytes requested.
        len: usize,
        /// Size of the byte sequence.
        size: usize,
    },

    /// A required pointer is null or could not be resolved.
    #[error("missing {what} reference at 0x{address:08X}")]
    NullReference {
        /// The structure field that was expected to be set.
        what: &'static str,
        /// File-relative offset of the structure holding the pointer.
        address: u32,
    },

    /// A motion addresses more model parts than the hierarchy has nodes.
    #[error("motion has {motion_parts} model parts but the hierarchy has only {node_count} nodes")]
    IncompatibleMotion {
        /// Declared model part count of the motion.
        motion_parts: usize,
        /// Flattened node count of the hierarchy.
        node_count: usize,
    },

    /// A child or sibling chain leads back to a node already on the path.
    #[error("cyclic object reference at 0x{address:08X}")]
    CyclicReference {
        /// File-relative offset of the revisited object.
        address: u32,
    },

    /// A cached chunk polygon list draws itself, directly or through another list.
    #[error("Chunk attach {attach} draws polygon list {slot} from inside itself")]
    CyclicPolyList {
        /// Name of the attach issuing the draw.
        attach: String,
        /// The polygon cache slot being re-entered.
        slot: u8,
    },

    /// A polygon references a vertex slot that was never filled.
    #[error("{format} attach {attach} references vertex {index} of {count}")]
    InvalidVertexIndex {
        /// Attach format being converted.
        format: AttachFormat,
        /// Name of the attach.
        attach: String,
        /// The offending index.
        index: usize,
        /// Number of vertices available.
        count: usize,
    },

    /// A triangle list whose corner count is not a multiple of three.
    #[error("{format} attach {attach} has a triangle list of {corners} corners")]
    IncompleteTriangles {
        /// Attach format being converted.
        format: AttachFormat,
        /// Name of the attach.
        attach: String,
        /// Number of corners in the list.
        corners: usize,
    },

    /// A motion header or key table is inconsistent.
    #[error("invalid motion at 0x{address:08X}: {reason}")]
    InvalidMotion {
        /// File-relative offset of the motion or key table.
        address: u32,
        /// What is inconsistent.
        reason: String,
    },

    // ==================== Container Errors ====================
    /// The container header does not carry a known magic value.
    #[error("invalid {container} magic: 0x{magic:012X}")]
    InvalidMagic {
        /// Container kind that was expected.
        container: &'static str,
        /// The magic found (version byte stripped).
        magic: u64,
    },

    /// The container version is not supported.
    #[error("unsupported {container} version: {version}")]
    UnsupportedVersion {
        /// Container kind.
        container: &'static str,
        /// The version byte found in the header.
        version: u8,
    },

    // ==================== Encode Errors ====================
    /// The in-memory value cannot be represented in the binary layout.
    #[error("cannot encode: {0}")]
    Encode(String),
}

/// Coarse classification of an [`Error`], for callers that retry or report
/// depending on the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FormatMismatch,
    Truncated,
    UnsatisfiedReference,
    IncompatibleMotion,
    Other,
}

impl Error {
    /// Builds a [`Error::FormatMismatch`].
    pub(crate) fn mismatch(format: AttachFormat, address: u32, reason: impl Into<String>) -> Self {
        Error::FormatMismatch {
            format,
            address,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_motion(address: u32, reason: impl Into<String>) -> Self {
        Error::InvalidMotion {
            address,
            reason: reason.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FormatMismatch { .. }
            | Error::InvalidMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::CyclicReference { .. }
            | Error::CyclicPolyList { .. }
            | Error::InvalidMotion { .. }
            | Error::InvalidVertexIndex { .. }
            | Error::IncompleteTriangles { .. } => ErrorKind::FormatMismatch,
            Error::Truncated { .. } => ErrorKind::Truncated,
            Error::NullReference { .. } => ErrorKind::UnsatisfiedReference,
            Error::IncompatibleMotion { .. } => ErrorKind::IncompatibleMotion,
            Error::Io(_) | Error::Encode(_) => ErrorKind::Other,
        }
    }
}

/// A specialized Result type for `SAModel` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let truncated = Error::Truncated { offset: 4, len: 4, size: 6 };
        assert_eq!(truncated.kind(), ErrorKind::Truncated);

        let null = Error::NullReference { what: "motion", address: 0x10 };
        assert_eq!(null.kind(), ErrorKind::UnsatisfiedReference);

        let mismatch = Error::mismatch(AttachFormat::Chunk, 0x20, "bad chunk");
        assert_eq!(mismatch.kind(), ErrorKind::FormatMismatch);
        assert_eq!(
            mismatch.to_string(),
            "Chunk format mismatch at 0x00000020: bad chunk"
        );
    }
}
