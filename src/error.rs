// Error type shared by the svndiff reader, the window model and the combiner.
//
// Everything that goes wrong while decoding or composing windows is a
// corrupt window: there is no partial recovery, the caller abandons the
// reconstruction of that revision and re-reads from scratch.

use std::io;

use thiserror::Error;

use crate::svndiff::varint::VarIntError;

/// Errors produced while reading, applying or combining svndiff windows.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// The window data is malformed or references bytes that do not exist.
    #[error("svndiff data contains corrupt window: {reason}")]
    CorruptWindow {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The stream does not start with a supported `SVN` header.
    #[error("svndiff has invalid header: {0}")]
    InvalidHeader(String),

    /// An option struct holds a value outside its accepted range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Writing windows or reconstructed bytes failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeltaError {
    /// A corrupt-window error with no underlying cause.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptWindow {
            reason: reason.into(),
            source: None,
        }
    }

    /// A corrupt-window error chained with the error that revealed it.
    pub fn corrupt_with(reason: impl Into<String>, source: io::Error) -> Self {
        Self::CorruptWindow {
            reason: reason.into(),
            source: Some(source),
        }
    }

    #[inline]
    pub fn is_corrupt_window(&self) -> bool {
        matches!(self, Self::CorruptWindow { .. })
    }
}

impl From<VarIntError> for DeltaError {
    fn from(e: VarIntError) -> Self {
        Self::corrupt(e.to_string())
    }
}

pub type Result<T, E = DeltaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn corrupt_window_chains_source() {
        let inner = io::Error::new(io::ErrorKind::InvalidData, "bad zlib stream");
        let err = DeltaError::corrupt_with("instructions segment", inner);
        assert!(err.is_corrupt_window());
        assert!(err.to_string().contains("instructions segment"));
        assert_eq!(err.source().unwrap().to_string(), "bad zlib stream");
    }

    #[test]
    fn varint_errors_are_corrupt_windows() {
        let err: DeltaError = VarIntError::Underflow.into();
        assert!(err.is_corrupt_window());
    }
}
