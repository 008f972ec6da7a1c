// svndiff stream header.
//
// A standalone svndiff stream starts with the three bytes `SVN` followed by
// a format version byte. Repository representation files embed the same
// header before their windows.

use std::io::{self, Read, Write};

use crate::error::{DeltaError, Result};

/// The three magic bytes preceding the version byte.
pub const SVNDIFF_MAGIC: [u8; 3] = *b"SVN";

/// Window format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// Raw instruction and data segments.
    #[default]
    V0,
    /// Each segment carries a length prefix and may be zlib-compressed.
    V1,
}

impl Version {
    #[inline]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V1 => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(DeltaError::InvalidHeader(format!(
                "unsupported svndiff version {other}"
            ))),
        }
    }

    /// Full four-byte header for this version.
    #[inline]
    pub const fn header(self) -> [u8; 4] {
        [
            SVNDIFF_MAGIC[0],
            SVNDIFF_MAGIC[1],
            SVNDIFF_MAGIC[2],
            self.as_byte(),
        ]
    }
}

/// Read and validate a stream header, returning its version.
pub fn read_header<R: Read>(r: &mut R) -> Result<Version> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DeltaError::InvalidHeader("stream too short".into()),
        _ => DeltaError::Io(e),
    })?;
    if magic[..3] != SVNDIFF_MAGIC {
        return Err(DeltaError::InvalidHeader(format!(
            "expected 53 56 4E, got {:02X} {:02X} {:02X}",
            magic[0], magic[1], magic[2]
        )));
    }
    Version::from_byte(magic[3])
}

/// Write the stream header for `version`.
pub fn write_header<W: Write>(w: &mut W, version: Version) -> io::Result<()> {
    w.write_all(&version.header())
}
