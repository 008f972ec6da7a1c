// Version-1 segment framing and zlib compression.
//
// Each segment is `[varint original_len][payload]`. When the payload is
// exactly `original_len` bytes it is stored raw; otherwise it is a zlib
// stream that must inflate to exactly `original_len` bytes.
//
// Compression needs the `zlib` feature. Without it raw segments still
// decode, compressed ones are reported as corrupt.

use super::varint;
use crate::error::{DeltaError, Result};

/// Segments shorter than this are always stored raw.
pub const MIN_COMPRESS_LEN: usize = 512;

/// Default zlib level used by the writer.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;

/// Decode one version-1 segment into `out` (cleared first).
///
/// `what` names the segment in error messages. A declared length above
/// `max_len` is rejected before anything is allocated.
pub fn decode_segment(
    segment: &[u8],
    what: &str,
    max_len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.clear();
    if segment.is_empty() {
        return Ok(());
    }

    let (original_len, used) = varint::read_u64(segment)
        .map_err(|e| DeltaError::corrupt(format!("{what} segment length: {e}")))?;
    let original_len = usize::try_from(original_len)
        .map_err(|_| DeltaError::corrupt(format!("{what} segment length overflow")))?;
    if original_len > max_len {
        return Err(DeltaError::corrupt(format!(
            "{what} segment declares {original_len} bytes, limit is {max_len}"
        )));
    }
    let payload = &segment[used..];

    if payload.len() == original_len {
        out.extend_from_slice(payload);
        return Ok(());
    }

    inflate(payload, original_len, what, out)
}

#[cfg(feature = "zlib")]
fn inflate(payload: &[u8], original_len: usize, what: &str, out: &mut Vec<u8>) -> Result<()> {
    use std::io::Read;

    use flate2::read::ZlibDecoder;

    out.reserve(original_len);
    // One byte of slack so oversized streams are detected.
    let limit = original_len as u64 + 1;
    ZlibDecoder::new(payload)
        .take(limit)
        .read_to_end(out)
        .map_err(|e| DeltaError::corrupt_with(format!("{what} segment decompression failed"), e))?;

    if out.len() != original_len {
        return Err(DeltaError::corrupt(format!(
            "{what} segment inflated to {} bytes, expected {original_len}",
            out.len()
        )));
    }
    Ok(())
}

#[cfg(not(feature = "zlib"))]
fn inflate(_payload: &[u8], _original_len: usize, what: &str, _out: &mut Vec<u8>) -> Result<()> {
    Err(DeltaError::corrupt(format!(
        "{what} segment is compressed but zlib support is disabled"
    )))
}

/// Encode one version-1 segment, appending to `out`.
///
/// The payload is compressed only when it is at least `min_len` bytes long
/// and compression actually shrinks it.
pub fn encode_segment(data: &[u8], level: u32, min_len: usize, out: &mut Vec<u8>) -> Result<()> {
    varint::push_u64(out, data.len() as u64);
    if data.len() >= min_len {
        if let Some(compressed) = deflate(data, level)? {
            if compressed.len() < data.len() {
                out.extend_from_slice(&compressed);
                return Ok(());
            }
        }
    }
    out.extend_from_slice(data);
    Ok(())
}

#[cfg(feature = "zlib")]
fn deflate(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(Some(encoder.finish()?))
}

#[cfg(not(feature = "zlib"))]
fn deflate(_data: &[u8], _level: u32) -> Result<Option<Vec<u8>>> {
    Ok(None)
}
