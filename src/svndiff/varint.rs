// svndiff variable-length integers.
//
// Base-128, big-endian: the most significant 7-bit group comes first and
// every byte except the last has bit 7 set. Window headers, instruction
// lengths/offsets and version-1 segment prefixes all use this encoding.

use std::io::{self, Read};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// If any of these bits are set before a shift, `<< 7` would overflow a u32.
const U32_OVERFLOW_MASK: u32 = 0xFE00_0000;

/// Same guard for the 64-bit accumulator.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `num` into the tail of `buf`, returning the number of bytes used.
/// The encoding occupies `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the encoding of `num` to a byte vector.
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

/// Append the encoding of a 32-bit value to a byte vector.
#[inline]
pub fn push_u32(out: &mut Vec<u8>, num: u32) {
    push_u64(out, u64::from(num));
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u64` from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a `u32` from the front of `data`.
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let mut val: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U32_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

// ---------------------------------------------------------------------------
// Decoding from a forward-only reader
// ---------------------------------------------------------------------------

/// Read a `u64` varint from a reader.
///
/// Truncation surfaces as `UnexpectedEof`, overflow as `InvalidData`.
pub fn stream_read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut val: u64 = 0;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow.into());
        }
        val = (val << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Read a `u32` varint from a reader.
pub fn stream_read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let val = stream_read_u64(r)?;
    u32::try_from(val).map_err(|_| VarIntError::Overflow.into())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Input ended before the terminating byte.
    Underflow,
    /// Value does not fit the target integer type.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "varint underflow (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

impl From<VarIntError> for io::Error {
    fn from(e: VarIntError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_big_endian() {
        // 300 = (10) (0101100)
        let mut out = Vec::new();
        push_u64(&mut out, 300);
        assert_eq!(out, [0x82, 0x2C]);
    }

    #[test]
    fn zero_is_one_byte() {
        let mut out = Vec::new();
        push_u32(&mut out, 0);
        assert_eq!(out, [0x00]);
    }

    #[test]
    fn slice_decode_reports_consumed_bytes() {
        let data = [0x81, 0x00, 0x05];
        assert_eq!(read_u32(&data), Ok((128, 2)));
        assert_eq!(read_u32(&data[2..]), Ok((5, 1)));
    }

    #[test]
    fn u32_overflow_detected() {
        let mut out = Vec::new();
        push_u64(&mut out, u64::from(u32::MAX) + 1);
        assert_eq!(read_u32(&out), Err(VarIntError::Overflow));
        assert_eq!(read_u64(&out), Ok((u64::from(u32::MAX) + 1, 5)));
    }

    #[test]
    fn truncated_input_underflows() {
        assert_eq!(read_u64(&[0x80, 0x80, 0x80]), Err(VarIntError::Underflow));
        assert_eq!(read_u32(&[]), Err(VarIntError::Underflow));
    }

    #[test]
    fn stream_truncation_is_unexpected_eof() {
        let mut cursor = io::Cursor::new(vec![0xFF, 0xFF]);
        let err = stream_read_u64(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn stream_u32_rejects_wide_values() {
        let mut out = Vec::new();
        push_u64(&mut out, 1 << 40);
        let err = stream_read_u32(&mut io::Cursor::new(out)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn stream_and_slice_decoders_agree() {
        let mut a = Vec::new();
        push_u64(&mut a, 123_456_789);
        let val = stream_read_u64(&mut io::Cursor::new(&a)).unwrap();
        assert_eq!(val, 123_456_789);
        assert_eq!(read_u64(&a), Ok((123_456_789, a.len())));
    }
}
