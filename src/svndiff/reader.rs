// Window reader: parses svndiff windows from a forward-only byte source.
//
// Window layout:
//   source_offset (varint, 64-bit)
//   source_len, target_len, instructions_len, data_len (varints, 32-bit)
//   instructions segment (instructions_len bytes)
//   data segment (data_len bytes)
//
// Section buffers are reused across windows; each returned window owns
// freshly sized copies.

use std::io::{self, Read};

use super::compression;
use super::header::{self, Version};
use super::instruction::decode_instructions;
use super::varint;
use super::window::DiffWindow;
use crate::error::{DeltaError, Result};

/// Largest `instructions_len + data_len` accepted by default (16 MiB).
pub const DEFAULT_MAX_SECTION_LEN: usize = 1 << 24;

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Window format version of a bare window sequence.
    pub version: Version,
    /// Upper bound on the combined segment length of one window, and on
    /// the declared length of each version-1 segment once inflated.
    pub max_section_len: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            version: Version::V0,
            max_section_len: DEFAULT_MAX_SECTION_LEN,
        }
    }
}

/// Parsed window header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHeader {
    pub source_offset: u64,
    pub source_len: u32,
    pub target_len: u32,
    pub instructions_len: u32,
    pub data_len: u32,
}

impl WindowHeader {
    #[inline]
    pub fn sections_len(&self) -> u64 {
        u64::from(self.instructions_len) + u64::from(self.data_len)
    }
}

/// Reads windows one at a time from `R`.
pub struct WindowReader<R: Read> {
    reader: R,
    opts: ReaderOptions,
    windows_read: u64,
    /// Raw instructions + data bytes of the current window.
    sections: Vec<u8>,
    /// Decompressed segments (version 1 only).
    instructions_buf: Vec<u8>,
    data_buf: Vec<u8>,
}

impl<R: Read> WindowReader<R> {
    /// Read a bare window sequence (no stream header) of the given version.
    pub fn new(reader: R, version: Version) -> Self {
        Self::with_options(
            reader,
            ReaderOptions {
                version,
                ..Default::default()
            },
        )
    }

    pub fn with_options(reader: R, opts: ReaderOptions) -> Self {
        Self {
            reader,
            opts,
            windows_read: 0,
            sections: Vec::new(),
            instructions_buf: Vec::new(),
            data_buf: Vec::new(),
        }
    }

    /// Read the `SVN` stream header and take the version from it.
    pub fn from_stream(reader: R) -> Result<Self> {
        Self::from_stream_with_options(reader, ReaderOptions::default())
    }

    /// Like [`WindowReader::from_stream`]; the header's version overrides
    /// `opts.version`.
    pub fn from_stream_with_options(mut reader: R, mut opts: ReaderOptions) -> Result<Self> {
        opts.version = header::read_header(&mut reader)?;
        Ok(Self::with_options(reader, opts))
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.opts.version
    }

    /// Number of windows read or skipped so far.
    #[inline]
    pub fn windows_read(&self) -> u64 {
        self.windows_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next window. End of input is an error.
    pub fn read_window(&mut self) -> Result<DiffWindow> {
        self.next_window()?
            .ok_or_else(|| DeltaError::corrupt("unexpected end of svndiff input"))
    }

    /// Read the next window, or `None` at a clean end of input.
    pub fn next_window(&mut self) -> Result<Option<DiffWindow>> {
        let Some(hdr) = self.next_header()? else {
            return Ok(None);
        };

        let total = hdr.sections_len() as usize;
        self.sections.clear();
        self.sections.resize(total, 0);
        self.reader
            .read_exact(&mut self.sections)
            .map_err(|e| DeltaError::corrupt_with("window sections truncated", e))?;

        let (inst_raw, data_raw) = self.sections.split_at(hdr.instructions_len as usize);
        let (inst, data): (&[u8], &[u8]) = match self.opts.version {
            Version::V0 => (inst_raw, data_raw),
            Version::V1 => {
                let limit = self.opts.max_section_len;
                compression::decode_segment(
                    inst_raw,
                    "instructions",
                    limit,
                    &mut self.instructions_buf,
                )?;
                compression::decode_segment(data_raw, "data", limit, &mut self.data_buf)?;
                (&self.instructions_buf, &self.data_buf)
            }
        };

        let mut instructions = Vec::new();
        let consumed = decode_instructions(inst, &mut instructions)?;
        if consumed != data.len() as u64 {
            return Err(DeltaError::corrupt(format!(
                "delta uses {consumed} bytes of new data but the window carries {}",
                data.len()
            )));
        }

        let window = DiffWindow::new(
            hdr.source_offset,
            hdr.source_len,
            hdr.target_len,
            instructions,
            data.to_vec(),
        );
        window.validate()?;

        self.windows_read += 1;
        log::trace!(
            "read window {}: source {}+{}, target {}, {} instructions",
            self.windows_read,
            hdr.source_offset,
            hdr.source_len,
            hdr.target_len,
            window.instructions().len()
        );
        Ok(Some(window))
    }

    /// Advance past the next window without decoding it.
    pub fn skip_window(&mut self) -> Result<()> {
        let hdr = self
            .next_header()?
            .ok_or_else(|| DeltaError::corrupt("unexpected end of svndiff input"))?;
        let want = hdr.sections_len();
        let skipped = io::copy(&mut (&mut self.reader).take(want), &mut io::sink())
            .map_err(|e| DeltaError::corrupt_with("window sections truncated", e))?;
        if skipped != want {
            return Err(DeltaError::corrupt("window sections truncated"));
        }
        self.windows_read += 1;
        Ok(())
    }

    /// Read a window header, or `None` if the input ends before its first
    /// byte.
    pub fn next_header(&mut self) -> Result<Option<WindowHeader>> {
        let Some(first) = self.read_first_byte()? else {
            return Ok(None);
        };
        let mut src = io::Cursor::new([first]).chain(&mut self.reader);

        let source_offset = read_field_u64(&mut src, "source offset")?;
        if source_offset > i64::MAX as u64 {
            return Err(DeltaError::corrupt("negative source offset"));
        }
        let source_len = read_field_u32(&mut src, "source length")?;
        let target_len = read_field_u32(&mut src, "target length")?;
        let instructions_len = read_field_u32(&mut src, "instructions length")?;
        let data_len = read_field_u32(&mut src, "data length")?;

        let hdr = WindowHeader {
            source_offset,
            source_len,
            target_len,
            instructions_len,
            data_len,
        };
        if hdr.sections_len() > self.opts.max_section_len as u64 {
            return Err(DeltaError::corrupt(format!(
                "window sections of {} bytes exceed the limit of {}",
                hdr.sections_len(),
                self.opts.max_section_len
            )));
        }
        Ok(Some(hdr))
    }

    fn read_first_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DeltaError::corrupt_with("window header unreadable", e)),
            }
        }
    }
}

fn read_field_u64<R: Read>(r: &mut R, field: &str) -> Result<u64> {
    varint::stream_read_u64(r).map_err(|e| DeltaError::corrupt_with(format!("window {field}"), e))
}

fn read_field_u32<R: Read>(r: &mut R, field: &str) -> Result<u32> {
    varint::stream_read_u32(r).map_err(|e| DeltaError::corrupt_with(format!("window {field}"), e))
}

impl<R: Read> Iterator for WindowReader<R> {
    type Item = Result<DiffWindow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window().transpose()
    }
}
