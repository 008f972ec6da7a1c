// Window writer: serializes diff windows as svndiff.
//
// New-data offsets are implicit on the wire, so the data segment is laid
// out in instruction order. A window whose new-data instructions reuse or
// reorder bytes is rewritten into that layout before encoding.

use std::io::Write;

use super::compression::{self, DEFAULT_COMPRESSION_LEVEL, MIN_COMPRESS_LEN};
use super::header::{self, Version};
use super::instruction::{Instruction, InstructionKind, encode_instruction};
use super::varint;
use super::window::DiffWindow;
use crate::error::{DeltaError, Result};

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub version: Version,
    /// zlib level 0-9, used by version 1 only.
    pub compression_level: u32,
    /// Segments shorter than this are stored raw (version 1).
    pub min_compress_len: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: Version::V0,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            min_compress_len: MIN_COMPRESS_LEN,
        }
    }
}

/// Serializes windows to `W`.
pub struct WindowWriter<W: Write> {
    writer: W,
    opts: WriterOptions,
    windows_written: u64,
    bytes_written: u64,
    // Scratch buffers reused across windows.
    instructions_buf: Vec<u8>,
    data_buf: Vec<u8>,
    segment_buf: Vec<u8>,
    header_buf: Vec<u8>,
}

impl<W: Write> WindowWriter<W> {
    /// Write a bare window sequence (no stream header).
    pub fn new(writer: W, version: Version) -> Self {
        Self::with_options(
            writer,
            WriterOptions {
                version,
                ..Default::default()
            },
        )
    }

    pub fn with_options(writer: W, opts: WriterOptions) -> Self {
        Self {
            writer,
            opts,
            windows_written: 0,
            bytes_written: 0,
            instructions_buf: Vec::new(),
            data_buf: Vec::new(),
            segment_buf: Vec::new(),
            header_buf: Vec::new(),
        }
    }

    /// Write the `SVN` stream header first.
    pub fn with_header(mut writer: W, opts: WriterOptions) -> Result<Self> {
        header::write_header(&mut writer, opts.version)?;
        let mut this = Self::with_options(writer, opts);
        this.bytes_written = 4;
        Ok(this)
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.opts.version
    }

    #[inline]
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Total bytes emitted, header included.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write_window(&mut self, window: &DiffWindow) -> Result<()> {
        self.instructions_buf.clear();
        self.data_buf.clear();
        let new_data = window.new_data();
        for inst in window.instructions() {
            if inst.kind == InstructionKind::CopyFromNewData {
                let start = inst.offset as usize;
                let bytes = new_data
                    .get(start..start + inst.length as usize)
                    .ok_or_else(|| DeltaError::corrupt("new data copy outside the new data"))?;
                self.data_buf.extend_from_slice(bytes);
                // Offset is implicit on the wire.
                let relaid = Instruction::new_data(0, inst.length);
                encode_instruction(&relaid, &mut self.instructions_buf);
            } else {
                encode_instruction(inst, &mut self.instructions_buf);
            }
        }

        let (inst_seg, data_seg): (&[u8], &[u8]) = match self.opts.version {
            Version::V0 => (&self.instructions_buf, &self.data_buf),
            Version::V1 => {
                self.segment_buf.clear();
                compression::encode_segment(
                    &self.instructions_buf,
                    self.opts.compression_level,
                    self.opts.min_compress_len,
                    &mut self.segment_buf,
                )?;
                let split = self.segment_buf.len();
                compression::encode_segment(
                    &self.data_buf,
                    self.opts.compression_level,
                    self.opts.min_compress_len,
                    &mut self.segment_buf,
                )?;
                let (a, b) = self.segment_buf.split_at(split);
                (a, b)
            }
        };

        self.header_buf.clear();
        varint::push_u64(&mut self.header_buf, window.source_view_offset());
        varint::push_u32(&mut self.header_buf, window.source_view_len());
        varint::push_u32(&mut self.header_buf, window.target_view_len());
        varint::push_u32(&mut self.header_buf, segment_len(inst_seg)?);
        varint::push_u32(&mut self.header_buf, segment_len(data_seg)?);

        self.writer.write_all(&self.header_buf)?;
        self.writer.write_all(inst_seg)?;
        self.writer.write_all(data_seg)?;

        self.bytes_written += (self.header_buf.len() + inst_seg.len() + data_seg.len()) as u64;
        self.windows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn segment_len(seg: &[u8]) -> Result<u32> {
    u32::try_from(seg.len())
        .map_err(|_| DeltaError::corrupt("window segment exceeds 4 GiB"))
}

/// Serialize `windows` as a complete svndiff stream (header included).
pub fn encode_stream(windows: &[DiffWindow], opts: WriterOptions) -> Result<Vec<u8>> {
    let mut writer = WindowWriter::with_header(Vec::new(), opts)?;
    for w in windows {
        writer.write_window(w)?;
    }
    Ok(writer.into_inner())
}
