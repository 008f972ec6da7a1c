// svndiff: the serialized form of diff windows.
//
// A stream is an optional 4-byte header (`SVN` + version) followed by
// windows. Version 0 stores the instruction and data segments raw;
// version 1 prefixes each segment with its length and may zlib-compress it.

pub mod compression;
pub mod header;
pub mod instruction;
pub mod reader;
pub mod varint;
pub mod window;
pub mod writer;

pub use header::{SVNDIFF_MAGIC, Version};
pub use instruction::{Instruction, InstructionKind};
pub use reader::{ReaderOptions, WindowHeader, WindowReader};
pub use window::DiffWindow;
pub use writer::{WindowWriter, WriterOptions, encode_stream};

use crate::error::Result;

/// Parse a complete svndiff stream (header included) into its windows.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<DiffWindow>> {
    WindowReader::from_stream(bytes)?.collect()
}
