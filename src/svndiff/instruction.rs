// svndiff instructions and their record encoding.
//
// Each record starts with a selector byte: the top two bits are the kind,
// the low six bits an inline length (0 = length follows as a varint).
// Source and target copies then carry their offset as a varint. New-data
// copies carry no offset; they consume the window's new data in order.

use super::varint;
use crate::error::{DeltaError, Result};

/// What an instruction copies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// Bytes of the window's source view.
    CopyFromSource,
    /// Bytes this window has already produced (may overlap its own output).
    CopyFromTarget,
    /// Bytes of the window's new-data segment.
    CopyFromNewData,
}

impl InstructionKind {
    /// Two-bit selector value used in the record encoding.
    #[inline]
    pub const fn selector(self) -> u8 {
        match self {
            Self::CopyFromSource => 0,
            Self::CopyFromTarget => 1,
            Self::CopyFromNewData => 2,
        }
    }

    #[inline]
    pub fn from_selector(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::CopyFromSource),
            1 => Some(Self::CopyFromTarget),
            2 => Some(Self::CopyFromNewData),
            _ => None,
        }
    }

    /// Short mnemonic used by `inspect` output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::CopyFromSource => "source",
            Self::CopyFromTarget => "target",
            Self::CopyFromNewData => "new",
        }
    }
}

/// One copy operation of a diff window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub offset: u32,
    pub length: u32,
}

impl Instruction {
    #[inline]
    pub const fn new(kind: InstructionKind, offset: u32, length: u32) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }

    #[inline]
    pub const fn source(offset: u32, length: u32) -> Self {
        Self::new(InstructionKind::CopyFromSource, offset, length)
    }

    #[inline]
    pub const fn target(offset: u32, length: u32) -> Self {
        Self::new(InstructionKind::CopyFromTarget, offset, length)
    }

    #[inline]
    pub const fn new_data(offset: u32, length: u32) -> Self {
        Self::new(InstructionKind::CopyFromNewData, offset, length)
    }

    /// End of the referenced range (`offset + length`), widened so it
    /// cannot overflow.
    #[inline]
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }
}

/// Largest length that fits in the six inline bits.
const MAX_INLINE_LEN: u32 = 0x3F;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an instructions segment, appending to `out`.
///
/// New-data offsets are assigned sequentially; the total amount of new data
/// consumed is returned so the caller can check it against the data
/// segment length.
pub fn decode_instructions(data: &[u8], out: &mut Vec<Instruction>) -> Result<u64> {
    let mut pos = 0usize;
    let mut new_data_pos: u64 = 0;
    let mut index = 0usize;

    while pos < data.len() {
        let selector = data[pos];
        pos += 1;

        let kind = InstructionKind::from_selector(selector >> 6).ok_or_else(|| {
            DeltaError::corrupt(format!("instruction {index} has invalid selector"))
        })?;

        let mut length = u32::from(selector & 0x3F);
        if length == 0 {
            let (val, used) = varint::read_u32(&data[pos..]).map_err(|e| {
                DeltaError::corrupt(format!("instruction {index} length: {e}"))
            })?;
            length = val;
            pos += used;
        }
        if length == 0 {
            return Err(DeltaError::corrupt(format!(
                "instruction {index} has length zero"
            )));
        }

        let offset = match kind {
            InstructionKind::CopyFromNewData => {
                let offset = u32::try_from(new_data_pos).map_err(|_| {
                    DeltaError::corrupt(format!("instruction {index} overflows the new data"))
                })?;
                new_data_pos += u64::from(length);
                offset
            }
            _ => {
                let (val, used) = varint::read_u32(&data[pos..]).map_err(|e| {
                    DeltaError::corrupt(format!("instruction {index} offset: {e}"))
                })?;
                pos += used;
                val
            }
        };

        out.push(Instruction::new(kind, offset, length));
        index += 1;
    }

    Ok(new_data_pos)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a single instruction record.
///
/// New-data offsets are not stored; the caller is responsible for laying
/// out the new data in instruction order.
pub fn encode_instruction(inst: &Instruction, out: &mut Vec<u8>) {
    let selector = inst.kind.selector() << 6;
    if inst.length <= MAX_INLINE_LEN {
        out.push(selector | inst.length as u8);
    } else {
        out.push(selector);
        varint::push_u32(out, inst.length);
    }
    if inst.kind != InstructionKind::CopyFromNewData {
        varint::push_u32(out, inst.offset);
    }
}

/// Encode a sequence of instructions.
pub fn encode_instructions(instructions: &[Instruction], out: &mut Vec<u8>) {
    for inst in instructions {
        encode_instruction(inst, out);
    }
}
