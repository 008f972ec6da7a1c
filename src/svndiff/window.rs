// Diff windows: a source-view descriptor, an instruction program and the
// new data it copies from.
//
// Applying a window writes exactly `target_view_len` bytes. Target copies
// read from the output produced so far and may overlap themselves, which is
// how runs and repeating patterns are encoded.

use super::instruction::{Instruction, InstructionKind};
use crate::error::{DeltaError, Result};

/// A single svndiff window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffWindow {
    source_view_offset: u64,
    source_view_len: u32,
    target_view_len: u32,
    instructions: Vec<Instruction>,
    new_data: Vec<u8>,
}

impl DiffWindow {
    /// Build a window without checking the instruction program.
    ///
    /// Use [`DiffWindow::validate`] (or construct through the reader) when
    /// the parts come from untrusted input.
    pub fn new(
        source_view_offset: u64,
        source_view_len: u32,
        target_view_len: u32,
        instructions: Vec<Instruction>,
        new_data: Vec<u8>,
    ) -> Self {
        Self {
            source_view_offset,
            source_view_len,
            target_view_len,
            instructions,
            new_data,
        }
    }

    /// A self-contained window that inserts `data` verbatim.
    pub fn from_new_data(data: &[u8]) -> Result<Self> {
        let len = u32::try_from(data.len())
            .map_err(|_| DeltaError::corrupt("new data does not fit a window"))?;
        let instructions = if len == 0 {
            Vec::new()
        } else {
            vec![Instruction::new_data(0, len)]
        };
        Ok(Self::new(0, 0, len, instructions, data.to_vec()))
    }

    #[inline]
    pub fn source_view_offset(&self) -> u64 {
        self.source_view_offset
    }

    #[inline]
    pub fn source_view_len(&self) -> u32 {
        self.source_view_len
    }

    #[inline]
    pub fn target_view_len(&self) -> u32 {
        self.target_view_len
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn new_data(&self) -> &[u8] {
        &self.new_data
    }

    /// Whether any instruction reads the source view.
    pub fn has_copy_from_source(&self) -> bool {
        self.instructions
            .iter()
            .any(|i| i.kind == InstructionKind::CopyFromSource)
    }

    /// True when the window can be applied without any source bytes.
    #[inline]
    pub fn is_self_contained(&self) -> bool {
        self.source_view_len == 0 || !self.has_copy_from_source()
    }

    /// Check the instruction program against the window's views.
    pub fn validate(&self) -> Result<()> {
        let target_len = u64::from(self.target_view_len);
        let mut tpos: u64 = 0;

        for (index, inst) in self.instructions.iter().enumerate() {
            if inst.length == 0 {
                return Err(DeltaError::corrupt(format!(
                    "instruction {index} has length zero"
                )));
            }
            if tpos + u64::from(inst.length) > target_len {
                return Err(DeltaError::corrupt(format!(
                    "instruction {index} overflows the target view"
                )));
            }
            match inst.kind {
                InstructionKind::CopyFromSource => {
                    if inst.end() > u64::from(self.source_view_len) {
                        return Err(DeltaError::corrupt(format!(
                            "instruction {index} overflows the source view"
                        )));
                    }
                }
                InstructionKind::CopyFromTarget => {
                    if u64::from(inst.offset) >= tpos {
                        return Err(DeltaError::corrupt(format!(
                            "instruction {index} starts beyond the target view position"
                        )));
                    }
                }
                InstructionKind::CopyFromNewData => {
                    if inst.end() > self.new_data.len() as u64 {
                        return Err(DeltaError::corrupt(format!(
                            "instruction {index} overflows the new data section"
                        )));
                    }
                }
            }
            tpos += u64::from(inst.length);
        }

        if tpos != target_len {
            return Err(DeltaError::corrupt("delta does not fill the target window"));
        }
        Ok(())
    }

    /// Materialize the target, reading source copies from `source` at
    /// `source_view_offset + offset`. A window without source copies never
    /// looks at `source`.
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>> {
        let view = if self.is_self_contained() {
            &source[..0]
        } else {
            let start = usize::try_from(self.source_view_offset)
                .map_err(|_| DeltaError::corrupt("source view offset out of range"))?;
            let end = start + self.source_view_len as usize;
            source.get(start..end).ok_or_else(|| {
                DeltaError::corrupt(format!(
                    "source view {start}..{end} exceeds source of {} bytes",
                    source.len()
                ))
            })?
        };
        self.apply_view(view)
    }

    /// Materialize the target from an already-sliced source view.
    pub fn apply_view(&self, view: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.target_view_len as usize);
        self.apply_view_into(view, &mut out)?;
        Ok(out)
    }

    /// Like [`DiffWindow::apply_view`], writing into a reusable buffer.
    /// `out` is cleared first.
    pub fn apply_view_into(&self, view: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.reserve(self.target_view_len as usize);
        let target_len = self.target_view_len as usize;

        for inst in &self.instructions {
            let offset = inst.offset as usize;
            let len = inst.length as usize;
            if out.len() + len > target_len {
                return Err(DeltaError::corrupt("instructions overflow the target view"));
            }
            match inst.kind {
                InstructionKind::CopyFromSource => {
                    let bytes = view.get(offset..offset + len).ok_or_else(|| {
                        DeltaError::corrupt(format!(
                            "source copy {offset}+{len} outside view of {} bytes",
                            view.len()
                        ))
                    })?;
                    out.extend_from_slice(bytes);
                }
                InstructionKind::CopyFromNewData => {
                    let bytes = self.new_data.get(offset..offset + len).ok_or_else(|| {
                        DeltaError::corrupt(format!(
                            "new data copy {offset}+{len} outside {} bytes",
                            self.new_data.len()
                        ))
                    })?;
                    out.extend_from_slice(bytes);
                }
                InstructionKind::CopyFromTarget => copy_from_target(out, offset, len)?,
            }
        }

        if out.len() != target_len {
            return Err(DeltaError::corrupt("delta does not fill the target window"));
        }
        Ok(())
    }
}

/// Append `len` bytes read from `out[offset..]`, where the range may run
/// into the bytes being appended.
///
/// Overlapping copies repeat the period `out.len() - offset`; the region
/// from `offset` stays periodic, so each pass can copy everything written
/// so far and the chunk size doubles.
fn copy_from_target(out: &mut Vec<u8>, offset: usize, len: usize) -> Result<()> {
    let start = out.len();
    if offset >= start {
        return Err(DeltaError::corrupt(format!(
            "target copy from {offset} at position {start} references unwritten bytes"
        )));
    }
    if offset + len <= start {
        out.extend_from_within(offset..offset + len);
        return Ok(());
    }

    let period = start - offset;
    let mut done = 0usize;
    while done < len {
        let chunk = (period + done).min(len - done);
        out.extend_from_within(offset..offset + chunk);
        done += chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_tiling_window() {
        let w = DiffWindow::new(
            0,
            4,
            6,
            vec![Instruction::source(0, 3), Instruction::target(0, 3)],
            Vec::new(),
        );
        w.validate().unwrap();
        assert_eq!(w.apply(b"XYZW").unwrap(), b"XYZXYZ");
    }

    #[test]
    fn overlapping_target_copy_repeats_period() {
        let w = DiffWindow::new(
            0,
            0,
            11,
            vec![Instruction::new_data(0, 2), Instruction::target(0, 9)],
            b"ab".to_vec(),
        );
        assert_eq!(w.apply(&[]).unwrap(), b"abababababa");
    }

    #[test]
    fn single_byte_run() {
        let w = DiffWindow::new(
            0,
            0,
            1000,
            vec![Instruction::new_data(0, 1), Instruction::target(0, 999)],
            vec![0x5A],
        );
        assert_eq!(w.apply(&[]).unwrap(), vec![0x5A; 1000]);
    }

    #[test]
    fn source_view_offset_is_honoured() {
        let w = DiffWindow::new(
            4,
            4,
            4,
            vec![Instruction::source(1, 3), Instruction::source(0, 1)],
            Vec::new(),
        );
        assert_eq!(w.apply(b"0123abcd").unwrap(), b"bcda");
        assert_eq!(w.apply_view(b"abcd").unwrap(), b"bcda");
    }

    #[test]
    fn source_view_past_end_is_corrupt() {
        let w = DiffWindow::new(6, 4, 4, vec![Instruction::source(0, 4)], Vec::new());
        assert!(w.apply(b"0123abcd").unwrap_err().is_corrupt_window());
    }

    #[test]
    fn unused_source_view_is_not_sliced() {
        let w = DiffWindow::new(500, 20, 2, vec![Instruction::new_data(0, 2)], b"ok".to_vec());
        assert_eq!(w.apply(b"short").unwrap(), b"ok");
    }

    #[test]
    fn target_copy_of_unwritten_bytes_is_corrupt() {
        let w = DiffWindow::new(0, 0, 3, vec![Instruction::target(0, 3)], Vec::new());
        assert!(w.apply(&[]).is_err());
        assert!(w.validate().is_err());
    }

    #[test]
    fn short_program_is_corrupt() {
        let w = DiffWindow::new(0, 0, 5, vec![Instruction::new_data(0, 2)], b"hi".to_vec());
        let err = w.apply(&[]).unwrap_err();
        assert!(err.to_string().contains("does not fill"));
        assert!(w.validate().is_err());
    }

    #[test]
    fn new_data_overflow_is_corrupt() {
        let w = DiffWindow::new(0, 0, 4, vec![Instruction::new_data(1, 4)], b"abcd".to_vec());
        assert!(w.validate().is_err());
        assert!(w.apply(&[]).is_err());
    }

    #[test]
    fn self_contained_detection() {
        let w = DiffWindow::from_new_data(b"hello").unwrap();
        assert!(w.is_self_contained());
        assert_eq!(w.apply(&[]).unwrap(), b"hello");

        let src = DiffWindow::new(0, 5, 5, vec![Instruction::source(0, 5)], Vec::new());
        assert!(!src.is_self_contained());
        let empty_view = DiffWindow::new(0, 0, 0, Vec::new(), Vec::new());
        assert!(empty_view.is_self_contained());
    }
}
