// Accumulates the instructions and new data of a combined window.

use crate::error::{DeltaError, Result};
use crate::svndiff::{DiffWindow, Instruction, InstructionKind};

#[derive(Debug, Default)]
pub struct WindowBuilder {
    instructions: Vec<Instruction>,
    new_data: Vec<u8>,
    target_len: u64,
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
        self.new_data.clear();
        self.target_len = 0;
    }

    /// Bytes of target produced so far.
    #[inline]
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn push_source(&mut self, offset: u64, length: u64) -> Result<()> {
        self.push_copy(InstructionKind::CopyFromSource, offset, length)
    }

    pub fn push_target(&mut self, offset: u64, length: u64) -> Result<()> {
        self.push_copy(InstructionKind::CopyFromTarget, offset, length)
    }

    /// Append literal bytes, merging with a preceding new-data instruction.
    pub fn push_new_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let length = narrow(bytes.len() as u64, "new data length")?;
        let offset = narrow(self.new_data.len() as u64, "new data offset")?;
        self.new_data.extend_from_slice(bytes);
        self.target_len += u64::from(length);

        if let Some(last) = self.instructions.last_mut()
            && last.kind == InstructionKind::CopyFromNewData
        {
            last.length = narrow(u64::from(last.length) + u64::from(length), "new data length")?;
            return Ok(());
        }
        self.instructions.push(Instruction::new_data(offset, length));
        Ok(())
    }

    fn push_copy(&mut self, kind: InstructionKind, offset: u64, length: u64) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let offset32 = narrow(offset, "copy offset")?;
        let length32 = narrow(length, "copy length")?;
        self.target_len += length;

        // Contiguous copies of the same kind collapse into one.
        if let Some(last) = self.instructions.last_mut()
            && last.kind == kind
            && last.end() == offset
        {
            last.length = narrow(u64::from(last.length) + length, "copy length")?;
            return Ok(());
        }
        self.instructions.push(Instruction::new(kind, offset32, length32));
        Ok(())
    }

    /// Produce the window and reset the builder.
    pub fn finish(
        &mut self,
        source_view_offset: u64,
        source_view_len: u32,
        target_view_len: u32,
    ) -> Result<DiffWindow> {
        if self.target_len != u64::from(target_view_len) {
            return Err(DeltaError::corrupt(format!(
                "combined window produces {} bytes, expected {target_view_len}",
                self.target_len
            )));
        }
        self.target_len = 0;
        Ok(DiffWindow::new(
            source_view_offset,
            source_view_len,
            target_view_len,
            std::mem::take(&mut self.instructions),
            std::mem::take(&mut self.new_data),
        ))
    }
}

fn narrow(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| DeltaError::corrupt(format!("{what} {value} exceeds 32 bits")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_copies_merge() {
        let mut b = WindowBuilder::new();
        b.push_source(0, 4).unwrap();
        b.push_source(4, 2).unwrap();
        b.push_source(10, 1).unwrap();
        b.push_target(0, 3).unwrap();
        b.push_target(3, 3).unwrap();
        assert_eq!(
            b.instructions(),
            &[
                Instruction::source(0, 6),
                Instruction::source(10, 1),
                Instruction::target(0, 6),
            ]
        );
        assert_eq!(b.target_len(), 13);
    }

    #[test]
    fn new_data_always_merges() {
        let mut b = WindowBuilder::new();
        b.push_new_data(b"ab").unwrap();
        b.push_new_data(b"cd").unwrap();
        b.push_source(0, 1).unwrap();
        b.push_new_data(b"e").unwrap();
        let w = b.finish(0, 1, 6).unwrap();
        assert_eq!(
            w.instructions(),
            &[
                Instruction::new_data(0, 4),
                Instruction::source(0, 1),
                Instruction::new_data(4, 1),
            ]
        );
        assert_eq!(w.apply(b"X").unwrap(), b"abcdXe");
    }

    #[test]
    fn finish_checks_length() {
        let mut b = WindowBuilder::new();
        b.push_new_data(b"abc").unwrap();
        assert!(b.finish(0, 0, 4).unwrap_err().is_corrupt_window());
    }
}
